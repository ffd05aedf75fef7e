//! Marin UART.
//!
//! Four 16-bit registers, accessed with 2-byte accesses only:
//!
//! | Offset | Register  | Read                          | Write                  |
//! |--------|-----------|-------------------------------|------------------------|
//! | 0      | `RXREADY` | 1 while a received byte waits | invalid                |
//! | 2      | `TXREADY` | always 1                      | invalid                |
//! | 4      | `RXBYTE`  | the waiting byte (clears `RXREADY`) | invalid          |
//! | 6      | `TXBYTE`  | last value set by reset/restore | transmits the low byte |
//!
//! Receive buffering is one byte deep. The host side must check [`MarinUart::can_receive`]
//! before delivering another byte; a byte delivered while one is pending replaces it.

use marin_io_snapshot::io::state::{
    IoSnapshot, SnapshotError, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

use crate::device::MarinDevice;
use crate::irq::IrqLine;

pub const UART_TYPE_NAME: &str = "marin-uart";

pub const UART_RXREADY: u64 = 0;
pub const UART_TXREADY: u64 = 2;
pub const UART_RXBYTE: u64 = 4;
pub const UART_TXBYTE: u64 = 6;

/// Decoded size of the register window; offsets 8..16 are decoded but undefined.
pub const UART_MMIO_SIZE: u64 = 16;

const R_RXREADY: usize = 0;
const R_TXREADY: usize = 1;
const R_RXBYTE: usize = 2;
const R_TXBYTE: usize = 3;
const NUM_REGS: usize = 4;

/// Host side of the serial port.
pub trait CharBackend {
    /// Transmits bytes written by the guest.
    fn write(&mut self, bytes: &[u8]);

    /// Tells the backend the UART has room for another byte.
    fn accept_input(&mut self) {}
}

pub struct MarinUart {
    regs: [u16; NUM_REGS],
    backend: Option<Box<dyn CharBackend>>,
    // Wired to the CPU, never driven.
    #[allow(dead_code)]
    irq: Box<dyn IrqLine>,
}

impl MarinUart {
    /// Register offsets whose reads change device state.
    pub const READ_SIDE_EFFECT_REGS: &'static [u64] = &[UART_RXBYTE];

    pub fn new(backend: Option<Box<dyn CharBackend>>, irq: Box<dyn IrqLine>) -> Self {
        Self {
            regs: [0; NUM_REGS],
            backend,
            irq,
        }
    }

    pub fn rx_ready(&self) -> bool {
        self.regs[R_RXREADY] != 0
    }

    /// The receive buffer is free.
    pub fn can_receive(&self) -> bool {
        !self.rx_ready()
    }

    /// Delivers one byte from the host.
    pub fn receive(&mut self, byte: u8) {
        if self.rx_ready() {
            tracing::trace!(
                dropped = self.regs[R_RXBYTE],
                byte,
                "marin-uart: rx byte overwritten"
            );
        } else {
            tracing::trace!(byte, "marin-uart: rx");
        }
        self.regs[R_RXBYTE] = u16::from(byte);
        self.regs[R_RXREADY] = 1;
    }

    fn reg_index(offset: u64, size: usize) -> Option<usize> {
        if size != 2 || offset % 2 != 0 || offset >= (NUM_REGS as u64) * 2 {
            return None;
        }
        Some((offset / 2) as usize)
    }

    pub fn read(&mut self, offset: u64, size: usize) -> u64 {
        let Some(reg) = Self::reg_index(offset, size) else {
            tracing::warn!(offset, size, "marin-uart: invalid register read");
            return 0;
        };

        let value = match reg {
            R_RXREADY => self.regs[R_RXREADY],
            R_TXREADY => 1,
            R_RXBYTE => {
                let byte = self.regs[R_RXBYTE];
                self.regs[R_RXREADY] = 0;
                if let Some(backend) = self.backend.as_mut() {
                    backend.accept_input();
                }
                byte
            }
            _ => self.regs[R_TXBYTE],
        };
        u64::from(value)
    }

    pub fn write(&mut self, offset: u64, size: usize, value: u64) {
        match Self::reg_index(offset, size) {
            Some(R_TXBYTE) => {
                let byte = value as u8;
                tracing::trace!(byte, "marin-uart: tx");
                if let Some(backend) = self.backend.as_mut() {
                    backend.write(&[byte]);
                }
            }
            _ => tracing::warn!(offset, size, value, "marin-uart: invalid register write"),
        }
    }

    pub fn reset(&mut self) {
        self.regs = [0; NUM_REGS];
    }
}

impl MarinDevice for MarinUart {
    fn type_name(&self) -> &'static str {
        UART_TYPE_NAME
    }

    fn read(&mut self, offset: u64, size: usize) -> u64 {
        MarinUart::read(self, offset, size)
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        MarinUart::write(self, offset, size, value);
    }

    fn reset(&mut self) {
        MarinUart::reset(self);
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        Some(IoSnapshot::save_state(self))
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        IoSnapshot::load_state(self, bytes)
    }
}

impl IoSnapshot for MarinUart {
    const DEVICE_ID: [u8; 4] = *b"MUAR";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        const TAG_RXREADY: u16 = 1;
        const TAG_TXREADY: u16 = 2;
        const TAG_RXBYTE: u16 = 3;
        const TAG_TXBYTE: u16 = 4;

        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_u16(TAG_RXREADY, self.regs[R_RXREADY]);
        w.field_u16(TAG_TXREADY, self.regs[R_TXREADY]);
        w.field_u16(TAG_RXBYTE, self.regs[R_RXBYTE]);
        w.field_u16(TAG_TXBYTE, self.regs[R_TXBYTE]);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        const TAG_RXREADY: u16 = 1;
        const TAG_TXREADY: u16 = 2;
        const TAG_RXBYTE: u16 = 3;
        const TAG_TXBYTE: u16 = 4;

        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        let mut regs = [0u16; NUM_REGS];
        if let Some(v) = r.u16(TAG_RXREADY)? {
            if v > 1 {
                return Err(SnapshotError::InvalidFieldEncoding("marin-uart rxready"));
            }
            regs[R_RXREADY] = v;
        }
        if let Some(v) = r.u16(TAG_TXREADY)? {
            regs[R_TXREADY] = v;
        }
        if let Some(v) = r.u16(TAG_RXBYTE)? {
            regs[R_RXBYTE] = v;
        }
        if let Some(v) = r.u16(TAG_TXBYTE)? {
            regs[R_TXBYTE] = v;
        }
        self.regs = regs;
        Ok(())
    }
}
