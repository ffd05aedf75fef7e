//! Marin interrupt aggregator.
//!
//! Collects four input lines into a 16-bit pending register at offset 0. Reading returns the
//! pending bits. Writing clears the pending bits that are also set in the written value. Byte
//! accesses address one half of the register. Every input raise and every register write
//! re-asserts the single output line, whether or not a bit changed. There is no mask or enable
//! register.

use std::cell::RefCell;
use std::rc::Rc;

use marin_io_snapshot::io::state::{
    IoSnapshot, SnapshotError, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

use crate::device::MarinDevice;
use crate::irq::IrqLine;

pub const INTC_TYPE_NAME: &str = "marin_intc";

pub const INTC_INPUTS: usize = 4;
pub const INTC_MMIO_SIZE: u64 = 2;

const PENDING_MASK: u16 = (1 << INTC_INPUTS) - 1;

pub struct MarinIntc {
    pending: u16,
    irq: Box<dyn IrqLine>,
}

impl MarinIntc {
    pub fn new(irq: Box<dyn IrqLine>) -> Self {
        Self { pending: 0, irq }
    }

    pub fn pending(&self) -> u16 {
        self.pending
    }

    /// Drives input `line`. Only the active level latches a pending bit; lowering a line leaves
    /// its bit for software to clear.
    pub fn set_input(&mut self, line: usize, level: bool) {
        if line >= INTC_INPUTS {
            tracing::warn!(line, "marin_intc: input line out of range");
            return;
        }
        if !level {
            return;
        }
        self.pending |= 1 << line;
        tracing::trace!(line, pending = self.pending, "marin_intc: input raised");
        self.update();
    }

    pub fn raise_input(&mut self, line: usize) {
        self.set_input(line, true);
    }

    pub fn lower_input(&mut self, line: usize) {
        self.set_input(line, false);
    }

    fn update(&self) {
        self.irq.set_level(true);
    }

    /// Bit shift of the addressed bytes within the register. Byte accesses are widened onto
    /// the 16-bit register; other widths and offsets are invalid.
    fn access_shift(offset: u64, size: usize) -> Option<u32> {
        match (offset, size) {
            (0, 2) => Some(0),
            (0 | 1, 1) => Some(8 * offset as u32),
            _ => None,
        }
    }

    pub fn read(&mut self, offset: u64, size: usize) -> u64 {
        let Some(shift) = Self::access_shift(offset, size) else {
            tracing::warn!(offset, size, "marin_intc: invalid register read");
            return 0;
        };
        (u64::from(self.pending) >> shift) & lane_mask(size)
    }

    pub fn write(&mut self, offset: u64, size: usize, value: u64) {
        let Some(shift) = Self::access_shift(offset, size) else {
            tracing::warn!(offset, size, value, "marin_intc: invalid register write");
            return;
        };
        let value = ((value & lane_mask(size)) << shift) as u16;
        self.pending ^= self.pending & value;
        self.update();
    }

    pub fn reset(&mut self) {
        self.pending = 0;
    }
}

impl MarinDevice for MarinIntc {
    fn type_name(&self) -> &'static str {
        INTC_TYPE_NAME
    }

    fn read(&mut self, offset: u64, size: usize) -> u64 {
        MarinIntc::read(self, offset, size)
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        MarinIntc::write(self, offset, size, value);
    }

    fn reset(&mut self) {
        MarinIntc::reset(self);
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        Some(IoSnapshot::save_state(self))
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        IoSnapshot::load_state(self, bytes)
    }
}

impl IoSnapshot for MarinIntc {
    const DEVICE_ID: [u8; 4] = *b"MINT";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        const TAG_PENDING: u16 = 1;

        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_u16(TAG_PENDING, self.pending);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        const TAG_PENDING: u16 = 1;

        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        let pending = r.u16(TAG_PENDING)?.unwrap_or(0);
        if pending & !PENDING_MASK != 0 {
            return Err(SnapshotError::InvalidFieldEncoding("marin_intc pending"));
        }
        // Restoring state is not an update: the output line is left alone.
        self.pending = pending;
        Ok(())
    }
}

fn lane_mask(size: usize) -> u64 {
    (1 << (8 * size)) - 1
}

/// One aggregator input, usable as another device's [`IrqLine`].
#[derive(Clone)]
pub struct IntcInputLine {
    intc: Rc<RefCell<MarinIntc>>,
    line: usize,
}

impl IntcInputLine {
    pub fn new(intc: Rc<RefCell<MarinIntc>>, line: usize) -> Self {
        Self { intc, line }
    }
}

impl IrqLine for IntcInputLine {
    fn set_level(&self, level: bool) {
        self.intc.borrow_mut().set_input(self.line, level);
    }
}
