//! Device state of the whole board in one blob.
//!
//! The container is an ordinary TLV snapshot whose fields are the per-device snapshots. The timer
//! is host-programmed and is not part of it.

use std::cell::RefCell;
use std::rc::Rc;

use marin_devices::MarinDevice;
use marin_io_snapshot::io::state::{
    SnapshotError, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

use crate::{Machine, MachineError};

pub const MACHINE_SNAPSHOT_ID: [u8; 4] = *b"MRIN";
pub const MACHINE_SNAPSHOT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

const TAG_UART: u16 = 1;
const TAG_INTC: u16 = 2;

impl Machine {
    fn snapshot_devices(&self) -> [(u16, Rc<RefCell<dyn MarinDevice>>); 2] {
        let uart: Rc<RefCell<dyn MarinDevice>> = self.uart.clone();
        let intc: Rc<RefCell<dyn MarinDevice>> = self.intc.clone();
        [(TAG_UART, uart), (TAG_INTC, intc)]
    }

    pub fn save_device_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(MACHINE_SNAPSHOT_ID, MACHINE_SNAPSHOT_VERSION);
        for (tag, dev) in self.snapshot_devices() {
            if let Some(state) = dev.borrow().save_state() {
                w.field_bytes(tag, state);
            }
        }
        w.finish()
    }

    /// Restores every device or none: on failure, devices already restored get their previous
    /// state back. After a successful restore, queued host input flows into an empty UART.
    pub fn restore_device_state(&mut self, bytes: &[u8]) -> Result<(), MachineError> {
        let r = SnapshotReader::parse(bytes, MACHINE_SNAPSHOT_ID)?;
        r.ensure_device_major(MACHINE_SNAPSHOT_VERSION.major)?;

        let devices = self.snapshot_devices();
        let mut blobs = Vec::with_capacity(devices.len());
        for (tag, _) in &devices {
            let blob = r
                .bytes(*tag)
                .ok_or(SnapshotError::Corrupt("missing device state"))?;
            blobs.push(blob);
        }

        let backups: Vec<Option<Vec<u8>>> = devices
            .iter()
            .map(|(_, dev)| dev.borrow().save_state())
            .collect();

        for (i, ((_, dev), blob)) in devices.iter().zip(&blobs).enumerate() {
            let result: SnapshotResult<()> = dev.borrow_mut().load_state(blob);
            if let Err(err) = result {
                tracing::warn!(device = dev.borrow().type_name(), %err, "device restore failed");
                for ((_, dev), backup) in devices.iter().zip(&backups).take(i + 1) {
                    if let Some(backup) = backup {
                        // A blob the device itself produced always loads.
                        let _ = dev.borrow_mut().load_state(backup);
                    }
                }
                return Err(err.into());
            }
        }
        tracing::debug!("device state restored");
        self.pump_serial_input();
        Ok(())
    }
}
