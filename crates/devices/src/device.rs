use marin_io_snapshot::io::state::{SnapshotError, SnapshotResult};

/// Uniform capability set shared by every Marin peripheral.
///
/// Register accesses use offsets relative to the device's MMIO window and the access width in
/// bytes. Accesses a device does not decode are logged and ignored: reads return 0.
pub trait MarinDevice {
    /// Type name the device is registered under.
    fn type_name(&self) -> &'static str;

    fn read(&mut self, offset: u64, size: usize) -> u64;
    fn write(&mut self, offset: u64, size: usize, value: u64);

    /// Returns the device to its power-on state.
    fn reset(&mut self);

    /// `None` for devices without persisted state.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    fn load_state(&mut self, _bytes: &[u8]) -> SnapshotResult<()> {
        Err(SnapshotError::Corrupt("device has no snapshot state"))
    }
}
