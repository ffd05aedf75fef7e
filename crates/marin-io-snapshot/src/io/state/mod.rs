//! Deterministic snapshot encoding for emulated devices.
//!
//! Each blob carries a small header followed by tag-length-value (TLV) fields:
//! - deterministic byte output (fields are emitted in ascending tag order)
//! - forward compatibility (unknown tags are skipped on load)
//! - explicit versioning (major/minor) for both the container format and each device

mod version;

pub use version::{
    SnapshotError, SnapshotHeader, SnapshotReader, SnapshotResult, SnapshotVersion,
    SnapshotWriter, FORMAT_VERSION, SNAPSHOT_MAGIC,
};

/// Snapshotting contract for devices.
///
/// `DEVICE_ID` must stay stable forever. Additions within one major version are made by adding
/// new TLV tags, never by changing the meaning of an existing one.
pub trait IoSnapshot {
    const DEVICE_ID: [u8; 4];
    const DEVICE_VERSION: SnapshotVersion;

    fn save_state(&self) -> Vec<u8>;
    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()>;
}
