use std::io;
use std::path::PathBuf;

use marin_io_snapshot::io::state::SnapshotError;
use memory::MapError;
use moxie_cpu::CpuModelError;
use thiserror::Error;

use crate::config::RegionName;
use crate::elf::ElfError;

/// Reasons machine assembly can fail. None of them leave a partially built machine behind.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    CpuModel(#[from] CpuModelError),

    #[error("memory map has no {0} region")]
    MissingRegion(RegionName),

    #[error("region {0} has no size of its own")]
    UnsizedRegion(RegionName),

    #[error("bootstrap pc {0:#x} does not fit the 32-bit address space")]
    BootstrapPcOutOfRange(u64),

    #[error("failed to map {region}")]
    Map {
        region: RegionName,
        #[source]
        source: MapError,
    },

    #[error("device {0} is not registered")]
    MissingDevice(&'static str),

    #[error("could not load kernel '{}'", path.display())]
    KernelRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not load kernel '{}'", path.display())]
    KernelLoad {
        path: PathBuf,
        #[source]
        source: ElfError,
    },

    #[error("memory too small for initial ram disk '{}'", path.display())]
    InitrdTooLarge {
        path: PathBuf,
        offset: u64,
        size: u64,
        ram_size: u64,
    },

    #[error("could not load initial ram disk '{}'", path.display())]
    InitrdRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not load initial ram disk '{}'", path.display())]
    InitrdLoad {
        path: PathBuf,
        #[source]
        source: MapError,
    },

    #[error("invalid device snapshot")]
    Snapshot(#[from] SnapshotError),
}
