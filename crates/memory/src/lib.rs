//! Guest physical memory: backing stores, the physical address map and the MMIO seam.

mod bus;
mod map;
mod phys;

pub use bus::{MemoryBus, MmioHandler};
pub use map::{MapError, PhysicalMemoryBus, RegionInfo, RegionKind};
pub use phys::{DenseMemory, GuestMemory, GuestMemoryError, GuestMemoryResult, SparseMemory};
