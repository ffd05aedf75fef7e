use core::fmt;

use crate::bus::{MemoryBus, MmioHandler};
use crate::phys::{DenseMemory, GuestMemory, GuestMemoryError, SparseMemory};

/// Regions at or below this size are backed by [`DenseMemory`]; larger ones are sparse.
const DENSE_REGION_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    ZeroLength {
        name: String,
    },
    AddressOverflow {
        name: String,
        start: u64,
        len: u64,
    },
    Overlap {
        name: String,
        start: u64,
        len: u64,
        existing: String,
    },
    /// Some byte of a loader write is not backed by RAM or ROM.
    Unbacked {
        paddr: u64,
        len: u64,
    },
    Memory(GuestMemoryError),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::ZeroLength { name } => write!(f, "region {name} has zero length"),
            MapError::AddressOverflow { name, start, len } => write!(
                f,
                "region {name} at 0x{start:x} with length 0x{len:x} wraps the address space"
            ),
            MapError::Overlap {
                name,
                start,
                len,
                existing,
            } => write!(
                f,
                "region {name} [0x{start:x}..0x{:x}) overlaps {existing}",
                start + len
            ),
            MapError::Unbacked { paddr, len } => write!(
                f,
                "physical range [0x{paddr:x}..0x{:x}) is not backed by RAM or ROM",
                paddr.saturating_add(*len)
            ),
            MapError::Memory(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for MapError {}

impl From<GuestMemoryError> for MapError {
    fn from(err: GuestMemoryError) -> Self {
        MapError::Memory(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Ram,
    Rom,
    Mmio,
}

/// Read-only description of one mapped region, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub name: String,
    pub start: u64,
    pub len: u64,
    pub kind: RegionKind,
}

struct MemoryRegion {
    name: String,
    start: u64,
    backing: Box<dyn GuestMemory>,
    read_only: bool,
}

impl MemoryRegion {
    fn end(&self) -> u64 {
        self.start + self.backing.size()
    }

    fn contains(&self, paddr: u64) -> bool {
        paddr >= self.start && paddr < self.end()
    }
}

struct MmioRegion {
    name: String,
    start: u64,
    len: u64,
    priority: i32,
    handler: Box<dyn MmioHandler>,
}

impl MmioRegion {
    fn contains(&self, paddr: u64) -> bool {
        paddr >= self.start && paddr - self.start < self.len
    }
}

/// Guest physical address space: RAM/ROM regions plus MMIO windows.
///
/// - RAM and ROM regions never overlap each other.
/// - MMIO windows take precedence over RAM/ROM. MMIO windows may overlap each other only with
///   distinct priorities; the highest priority window containing an address wins.
/// - Guest writes to ROM are dropped. Loader writes via [`PhysicalMemoryBus::load_image`] may
///   target ROM.
/// - Unmapped reads return zero and unmapped writes are dropped.
#[derive(Default)]
pub struct PhysicalMemoryBus {
    memory: Vec<MemoryRegion>,
    mmio: Vec<MmioRegion>,
}

impl PhysicalMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_ram(&mut self, name: &str, start: u64, len: u64) -> Result<(), MapError> {
        let backing = Self::backing_for(len)?;
        self.map_memory(name, start, backing, false)
    }

    pub fn map_rom(&mut self, name: &str, start: u64, len: u64) -> Result<(), MapError> {
        let backing = Self::backing_for(len)?;
        self.map_memory(name, start, backing, true)
    }

    fn backing_for(len: u64) -> Result<Box<dyn GuestMemory>, MapError> {
        Ok(if len <= DENSE_REGION_LIMIT {
            Box::new(DenseMemory::new(len)?)
        } else {
            Box::new(SparseMemory::new(len)?)
        })
    }

    pub fn map_memory(
        &mut self,
        name: &str,
        start: u64,
        backing: Box<dyn GuestMemory>,
        read_only: bool,
    ) -> Result<(), MapError> {
        let len = backing.size();
        check_span(name, start, len)?;
        if let Some(existing) = self
            .memory
            .iter()
            .find(|r| start < r.end() && r.start < start + len)
        {
            return Err(MapError::Overlap {
                name: name.to_string(),
                start,
                len,
                existing: existing.name.clone(),
            });
        }

        let idx = self.memory.partition_point(|r| r.start < start);
        self.memory.insert(
            idx,
            MemoryRegion {
                name: name.to_string(),
                start,
                backing,
                read_only,
            },
        );
        Ok(())
    }

    pub fn map_mmio(
        &mut self,
        name: &str,
        start: u64,
        len: u64,
        priority: i32,
        handler: Box<dyn MmioHandler>,
    ) -> Result<(), MapError> {
        check_span(name, start, len)?;
        if let Some(existing) = self.mmio.iter().find(|r| {
            r.priority == priority && start < r.start + r.len && r.start < start + len
        }) {
            return Err(MapError::Overlap {
                name: name.to_string(),
                start,
                len,
                existing: existing.name.clone(),
            });
        }

        // Keep windows ordered by descending priority so lookups can take the first hit.
        let idx = self.mmio.partition_point(|r| r.priority > priority);
        self.mmio.insert(
            idx,
            MmioRegion {
                name: name.to_string(),
                start,
                len,
                priority,
                handler,
            },
        );
        Ok(())
    }

    pub fn regions(&self) -> Vec<RegionInfo> {
        let mut out: Vec<RegionInfo> = self
            .memory
            .iter()
            .map(|r| RegionInfo {
                name: r.name.clone(),
                start: r.start,
                len: r.backing.size(),
                kind: if r.read_only {
                    RegionKind::Rom
                } else {
                    RegionKind::Ram
                },
            })
            .chain(self.mmio.iter().map(|r| RegionInfo {
                name: r.name.clone(),
                start: r.start,
                len: r.len,
                kind: RegionKind::Mmio,
            }))
            .collect();
        out.sort_by_key(|r| r.start);
        out
    }

    /// Whether every byte of `[paddr, paddr + len)` is RAM or ROM.
    pub fn is_backed(&self, paddr: u64, len: u64) -> bool {
        let Some(end) = paddr.checked_add(len) else {
            return false;
        };
        let mut addr = paddr;
        while addr < end {
            match self.memory.iter().find(|r| r.contains(addr)) {
                Some(region) => addr = region.end(),
                None => return false,
            }
        }
        true
    }

    /// Copies `data` into RAM or ROM at `paddr`, ignoring ROM write protection.
    ///
    /// The whole range must be backed by memory regions; MMIO windows are not written.
    pub fn load_image(&mut self, paddr: u64, data: &[u8]) -> Result<(), MapError> {
        let unbacked = MapError::Unbacked {
            paddr,
            len: data.len() as u64,
        };
        let mut pos = 0usize;
        while pos < data.len() {
            let addr = paddr.checked_add(pos as u64).ok_or(unbacked.clone())?;
            let region = self
                .memory
                .iter_mut()
                .find(|r| r.contains(addr))
                .ok_or(unbacked.clone())?;
            let take = ((region.end() - addr) as usize).min(data.len() - pos);
            region
                .backing
                .write_from(addr - region.start, &data[pos..pos + take])?;
            pos += take;
        }
        Ok(())
    }

    fn mmio_index(&self, paddr: u64) -> Option<usize> {
        self.mmio.iter().position(|r| r.contains(paddr))
    }

    fn read_memory(&self, paddr: u64, dst: &mut [u8]) {
        let mut pos = 0usize;
        while pos < dst.len() {
            let Some(addr) = paddr.checked_add(pos as u64) else {
                dst[pos..].fill(0);
                return;
            };
            match self.memory.iter().find(|r| r.contains(addr)) {
                Some(region) => {
                    let take = ((region.end() - addr) as usize).min(dst.len() - pos);
                    if region
                        .backing
                        .read_into(addr - region.start, &mut dst[pos..pos + take])
                        .is_err()
                    {
                        dst[pos..pos + take].fill(0);
                    }
                    pos += take;
                }
                None => {
                    dst[pos] = 0;
                    pos += 1;
                }
            }
        }
    }

    fn write_memory(&mut self, paddr: u64, src: &[u8]) {
        let mut pos = 0usize;
        while pos < src.len() {
            let Some(addr) = paddr.checked_add(pos as u64) else {
                return;
            };
            match self.memory.iter_mut().find(|r| r.contains(addr)) {
                Some(region) => {
                    let take = ((region.end() - addr) as usize).min(src.len() - pos);
                    if !region.read_only {
                        let _ = region
                            .backing
                            .write_from(addr - region.start, &src[pos..pos + take]);
                    }
                    pos += take;
                }
                None => pos += 1,
            }
        }
    }
}

impl MemoryBus for PhysicalMemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }

        // Accesses that fit inside one MMIO window are forwarded with their full width so the
        // device sees the access size the CPU issued.
        if let Some(idx) = self.mmio_index(paddr) {
            let region = &mut self.mmio[idx];
            let offset = paddr - region.start;
            if buf.len() <= 8 && offset + buf.len() as u64 <= region.len {
                let value = region.handler.read(offset, buf.len());
                buf.copy_from_slice(&value.to_le_bytes()[..buf.len()]);
                return;
            }
        }

        if self.mmio.iter().any(|r| overlaps(r, paddr, buf.len())) {
            for (i, byte) in buf.iter_mut().enumerate() {
                let addr = paddr.wrapping_add(i as u64);
                match self.mmio_index(addr) {
                    Some(idx) => {
                        let region = &mut self.mmio[idx];
                        *byte = region.handler.read(addr - region.start, 1) as u8;
                    }
                    None => self.read_memory(addr, std::slice::from_mut(byte)),
                }
            }
            return;
        }

        self.read_memory(paddr, buf);
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        if buf.is_empty() {
            return;
        }

        if let Some(idx) = self.mmio_index(paddr) {
            let region = &mut self.mmio[idx];
            let offset = paddr - region.start;
            if buf.len() <= 8 && offset + buf.len() as u64 <= region.len {
                let mut bytes = [0u8; 8];
                bytes[..buf.len()].copy_from_slice(buf);
                region
                    .handler
                    .write(offset, buf.len(), u64::from_le_bytes(bytes));
                return;
            }
        }

        if self.mmio.iter().any(|r| overlaps(r, paddr, buf.len())) {
            for (i, &byte) in buf.iter().enumerate() {
                let addr = paddr.wrapping_add(i as u64);
                match self.mmio_index(addr) {
                    Some(idx) => {
                        let region = &mut self.mmio[idx];
                        region
                            .handler
                            .write(addr - region.start, 1, u64::from(byte));
                    }
                    None => self.write_memory(addr, &[byte]),
                }
            }
            return;
        }

        self.write_memory(paddr, buf);
    }
}

fn overlaps(region: &MmioRegion, paddr: u64, len: usize) -> bool {
    let end = paddr.saturating_add(len as u64);
    paddr < region.start + region.len && region.start < end
}

fn check_span(name: &str, start: u64, len: u64) -> Result<(), MapError> {
    if len == 0 {
        return Err(MapError::ZeroLength {
            name: name.to_string(),
        });
    }
    if start.checked_add(len).is_none() {
        return Err(MapError::AddressOverflow {
            name: name.to_string(),
            start,
            len,
        });
    }
    Ok(())
}
