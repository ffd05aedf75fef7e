use core::fmt;
use std::collections::BTreeMap;

/// Errors returned by [`GuestMemory`] backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestMemoryError {
    /// The requested range falls outside the backing store.
    OutOfRange { offset: u64, len: usize, size: u64 },
    /// The requested size cannot be represented by the current platform's `usize`.
    SizeTooLarge { size: u64 },
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestMemoryError::OutOfRange { offset, len, size } => write!(
                f,
                "guest memory access out of range: offset=0x{offset:x} len={len} size=0x{size:x}"
            ),
            GuestMemoryError::SizeTooLarge { size } => {
                write!(f, "guest memory size {size} does not fit in usize")
            }
        }
    }
}

impl std::error::Error for GuestMemoryError {}

pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

/// Byte-addressable backing store for one RAM or ROM region.
///
/// Offsets are relative to the start of the region, not guest physical addresses.
pub trait GuestMemory {
    fn size(&self) -> u64;

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> GuestMemoryResult<()>;

    fn write_from(&mut self, offset: u64, src: &[u8]) -> GuestMemoryResult<()>;

    fn read_u16_le(&self, offset: u64) -> GuestMemoryResult<u16> {
        let mut buf = [0u8; 2];
        self.read_into(offset, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32_le(&self, offset: u64) -> GuestMemoryResult<u32> {
        let mut buf = [0u8; 4];
        self.read_into(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32_le(&mut self, offset: u64, value: u32) -> GuestMemoryResult<()> {
        self.write_from(offset, &value.to_le_bytes())
    }
}

fn check_range(size: u64, offset: u64, len: usize) -> GuestMemoryResult<()> {
    let end = offset
        .checked_add(len as u64)
        .ok_or(GuestMemoryError::OutOfRange { offset, len, size })?;
    if end > size {
        return Err(GuestMemoryError::OutOfRange { offset, len, size });
    }
    Ok(())
}

/// Dense (contiguous) guest memory. Used for the small fixed-size regions.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    data: Box<[u8]>,
}

impl DenseMemory {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let len = usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            data: vec![0u8; len].into_boxed_slice(),
        })
    }

    fn span(&self, offset: u64, len: usize) -> GuestMemoryResult<core::ops::Range<usize>> {
        check_range(self.size(), offset, len)?;
        // In range of a `usize`-sized buffer, so the cast cannot truncate.
        let start = offset as usize;
        Ok(start..start + len)
    }
}

impl GuestMemory for DenseMemory {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let span = self.span(offset, dst.len())?;
        dst.copy_from_slice(&self.data[span]);
        Ok(())
    }

    fn write_from(&mut self, offset: u64, src: &[u8]) -> GuestMemoryResult<()> {
        let span = self.span(offset, src.len())?;
        self.data[span].copy_from_slice(src);
        Ok(())
    }
}

/// Sparse guest memory backed by lazily-allocated pages.
///
/// External RAM is sized by configuration and is mostly untouched at boot, so pages are only
/// allocated on first write. Unallocated pages read as zero.
#[derive(Debug, Clone)]
pub struct SparseMemory {
    size: u64,
    page_size: u64,
    pages: BTreeMap<u64, Box<[u8]>>,
}

impl SparseMemory {
    pub const DEFAULT_PAGE_SIZE: u64 = 64 * 1024;

    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        Self::with_page_size(size, Self::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(size: u64, page_size: u64) -> GuestMemoryResult<Self> {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        usize::try_from(page_size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            size,
            page_size,
            pages: BTreeMap::new(),
        })
    }

    /// Number of pages that have been materialized by writes.
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    /// Splits `[offset, offset + len)` into `(page_index, offset_in_page, chunk_len)` pieces.
    fn chunks(&self, offset: u64, len: usize) -> impl Iterator<Item = (u64, usize, usize)> {
        let page_size = self.page_size;
        let mut cur = offset;
        let mut remaining = len;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let page = cur / page_size;
            let in_page = (cur % page_size) as usize;
            let take = (page_size as usize - in_page).min(remaining);
            cur += take as u64;
            remaining -= take;
            Some((page, in_page, take))
        })
    }
}

impl GuestMemory for SparseMemory {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        check_range(self.size, offset, dst.len())?;
        let mut pos = 0usize;
        for (page, in_page, take) in self.chunks(offset, dst.len()) {
            let out = &mut dst[pos..pos + take];
            match self.pages.get(&page) {
                Some(bytes) => out.copy_from_slice(&bytes[in_page..in_page + take]),
                None => out.fill(0),
            }
            pos += take;
        }
        Ok(())
    }

    fn write_from(&mut self, offset: u64, src: &[u8]) -> GuestMemoryResult<()> {
        check_range(self.size, offset, src.len())?;
        let page_len = self.page_size as usize;
        let chunks: Vec<_> = self.chunks(offset, src.len()).collect();
        let mut pos = 0usize;
        for (page, in_page, take) in chunks {
            let bytes = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0u8; page_len].into_boxed_slice());
            bytes[in_page..in_page + take].copy_from_slice(&src[pos..pos + take]);
            pos += take;
        }
        Ok(())
    }
}
