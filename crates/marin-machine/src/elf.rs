//! ELF32 kernel loading.
//!
//! Only what boot needs: `PT_LOAD` segments are copied to their physical addresses (file bytes
//! followed by zero fill up to `p_memsz`), and the entry point plus the physical span of the
//! image are reported back. Both byte orders are accepted; the machine type must be Moxie.

use memory::{MapError, PhysicalMemoryBus};
use thiserror::Error;

pub const EM_MOXIE: u16 = 223;

const ELF_MAGIC: [u8; 4] = *b"\x7fELF";
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;
const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;

const EHDR_LEN: usize = 52;
const PHDR_LEN: usize = 32;

/// Zero fill past `p_filesz` is written in pieces of this size.
const ZERO_FILL_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("file is too short for an ELF header")]
    Truncated,

    #[error("not an ELF file")]
    BadMagic,

    #[error("unsupported ELF class {0} (expected 32-bit)")]
    UnsupportedClass(u8),

    #[error("unsupported ELF data encoding {0}")]
    UnsupportedEncoding(u8),

    #[error("unsupported ELF type {0} (expected an executable)")]
    UnsupportedType(u16),

    #[error("ELF machine {found} is not Moxie ({})", EM_MOXIE)]
    WrongMachine { found: u16 },

    #[error("program header table is out of bounds")]
    ProgramHeadersOutOfBounds,

    #[error("segment {index} file range is out of bounds")]
    SegmentOutOfBounds { index: usize },

    #[error("segment {index} has p_filesz larger than p_memsz")]
    SegmentFileLargerThanMemory { index: usize },

    #[error("image has no loadable bytes")]
    Empty,

    #[error("failed to load segment {index} at 0x{paddr:08x}")]
    Load {
        index: usize,
        paddr: u64,
        #[source]
        source: MapError,
    },
}

/// Where an image ended up in guest physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: u64,
    /// Lowest physical address covered by a loaded segment.
    pub low: u64,
    /// One past the highest physical address covered by a loaded segment.
    pub high: u64,
    /// Sum of the in-memory sizes of all loaded segments.
    pub size: u64,
}

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8], at: usize) -> u16 {
        let raw = [b[at], b[at + 1]];
        match self {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        }
    }

    fn u32(self, b: &[u8], at: usize) -> u32 {
        let raw = [b[at], b[at + 1], b[at + 2], b[at + 3]];
        match self {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    offset: usize,
    paddr: u64,
    filesz: usize,
    memsz: u64,
}

/// Copies the image's loadable segments into `bus` and reports the loaded span.
///
/// The image is fully validated, including that every segment lands in RAM or ROM, before the
/// first byte is written.
pub fn load_elf(bus: &mut PhysicalMemoryBus, image: &[u8]) -> Result<LoadedImage, ElfError> {
    let (entry, segments) = parse(image)?;

    let size: u64 = segments.iter().map(|s| s.memsz).sum();
    if size == 0 {
        return Err(ElfError::Empty);
    }

    for (index, seg) in segments.iter().enumerate() {
        if seg.memsz != 0 && !bus.is_backed(seg.paddr, seg.memsz) {
            return Err(ElfError::Load {
                index,
                paddr: seg.paddr,
                source: MapError::Unbacked {
                    paddr: seg.paddr,
                    len: seg.memsz,
                },
            });
        }
    }

    let mut low = u64::MAX;
    let mut high = 0u64;
    for (index, seg) in segments.iter().enumerate() {
        if seg.memsz == 0 {
            continue;
        }
        load_segment(bus, image, seg).map_err(|source| ElfError::Load {
            index,
            paddr: seg.paddr,
            source,
        })?;
        tracing::debug!(
            index,
            paddr = seg.paddr,
            filesz = seg.filesz,
            memsz = seg.memsz,
            "loaded ELF segment"
        );
        low = low.min(seg.paddr);
        high = high.max(seg.paddr + seg.memsz);
    }

    Ok(LoadedImage {
        entry,
        low,
        high,
        size,
    })
}

fn load_segment(
    bus: &mut PhysicalMemoryBus,
    image: &[u8],
    seg: &Segment,
) -> Result<(), MapError> {
    bus.load_image(seg.paddr, &image[seg.offset..seg.offset + seg.filesz])?;

    let zeroes = [0u8; ZERO_FILL_CHUNK];
    let end = seg.paddr + seg.memsz;
    let mut addr = seg.paddr + seg.filesz as u64;
    while addr < end {
        let take = (end - addr).min(ZERO_FILL_CHUNK as u64) as usize;
        bus.load_image(addr, &zeroes[..take])?;
        addr += take as u64;
    }
    Ok(())
}

fn parse(image: &[u8]) -> Result<(u64, Vec<Segment>), ElfError> {
    if image.len() < EHDR_LEN {
        return Err(ElfError::Truncated);
    }
    if image[0..4] != ELF_MAGIC {
        return Err(ElfError::BadMagic);
    }
    if image[4] != ELFCLASS32 {
        return Err(ElfError::UnsupportedClass(image[4]));
    }
    let endian = match image[5] {
        ELFDATA2LSB => Endian::Little,
        ELFDATA2MSB => Endian::Big,
        other => return Err(ElfError::UnsupportedEncoding(other)),
    };

    let e_type = endian.u16(image, 16);
    if e_type != ET_EXEC {
        return Err(ElfError::UnsupportedType(e_type));
    }
    let machine = endian.u16(image, 18);
    if machine != EM_MOXIE {
        return Err(ElfError::WrongMachine { found: machine });
    }

    let entry = u64::from(endian.u32(image, 24));
    let phoff = endian.u32(image, 28) as usize;
    let phentsize = endian.u16(image, 42) as usize;
    let phnum = endian.u16(image, 44) as usize;

    if phnum > 0 && phentsize < PHDR_LEN {
        return Err(ElfError::ProgramHeadersOutOfBounds);
    }
    let table_end = phentsize
        .checked_mul(phnum)
        .and_then(|len| phoff.checked_add(len))
        .ok_or(ElfError::ProgramHeadersOutOfBounds)?;
    if table_end > image.len() {
        return Err(ElfError::ProgramHeadersOutOfBounds);
    }

    let mut segments = Vec::new();
    for index in 0..phnum {
        let ph = &image[phoff + index * phentsize..][..PHDR_LEN];
        if endian.u32(ph, 0) != PT_LOAD {
            continue;
        }
        let offset = endian.u32(ph, 4) as usize;
        let paddr = u64::from(endian.u32(ph, 12));
        let filesz = endian.u32(ph, 16) as usize;
        let memsz = u64::from(endian.u32(ph, 20));

        if (filesz as u64) > memsz {
            return Err(ElfError::SegmentFileLargerThanMemory { index });
        }
        match offset.checked_add(filesz) {
            Some(end) if end <= image.len() => {}
            _ => return Err(ElfError::SegmentOutOfBounds { index }),
        }
        segments.push(Segment {
            offset,
            paddr,
            filesz,
            memsz,
        });
    }

    Ok((entry, segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::MemoryBus;

    /// Minimal big-endian ELF32 executable with one `PT_LOAD` segment.
    fn elf_be(entry: u32, paddr: u32, data: &[u8], memsz: u32, machine: u16) -> Vec<u8> {
        let mut out = vec![0u8; EHDR_LEN + PHDR_LEN];
        out[0..4].copy_from_slice(&ELF_MAGIC);
        out[4] = ELFCLASS32;
        out[5] = ELFDATA2MSB;
        out[6] = 1;
        out[16..18].copy_from_slice(&ET_EXEC.to_be_bytes());
        out[18..20].copy_from_slice(&machine.to_be_bytes());
        out[20..24].copy_from_slice(&1u32.to_be_bytes());
        out[24..28].copy_from_slice(&entry.to_be_bytes());
        out[28..32].copy_from_slice(&(EHDR_LEN as u32).to_be_bytes());
        out[40..42].copy_from_slice(&(EHDR_LEN as u16).to_be_bytes());
        out[42..44].copy_from_slice(&(PHDR_LEN as u16).to_be_bytes());
        out[44..46].copy_from_slice(&1u16.to_be_bytes());

        let ph = EHDR_LEN;
        let data_off = (EHDR_LEN + PHDR_LEN) as u32;
        out[ph..ph + 4].copy_from_slice(&PT_LOAD.to_be_bytes());
        out[ph + 4..ph + 8].copy_from_slice(&data_off.to_be_bytes());
        out[ph + 8..ph + 12].copy_from_slice(&paddr.to_be_bytes());
        out[ph + 12..ph + 16].copy_from_slice(&paddr.to_be_bytes());
        out[ph + 16..ph + 20].copy_from_slice(&(data.len() as u32).to_be_bytes());
        out[ph + 20..ph + 24].copy_from_slice(&memsz.to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn bus() -> PhysicalMemoryBus {
        let mut bus = PhysicalMemoryBus::new();
        bus.map_rom("rom", 0x1000, 0x2000).unwrap();
        bus
    }

    #[test]
    fn loads_segment_and_zero_fills_bss() {
        let mut bus = bus();
        bus.load_image(0x1104, &[0xFF; 4]).unwrap();

        let image = elf_be(0x1100, 0x1100, &[1, 2, 3, 4], 8, EM_MOXIE);
        let loaded = load_elf(&mut bus, &image).unwrap();

        assert_eq!(
            loaded,
            LoadedImage {
                entry: 0x1100,
                low: 0x1100,
                high: 0x1108,
                size: 8
            }
        );
        assert_eq!(bus.read_u32(0x1100), 0x0403_0201);
        assert_eq!(bus.read_u32(0x1104), 0);
    }

    #[test]
    fn rejects_other_machines_and_classes() {
        let mut bus = bus();
        let image = elf_be(0x1000, 0x1000, &[0], 1, 3);
        assert!(matches!(
            load_elf(&mut bus, &image),
            Err(ElfError::WrongMachine { found: 3 })
        ));

        let mut image = elf_be(0x1000, 0x1000, &[0], 1, EM_MOXIE);
        image[4] = 2;
        assert!(matches!(
            load_elf(&mut bus, &image),
            Err(ElfError::UnsupportedClass(2))
        ));

        assert!(matches!(
            load_elf(&mut bus, b"not an elf at all, but long enough to hold a header....."),
            Err(ElfError::BadMagic)
        ));
        assert!(matches!(load_elf(&mut bus, b"\x7fELF"), Err(ElfError::Truncated)));
    }

    #[test]
    fn empty_image_is_an_error() {
        let mut bus = bus();
        let image = elf_be(0x1000, 0x1000, &[], 0, EM_MOXIE);
        assert!(matches!(load_elf(&mut bus, &image), Err(ElfError::Empty)));
    }

    #[test]
    fn truncated_segment_is_rejected_before_loading() {
        let mut bus = bus();
        let mut image = elf_be(0x1000, 0x1000, &[9; 16], 16, EM_MOXIE);
        image.truncate(image.len() - 1);
        assert!(matches!(
            load_elf(&mut bus, &image),
            Err(ElfError::SegmentOutOfBounds { index: 0 })
        ));
        assert_eq!(bus.read_u16(0x1000), 0);
    }

    #[test]
    fn huge_memsz_is_rejected_without_touching_memory() {
        let mut bus = bus();
        let image = elf_be(0x1000, 0x1000, &[7; 4], u32::MAX, EM_MOXIE);
        match load_elf(&mut bus, &image) {
            Err(ElfError::Load {
                index: 0,
                paddr: 0x1000,
                source: MapError::Unbacked { len, .. },
            }) => assert_eq!(len, u64::from(u32::MAX)),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(bus.read_u32(0x1000), 0);
    }

    #[test]
    fn bss_larger_than_one_fill_chunk_is_zeroed() {
        let mut bus = bus();
        bus.load_image(0x2FFC, &[0xFF; 4]).unwrap();
        let image = elf_be(0x1000, 0x1000, &[1], 0x2000, EM_MOXIE);
        load_elf(&mut bus, &image).unwrap();
        assert_eq!(bus.read_u16(0x1000), 1);
        assert_eq!(bus.read_u32(0x2FFC), 0);
    }

    #[test]
    fn segment_outside_memory_fails_to_load() {
        let mut bus = bus();
        let image = elf_be(0x1000, 0x8000, &[1], 1, EM_MOXIE);
        assert!(matches!(
            load_elf(&mut bus, &image),
            Err(ElfError::Load { paddr: 0x8000, .. })
        ));
    }
}
