#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use marin_machine::elf::EM_MOXIE;
use tempfile::{NamedTempFile, TempDir};

pub struct Segment {
    pub paddr: u32,
    pub data: Vec<u8>,
    pub memsz: u32,
}

/// Builds an ELF32 executable with one `PT_LOAD` per segment.
pub fn elf32(big_endian: bool, machine: u16, entry: u32, segments: &[Segment]) -> Vec<u8> {
    const EHDR: usize = 52;
    const PHDR: usize = 32;

    let u16b = |v: u16| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };
    let u32b = |v: u32| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };

    let mut out = vec![0u8; EHDR];
    out[0..4].copy_from_slice(b"\x7fELF");
    out[4] = 1;
    out[5] = if big_endian { 2 } else { 1 };
    out[6] = 1;
    out[16..18].copy_from_slice(&u16b(2));
    out[18..20].copy_from_slice(&u16b(machine));
    out[20..24].copy_from_slice(&u32b(1));
    out[24..28].copy_from_slice(&u32b(entry));
    out[28..32].copy_from_slice(&u32b(EHDR as u32));
    out[40..42].copy_from_slice(&u16b(EHDR as u16));
    out[42..44].copy_from_slice(&u16b(PHDR as u16));
    out[44..46].copy_from_slice(&u16b(segments.len() as u16));

    let mut data_off = (EHDR + PHDR * segments.len()) as u32;
    for seg in segments {
        let mut ph = [0u8; PHDR];
        ph[0..4].copy_from_slice(&u32b(1));
        ph[4..8].copy_from_slice(&u32b(data_off));
        ph[8..12].copy_from_slice(&u32b(seg.paddr));
        ph[12..16].copy_from_slice(&u32b(seg.paddr));
        ph[16..20].copy_from_slice(&u32b(seg.data.len() as u32));
        ph[20..24].copy_from_slice(&u32b(seg.memsz));
        out.extend_from_slice(&ph);
        data_off += seg.data.len() as u32;
    }
    for seg in segments {
        out.extend_from_slice(&seg.data);
    }
    out
}

/// Big-endian Moxie kernel with a single segment of `data` at `paddr`, entered at `paddr`.
pub fn moxie_kernel(paddr: u32, data: &[u8]) -> Vec<u8> {
    elf32(
        true,
        EM_MOXIE,
        paddr,
        &[Segment {
            paddr,
            data: data.to_vec(),
            memsz: data.len() as u32,
        }],
    )
}

pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// A path inside a fresh directory that does not exist.
pub fn missing_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist");
    (dir, path)
}
