use std::path::{Path, PathBuf};

use memory::PhysicalMemoryBus;

use crate::elf::load_elf;
use crate::error::MachineError;

pub const PAGE_SIZE: u64 = 4096;

/// Inputs to kernel loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    pub ram_size: u64,
    pub kernel: PathBuf,
    pub cmdline: Option<String>,
    pub initrd: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitrdPlacement {
    /// Guest physical address of the first byte.
    pub offset: u64,
    pub size: u64,
}

/// What was loaded at boot. Immutable once the machine is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootInfo {
    pub entry: u64,
    pub kernel_low: u64,
    pub kernel_high: u64,
    pub kernel_size: u64,
    pub initrd: Option<InitrdPlacement>,
    pub cmdline: Option<String>,
}

pub fn round_up_to_page(addr: u64) -> Option<u64> {
    Some(addr.checked_add(PAGE_SIZE - 1)? & !(PAGE_SIZE - 1))
}

/// Places an initrd of `size` bytes at the first page boundary at or above `kernel_high`.
///
/// Returns `None` when the end of the initrd would lie beyond `ram_size`.
pub fn place_initrd(kernel_high: u64, size: u64, ram_size: u64) -> Option<InitrdPlacement> {
    let offset = round_up_to_page(kernel_high)?;
    let end = offset.checked_add(size)?;
    (end <= ram_size).then_some(InitrdPlacement { offset, size })
}

pub(crate) fn load_kernel(
    bus: &mut PhysicalMemoryBus,
    config: &BootConfig,
) -> Result<BootInfo, MachineError> {
    let image = std::fs::read(&config.kernel).map_err(|source| MachineError::KernelRead {
        path: config.kernel.clone(),
        source,
    })?;
    let loaded = load_elf(bus, &image).map_err(|source| MachineError::KernelLoad {
        path: config.kernel.clone(),
        source,
    })?;
    tracing::info!(
        kernel = %config.kernel.display(),
        entry = loaded.entry,
        low = loaded.low,
        high = loaded.high,
        "kernel loaded"
    );

    let initrd = match &config.initrd {
        Some(path) => load_initrd(bus, path, loaded.high, config.ram_size)?,
        None => None,
    };

    Ok(BootInfo {
        entry: loaded.entry,
        kernel_low: loaded.low,
        kernel_high: loaded.high,
        kernel_size: loaded.size,
        initrd,
        cmdline: config.cmdline.clone(),
    })
}

fn load_initrd(
    bus: &mut PhysicalMemoryBus,
    path: &Path,
    kernel_high: u64,
    ram_size: u64,
) -> Result<Option<InitrdPlacement>, MachineError> {
    let data = std::fs::read(path).map_err(|source| MachineError::InitrdRead {
        path: path.to_path_buf(),
        source,
    })?;
    if data.is_empty() {
        tracing::debug!(initrd = %path.display(), "initrd is empty, nothing to load");
        return Ok(None);
    }

    let size = data.len() as u64;
    let placement =
        place_initrd(kernel_high, size, ram_size).ok_or_else(|| MachineError::InitrdTooLarge {
            path: path.to_path_buf(),
            offset: round_up_to_page(kernel_high).unwrap_or(u64::MAX),
            size,
            ram_size,
        })?;

    bus.load_image(placement.offset, &data)
        .map_err(|source| MachineError::InitrdLoad {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::info!(
        initrd = %path.display(),
        offset = placement.offset,
        size,
        "initrd loaded"
    );
    Ok(Some(placement))
}
