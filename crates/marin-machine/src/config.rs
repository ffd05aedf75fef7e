use std::fmt;
use std::path::PathBuf;

use moxie_cpu::DEFAULT_CPU_MODEL;

pub const DEFAULT_RAM_SIZE: u64 = 128 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionName {
    Rom,
    OnChipRam,
    ExternalRam,
    IntcMmio,
    UartMmio,
}

impl RegionName {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionName::Rom => "moxie.rom",
            RegionName::OnChipRam => "marin-onchip.ram",
            RegionName::ExternalRam => "marin-external.ram",
            RegionName::IntcMmio => "marin_intc",
            RegionName::UartMmio => "marin-uart",
        }
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSize {
    Fixed(u64),
    /// Sized by [`MachineConfig::ram_size`].
    RamSize,
    /// Sized by the register window of the device mapped there.
    DeviceWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpec {
    pub name: RegionName,
    pub base: u64,
    pub size: RegionSize,
}

impl RegionSpec {
    /// Length of a memory region. Device windows have no length of their own.
    pub fn size_for(&self, ram_size: u64) -> Option<u64> {
        match self.size {
            RegionSize::Fixed(len) => Some(len),
            RegionSize::RamSize => Some(ram_size),
            RegionSize::DeviceWindow => None,
        }
    }
}

/// Physical address layout of the board. Every address literal of the machine lives here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    regions: Vec<RegionSpec>,
}

impl MemoryMap {
    pub fn marin() -> Self {
        Self {
            regions: vec![
                RegionSpec {
                    name: RegionName::Rom,
                    base: 0x0000_1000,
                    size: RegionSize::Fixed(128 * 1024),
                },
                RegionSpec {
                    name: RegionName::OnChipRam,
                    base: 0x1000_0000,
                    size: RegionSize::Fixed(4 * 1024),
                },
                RegionSpec {
                    name: RegionName::ExternalRam,
                    base: 0x2FFF_F000,
                    size: RegionSize::RamSize,
                },
                RegionSpec {
                    name: RegionName::IntcMmio,
                    base: 0xF000_0010,
                    size: RegionSize::DeviceWindow,
                },
                RegionSpec {
                    name: RegionName::UartMmio,
                    base: 0xF000_0008,
                    size: RegionSize::DeviceWindow,
                },
            ],
        }
    }

    /// Builds a map from explicit entries; a later entry with the same name replaces an earlier
    /// one.
    pub fn from_regions(specs: impl IntoIterator<Item = RegionSpec>) -> Self {
        let mut map = Self {
            regions: Vec::new(),
        };
        for spec in specs {
            map.set(spec);
        }
        map
    }

    pub fn set(&mut self, spec: RegionSpec) {
        match self.regions.iter_mut().find(|r| r.name == spec.name) {
            Some(slot) => *slot = spec,
            None => self.regions.push(spec),
        }
    }

    pub fn region(&self, name: RegionName) -> Option<&RegionSpec> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn base(&self, name: RegionName) -> Option<u64> {
        self.region(name).map(|r| r.base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionSpec> {
        self.regions.iter()
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::marin()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// CPU model name; `None` selects [`DEFAULT_CPU_MODEL`].
    pub cpu_model: Option<String>,
    /// External RAM size in bytes.
    pub ram_size: u64,
    pub kernel: Option<PathBuf>,
    /// Recorded in [`crate::BootInfo`]; not passed to the guest.
    pub kernel_cmdline: Option<String>,
    pub initrd: Option<PathBuf>,
    pub memory_map: MemoryMap,
}

impl MachineConfig {
    pub fn cpu_model_name(&self) -> &str {
        self.cpu_model.as_deref().unwrap_or(DEFAULT_CPU_MODEL)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cpu_model: None,
            ram_size: DEFAULT_RAM_SIZE,
            kernel: None,
            kernel_cmdline: None,
            initrd: None,
            memory_map: MemoryMap::marin(),
        }
    }
}
