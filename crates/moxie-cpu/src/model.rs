use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Suffix QOM-style type names carry; accepted but optional on model names.
pub const CPU_MODEL_SUFFIX: &str = "-moxie-cpu";

pub const DEFAULT_CPU_MODEL: &str = "MoxieLite-moxie-cpu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuModel {
    MoxieLite,
    /// Generic core with no model-specific quirks.
    Any,
}

impl CpuModel {
    pub const ALL: [CpuModel; 2] = [CpuModel::MoxieLite, CpuModel::Any];

    pub fn name(self) -> &'static str {
        match self {
            CpuModel::MoxieLite => "MoxieLite",
            CpuModel::Any => "any",
        }
    }
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CPU_MODEL_SUFFIX}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuModelError {
    #[error("unable to find CPU definition '{0}'")]
    Unknown(String),
}

impl FromStr for CpuModel {
    type Err = CpuModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let base = s.strip_suffix(CPU_MODEL_SUFFIX).unwrap_or(s);
        CpuModel::ALL
            .into_iter()
            .find(|m| m.name() == base)
            .ok_or_else(|| CpuModelError::Unknown(s.to_string()))
    }
}
