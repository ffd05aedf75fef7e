//! Moxie CPU core: model resolution, architectural state and interrupt input pins.
//!
//! Instruction execution is not modelled. The core only owns what the board needs to assemble
//! and reset a machine: the register file, the reset routine and the interrupt inputs that
//! peripherals drive.

mod irq;
mod model;

pub use irq::{IrqPins, NUM_IRQ_INPUTS};
pub use model::{CpuModel, CpuModelError, CPU_MODEL_SUFFIX, DEFAULT_CPU_MODEL};

/// Program counter loaded by the core's own reset routine.
pub const RESET_PC: u32 = 0x1000;

pub const NUM_GREGS: usize = 16;
pub const NUM_SREGS: usize = 10;

#[derive(Debug, Clone)]
pub struct MoxieCpu {
    model: CpuModel,
    pub pc: u32,
    /// `$fp`, `$sp`, `$r0`..`$r13`.
    pub gregs: [u32; NUM_GREGS],
    /// Special registers (exception vectors, status, scratch).
    pub sregs: [u32; NUM_SREGS],
    irq: IrqPins,
}

impl MoxieCpu {
    pub fn new(model: CpuModel) -> Self {
        let mut cpu = Self {
            model,
            pc: 0,
            gregs: [0; NUM_GREGS],
            sregs: [0; NUM_SREGS],
            irq: IrqPins::new(),
        };
        cpu.reset();
        cpu
    }

    /// Resolves `name` (or the default model) and creates a core.
    pub fn from_model_name(name: Option<&str>) -> Result<Self, CpuModelError> {
        let model: CpuModel = name.unwrap_or(DEFAULT_CPU_MODEL).parse()?;
        Ok(Self::new(model))
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    /// Core reset: clears the register file and loads [`RESET_PC`].
    ///
    /// Interrupt input levels belong to the devices driving them and are left untouched.
    pub fn reset(&mut self) {
        self.gregs = [0; NUM_GREGS];
        self.sregs = [0; NUM_SREGS];
        self.pc = RESET_PC;
        tracing::trace!(model = self.model.name(), "moxie cpu reset");
    }

    /// Handle to the interrupt inputs; clones share state with the core.
    pub fn irq_pins(&self) -> IrqPins {
        self.irq.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_registers_and_loads_reset_pc() {
        let mut cpu = MoxieCpu::new(CpuModel::MoxieLite);
        cpu.pc = 0xdead_0000;
        cpu.gregs[3] = 7;
        cpu.sregs[1] = 9;

        cpu.reset();

        assert_eq!(cpu.pc, RESET_PC);
        assert_eq!(cpu.gregs, [0; NUM_GREGS]);
        assert_eq!(cpu.sregs, [0; NUM_SREGS]);
    }

    #[test]
    fn reset_keeps_irq_levels() {
        let mut cpu = MoxieCpu::new(CpuModel::Any);
        let pins = cpu.irq_pins();
        pins.set_level(4, true);
        cpu.reset();
        assert!(cpu.irq_pins().level(4));
    }

    #[test]
    fn default_model_is_moxielite() {
        let cpu = MoxieCpu::from_model_name(None).unwrap();
        assert_eq!(cpu.model(), CpuModel::MoxieLite);
        assert!(MoxieCpu::from_model_name(Some("moxie-9000")).is_err());
    }
}
