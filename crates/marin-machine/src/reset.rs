use std::cell::RefCell;
use std::rc::Rc;

use marin_devices::MarinDevice;
use moxie_cpu::MoxieCpu;

/// CPU half of a machine reset: the core's own reset, then the board's bootstrap PC.
#[derive(Clone)]
pub struct ResetContext {
    cpu: Rc<RefCell<MoxieCpu>>,
    bootstrap_pc: u32,
}

impl ResetContext {
    pub fn new(cpu: Rc<RefCell<MoxieCpu>>, bootstrap_pc: u32) -> Self {
        Self { cpu, bootstrap_pc }
    }

    pub fn bootstrap_pc(&self) -> u32 {
        self.bootstrap_pc
    }

    pub fn reset(&self) {
        let mut cpu = self.cpu.borrow_mut();
        cpu.reset();
        cpu.pc = self.bootstrap_pc;
    }
}

enum ResetTarget {
    Device(Rc<RefCell<dyn MarinDevice>>),
    Cpu(ResetContext),
}

struct ResetComponent {
    name: &'static str,
    target: ResetTarget,
}

/// Resets components in the order they were added, both at power-on and on warm reset.
#[derive(Default)]
pub struct ResetCoordinator {
    components: Vec<ResetComponent>,
}

impl ResetCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_device(&mut self, dev: Rc<RefCell<dyn MarinDevice>>) {
        let name = dev.borrow().type_name();
        self.components.push(ResetComponent {
            name,
            target: ResetTarget::Device(dev),
        });
    }

    pub fn push_cpu(&mut self, ctx: ResetContext) {
        self.components.push(ResetComponent {
            name: "cpu",
            target: ResetTarget::Cpu(ctx),
        });
    }

    /// Component names in reset order.
    pub fn order(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name).collect()
    }

    pub fn reset_all(&self) {
        for component in &self.components {
            tracing::trace!(component = component.name, "reset");
            match &component.target {
                ResetTarget::Device(dev) => dev.borrow_mut().reset(),
                ResetTarget::Cpu(ctx) => ctx.reset(),
            }
        }
    }
}
