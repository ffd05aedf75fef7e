#![forbid(unsafe_code)]

//! The Marin board: a Moxie core, ROM and two RAM regions, and the UART, interrupt aggregator
//! and timer peripherals wired into one physical address space.
//!
//! ```text
//!   0x0000_1000  ROM (128 KiB)
//!   0x1000_0000  on-chip RAM (4 KiB)
//!   0x2FFF_F000  external RAM (configured size)
//!   0xF000_0008  UART (16 bytes decoded)      irq -> CPU input 4
//!   0xF000_0010  interrupt aggregator (2 bytes, shadows the UART window)
//!   (no MMIO)    timer, 50 MHz                irq -> CPU input 1
//! ```

mod boot;
mod config;
pub mod elf;
mod error;
mod reset;
mod serial_host;
mod snapshot;

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use marin_devices::intc::INTC_INPUTS;
use marin_devices::{
    DeviceHandle, DeviceKind, DeviceMmio, DeviceRegistry, DeviceWiring, IrqLine, MarinIntc,
    MarinTimer, MarinUart, NoIrq,
};
use marin_timers::PeriodicTimer;
use memory::{MemoryBus, PhysicalMemoryBus, RegionInfo};
use moxie_cpu::{IrqPins, MoxieCpu};

pub use boot::{place_initrd, round_up_to_page, BootConfig, BootInfo, InitrdPlacement, PAGE_SIZE};
pub use config::{
    MachineConfig, MemoryMap, RegionName, RegionSize, RegionSpec, DEFAULT_RAM_SIZE,
};
pub use error::MachineError;
pub use reset::{ResetContext, ResetCoordinator};
pub use serial_host::HostSerial;
pub use snapshot::{MACHINE_SNAPSHOT_ID, MACHINE_SNAPSHOT_VERSION};

/// CPU interrupt input driven by the UART.
pub const UART_CPU_IRQ: usize = 4;
/// CPU interrupt input driven by the timer.
pub const TIMER_CPU_IRQ: usize = 1;

/// The UART window covers the aggregator's register, so the aggregator must win that overlap.
const INTC_MMIO_PRIORITY: i32 = 1;
const UART_MMIO_PRIORITY: i32 = 0;

/// A device output wired to one CPU interrupt input.
struct CpuIrqLine {
    pins: IrqPins,
    line: usize,
}

impl IrqLine for CpuIrqLine {
    fn set_level(&self, level: bool) {
        self.pins.set_level(self.line, level);
    }
}

pub struct Machine {
    cpu: Rc<RefCell<MoxieCpu>>,
    bus: PhysicalMemoryBus,
    uart: Rc<RefCell<MarinUart>>,
    intc: Rc<RefCell<MarinIntc>>,
    timer: Rc<RefCell<MarinTimer>>,
    host_serial: HostSerial,
    resets: ResetCoordinator,
    reset_ctx: ResetContext,
    boot_info: Option<BootInfo>,
}

impl Machine {
    /// Assembles the board and performs the power-on reset.
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        let cpu = MoxieCpu::from_model_name(config.cpu_model.as_deref())?;
        tracing::info!(cpu = %cpu.model(), "cpu created");
        let irq_pins = cpu.irq_pins();
        let cpu = Rc::new(RefCell::new(cpu));

        let map = &config.memory_map;
        let mut bus = PhysicalMemoryBus::new();
        for name in [RegionName::Rom, RegionName::OnChipRam, RegionName::ExternalRam] {
            let spec = map.region(name).ok_or(MachineError::MissingRegion(name))?;
            let len = spec
                .size_for(config.ram_size)
                .ok_or(MachineError::UnsizedRegion(name))?;
            let mapped = if name == RegionName::Rom {
                bus.map_rom(name.as_str(), spec.base, len)
            } else {
                bus.map_ram(name.as_str(), spec.base, len)
            };
            mapped.map_err(|source| MachineError::Map {
                region: name,
                source,
            })?;
            tracing::debug!(region = %name, base = spec.base, len, "memory region mapped");
        }

        let registry = DeviceRegistry::marin();
        let host_serial = HostSerial::new();

        let intc = create_device(&registry, DeviceKind::Intc, DeviceWiring::new(Box::new(NoIrq)))?;
        map_device(&mut bus, map, RegionName::IntcMmio, INTC_MMIO_PRIORITY, &intc)?;

        let uart_wiring = DeviceWiring::new(Box::new(CpuIrqLine {
            pins: irq_pins.clone(),
            line: UART_CPU_IRQ,
        }))
        .with_backend(Box::new(host_serial.clone()));
        let uart = create_device(&registry, DeviceKind::Uart, uart_wiring)?;
        map_device(&mut bus, map, RegionName::UartMmio, UART_MMIO_PRIORITY, &uart)?;

        let timer = create_device(
            &registry,
            DeviceKind::Timer,
            DeviceWiring::new(Box::new(CpuIrqLine {
                pins: irq_pins,
                line: TIMER_CPU_IRQ,
            })),
        )?;

        let boot_info = match &config.kernel {
            Some(kernel) => {
                let boot = BootConfig {
                    ram_size: config.ram_size,
                    kernel: kernel.clone(),
                    cmdline: config.kernel_cmdline.clone(),
                    initrd: config.initrd.clone(),
                };
                Some(boot::load_kernel(&mut bus, &boot)?)
            }
            None => None,
        };

        let rom_base = map
            .base(RegionName::Rom)
            .ok_or(MachineError::MissingRegion(RegionName::Rom))?;
        let entry = boot_info.as_ref().map_or(rom_base, |info| info.entry);
        let bootstrap_pc =
            u32::try_from(entry).map_err(|_| MachineError::BootstrapPcOutOfRange(entry))?;
        let reset_ctx = ResetContext::new(cpu.clone(), bootstrap_pc);

        let mut resets = ResetCoordinator::new();
        resets.push_device(intc.device());
        resets.push_device(uart.device());
        resets.push_device(timer.device());
        resets.push_cpu(reset_ctx.clone());

        let uart = concrete(&uart, DeviceHandle::as_uart)?;
        let intc = concrete(&intc, DeviceHandle::as_intc)?;
        let timer = concrete(&timer, DeviceHandle::as_timer)?;

        let machine = Self {
            cpu,
            bus,
            uart,
            intc,
            timer,
            host_serial,
            resets,
            reset_ctx,
            boot_info,
        };
        machine.resets.reset_all();
        tracing::info!(bootstrap_pc, "machine assembled");
        Ok(machine)
    }

    /// Warm reset: aggregator, UART, timer, then the CPU.
    ///
    /// Host bytes still queued survive the reset; the first one is delivered to the emptied UART.
    pub fn reset(&mut self) {
        tracing::debug!("machine reset");
        self.resets.reset_all();
        self.pump_serial_input();
    }

    pub fn reset_order(&self) -> Vec<&'static str> {
        self.resets.order()
    }

    pub fn bootstrap_pc(&self) -> u32 {
        self.reset_ctx.bootstrap_pc()
    }

    pub fn boot_info(&self) -> Option<&BootInfo> {
        self.boot_info.as_ref()
    }

    /// Regions actually mapped on the bus, by address.
    pub fn regions(&self) -> Vec<RegionInfo> {
        self.bus.regions()
    }

    pub fn cpu(&self) -> Ref<'_, MoxieCpu> {
        self.cpu.borrow()
    }

    pub fn cpu_mut(&self) -> RefMut<'_, MoxieCpu> {
        self.cpu.borrow_mut()
    }

    pub fn uart(&self) -> Ref<'_, MarinUart> {
        self.uart.borrow()
    }

    pub fn intc(&self) -> Ref<'_, MarinIntc> {
        self.intc.borrow()
    }

    pub fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        self.bus.read_physical(paddr, buf);
        self.after_access();
    }

    pub fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        self.bus.write_physical(paddr, buf);
        self.after_access();
    }

    pub fn read_u16(&mut self, paddr: u64) -> u16 {
        let value = self.bus.read_u16(paddr);
        self.after_access();
        value
    }

    pub fn write_u16(&mut self, paddr: u64, value: u16) {
        self.bus.write_u16(paddr, value);
        self.after_access();
    }

    pub fn read_u32(&mut self, paddr: u64) -> u32 {
        let value = self.bus.read_u32(paddr);
        self.after_access();
        value
    }

    pub fn write_u32(&mut self, paddr: u64, value: u32) {
        self.bus.write_u32(paddr, value);
        self.after_access();
    }

    fn after_access(&mut self) {
        if self.host_serial.take_accept_request() {
            self.pump_serial_input();
        }
    }

    /// Queues host bytes for the guest and delivers the first one if the UART has room.
    pub fn serial_input(&mut self, bytes: &[u8]) {
        self.host_serial.queue_input(bytes);
        self.pump_serial_input();
    }

    /// Delivers one queued host byte if the UART can take it.
    pub fn pump_serial_input(&mut self) -> bool {
        let mut uart = self.uart.borrow_mut();
        if !uart.can_receive() {
            return false;
        }
        match self.host_serial.pop_input() {
            Some(byte) => {
                uart.receive(byte);
                true
            }
            None => false,
        }
    }

    pub fn pending_serial_input(&self) -> usize {
        self.host_serial.pending_input()
    }

    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.host_serial.take_output()
    }

    pub fn raise_intc_input(&mut self, line: usize) {
        self.intc.borrow_mut().raise_input(line);
    }

    pub fn lower_intc_input(&mut self, line: usize) {
        self.intc.borrow_mut().lower_input(line);
    }

    pub fn intc_inputs(&self) -> usize {
        INTC_INPUTS
    }

    /// Runs the timer to guest time `now_ns`; returns how many times it fired.
    pub fn advance_time(&mut self, now_ns: u64) -> u64 {
        self.timer.borrow_mut().advance(now_ns)
    }

    pub fn timer_mut(&self) -> RefMut<'_, PeriodicTimer> {
        RefMut::map(self.timer.borrow_mut(), MarinTimer::timer_mut)
    }

    pub fn cpu_irq_pins(&self) -> IrqPins {
        self.cpu.borrow().irq_pins()
    }
}

fn create_device(
    registry: &DeviceRegistry,
    kind: DeviceKind,
    wiring: DeviceWiring,
) -> Result<DeviceHandle, MachineError> {
    registry
        .create(kind, wiring)
        .ok_or(MachineError::MissingDevice(kind.type_name()))
}

fn concrete<T>(
    handle: &DeviceHandle,
    get: fn(&DeviceHandle) -> Option<&Rc<RefCell<T>>>,
) -> Result<Rc<RefCell<T>>, MachineError> {
    get(handle)
        .cloned()
        .ok_or(MachineError::MissingDevice(handle.kind().type_name()))
}

fn map_device(
    bus: &mut PhysicalMemoryBus,
    map: &MemoryMap,
    name: RegionName,
    priority: i32,
    handle: &DeviceHandle,
) -> Result<(), MachineError> {
    let spec = map.region(name).ok_or(MachineError::MissingRegion(name))?;
    let len = match spec.size {
        RegionSize::Fixed(len) => Some(len),
        RegionSize::DeviceWindow => handle.kind().mmio_size(),
        RegionSize::RamSize => None,
    }
    .ok_or(MachineError::UnsizedRegion(name))?;
    bus.map_mmio(
        name.as_str(),
        spec.base,
        len,
        priority,
        Box::new(DeviceMmio::new(handle.device())),
    )
    .map_err(|source| MachineError::Map {
        region: name,
        source,
    })?;
    tracing::debug!(device = %handle.kind(), base = spec.base, len, priority, "device mapped");
    Ok(())
}
