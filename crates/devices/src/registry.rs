//! Device factory keyed by type name.
//!
//! The machine owns a [`DeviceRegistry`] value and instantiates peripherals through it; there is
//! no process-wide registration.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::device::MarinDevice;
use crate::intc::{MarinIntc, INTC_MMIO_SIZE, INTC_TYPE_NAME};
use crate::irq::{IrqLine, NoIrq};
use crate::serial::{CharBackend, MarinUart, UART_MMIO_SIZE, UART_TYPE_NAME};
use crate::timer::{MarinTimer, TIMER_TYPE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    Uart,
    Intc,
    Timer,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [DeviceKind::Uart, DeviceKind::Intc, DeviceKind::Timer];

    pub fn type_name(self) -> &'static str {
        match self {
            DeviceKind::Uart => UART_TYPE_NAME,
            DeviceKind::Intc => INTC_TYPE_NAME,
            DeviceKind::Timer => TIMER_TYPE_NAME,
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    /// Size of the register window, or `None` for devices without one.
    pub fn mmio_size(self) -> Option<u64> {
        match self {
            DeviceKind::Uart => Some(UART_MMIO_SIZE),
            DeviceKind::Intc => Some(INTC_MMIO_SIZE),
            DeviceKind::Timer => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// External connections handed to a device constructor.
pub struct DeviceWiring {
    pub irq: Box<dyn IrqLine>,
    /// Only used by devices with a character backend.
    pub backend: Option<Box<dyn CharBackend>>,
}

impl DeviceWiring {
    pub fn new(irq: Box<dyn IrqLine>) -> Self {
        Self { irq, backend: None }
    }

    pub fn with_backend(mut self, backend: Box<dyn CharBackend>) -> Self {
        self.backend = Some(backend);
        self
    }
}

impl Default for DeviceWiring {
    fn default() -> Self {
        Self::new(Box::new(NoIrq))
    }
}

/// A constructed device, keeping its concrete type for device-specific host operations.
#[derive(Clone)]
pub enum DeviceHandle {
    Uart(Rc<RefCell<MarinUart>>),
    Intc(Rc<RefCell<MarinIntc>>),
    Timer(Rc<RefCell<MarinTimer>>),
}

impl DeviceHandle {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceHandle::Uart(_) => DeviceKind::Uart,
            DeviceHandle::Intc(_) => DeviceKind::Intc,
            DeviceHandle::Timer(_) => DeviceKind::Timer,
        }
    }

    /// The same device behind the uniform capability set.
    pub fn device(&self) -> Rc<RefCell<dyn MarinDevice>> {
        match self {
            DeviceHandle::Uart(dev) => dev.clone(),
            DeviceHandle::Intc(dev) => dev.clone(),
            DeviceHandle::Timer(dev) => dev.clone(),
        }
    }

    pub fn as_uart(&self) -> Option<&Rc<RefCell<MarinUart>>> {
        match self {
            DeviceHandle::Uart(dev) => Some(dev),
            _ => None,
        }
    }

    pub fn as_intc(&self) -> Option<&Rc<RefCell<MarinIntc>>> {
        match self {
            DeviceHandle::Intc(dev) => Some(dev),
            _ => None,
        }
    }

    pub fn as_timer(&self) -> Option<&Rc<RefCell<MarinTimer>>> {
        match self {
            DeviceHandle::Timer(dev) => Some(dev),
            _ => None,
        }
    }
}

pub type DeviceConstructor = fn(DeviceWiring) -> DeviceHandle;

fn new_uart(wiring: DeviceWiring) -> DeviceHandle {
    DeviceHandle::Uart(Rc::new(RefCell::new(MarinUart::new(
        wiring.backend,
        wiring.irq,
    ))))
}

fn new_intc(wiring: DeviceWiring) -> DeviceHandle {
    DeviceHandle::Intc(Rc::new(RefCell::new(MarinIntc::new(wiring.irq))))
}

fn new_timer(wiring: DeviceWiring) -> DeviceHandle {
    DeviceHandle::Timer(Rc::new(RefCell::new(MarinTimer::new(wiring.irq))))
}

pub struct DeviceRegistry {
    constructors: BTreeMap<DeviceKind, DeviceConstructor>,
}

impl DeviceRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the three Marin peripherals.
    pub fn marin() -> Self {
        let mut registry = Self::empty();
        registry.register(DeviceKind::Uart, new_uart);
        registry.register(DeviceKind::Intc, new_intc);
        registry.register(DeviceKind::Timer, new_timer);
        registry
    }

    /// Replaces any previous constructor for `kind`.
    pub fn register(&mut self, kind: DeviceKind, ctor: DeviceConstructor) {
        self.constructors.insert(kind, ctor);
    }

    pub fn contains(&self, kind: DeviceKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn create(&self, kind: DeviceKind, wiring: DeviceWiring) -> Option<DeviceHandle> {
        let ctor = self.constructors.get(&kind)?;
        tracing::debug!(device = kind.type_name(), "creating device");
        Some(ctor(wiring))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::marin()
    }
}
