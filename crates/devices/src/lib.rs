#![forbid(unsafe_code)]

//! Peripheral models of the Marin SoC.

pub mod device;
pub mod intc;
pub mod irq;
pub mod mmio;
pub mod registry;
pub mod serial;
pub mod timer;

pub use device::MarinDevice;
pub use intc::{IntcInputLine, MarinIntc};
pub use irq::{IrqLine, NoIrq};
pub use mmio::DeviceMmio;
pub use registry::{DeviceHandle, DeviceKind, DeviceRegistry, DeviceWiring};
pub use serial::{CharBackend, MarinUart};
pub use timer::MarinTimer;
