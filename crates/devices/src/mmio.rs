use std::cell::RefCell;
use std::rc::Rc;

use memory::MmioHandler;

use crate::device::MarinDevice;

/// Maps one device's register window onto the physical bus.
///
/// The device stays shared with the machine, which needs it for reset, snapshots and
/// host-side input.
pub struct DeviceMmio {
    dev: Rc<RefCell<dyn MarinDevice>>,
}

impl DeviceMmio {
    pub fn new(dev: Rc<RefCell<dyn MarinDevice>>) -> Self {
        Self { dev }
    }
}

impl MmioHandler for DeviceMmio {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        self.dev.borrow_mut().read(offset, size)
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        self.dev.borrow_mut().write(offset, size, value);
    }
}
