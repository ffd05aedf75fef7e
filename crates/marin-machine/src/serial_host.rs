use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use marin_devices::CharBackend;

#[derive(Debug, Default)]
struct HostSerialState {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    accept_requested: bool,
}

/// Host end of the UART: collects transmitted bytes and queues bytes for the guest.
///
/// Clones share state; one clone is installed as the UART's backend and the machine keeps
/// another to move bytes in and out.
#[derive(Debug, Clone, Default)]
pub struct HostSerial {
    state: Rc<RefCell<HostSerialState>>,
}

impl HostSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_input(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().copied());
    }

    pub fn pending_input(&self) -> usize {
        self.state.borrow().rx.len()
    }

    pub fn pop_input(&self) -> Option<u8> {
        self.state.borrow_mut().rx.pop_front()
    }

    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().tx)
    }

    /// Whether the UART asked for more input since the last call.
    pub fn take_accept_request(&self) -> bool {
        std::mem::take(&mut self.state.borrow_mut().accept_requested)
    }
}

impl CharBackend for HostSerial {
    fn write(&mut self, bytes: &[u8]) {
        self.state.borrow_mut().tx.extend_from_slice(bytes);
    }

    fn accept_input(&mut self) {
        self.state.borrow_mut().accept_requested = true;
    }
}
