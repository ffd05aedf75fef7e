/// An interrupt output of a device, seen from the device side.
///
/// Implementations decide what a level means for whatever sits at the other end (a CPU input
/// pin, an aggregator input, a test recorder).
pub trait IrqLine {
    fn set_level(&self, level: bool);
}

/// A line that is not connected to anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIrq;

impl IrqLine for NoIrq {
    fn set_level(&self, _level: bool) {}
}
