use std::cell::Cell;
use std::rc::Rc;

pub const NUM_IRQ_INPUTS: usize = 16;

#[derive(Debug, Default)]
struct PinState {
    levels: Cell<u32>,
    raises: [Cell<u64>; NUM_IRQ_INPUTS],
}

/// Level-sensitive interrupt inputs of the core.
///
/// Clones share state, so a device can hold a handle to the pins of the core it is wired to.
/// Every `set_level(_, true)` is also counted, so repeated assertions of an already-high line
/// stay observable.
#[derive(Debug, Clone, Default)]
pub struct IrqPins {
    state: Rc<PinState>,
}

impl IrqPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-range lines are ignored.
    pub fn set_level(&self, line: usize, level: bool) {
        if line >= NUM_IRQ_INPUTS {
            tracing::warn!(line, "moxie cpu: irq input out of range");
            return;
        }
        let mask = 1u32 << line;
        let levels = self.state.levels.get();
        self.state
            .levels
            .set(if level { levels | mask } else { levels & !mask });
        if level {
            let raises = &self.state.raises[line];
            raises.set(raises.get() + 1);
        }
    }

    pub fn level(&self, line: usize) -> bool {
        line < NUM_IRQ_INPUTS && self.state.levels.get() & (1 << line) != 0
    }

    /// Bitmask of asserted inputs.
    pub fn levels(&self) -> u32 {
        self.state.levels.get()
    }

    /// How many times `line` has been driven high.
    pub fn raise_count(&self, line: usize) -> u64 {
        self.state.raises.get(line).map_or(0, Cell::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_levels_and_counts() {
        let pins = IrqPins::new();
        let device_side = pins.clone();

        device_side.set_level(1, true);
        device_side.set_level(1, true);
        assert!(pins.level(1));
        assert_eq!(pins.levels(), 0b10);
        assert_eq!(pins.raise_count(1), 2);

        device_side.set_level(1, false);
        assert!(!pins.level(1));
        assert_eq!(pins.raise_count(1), 2);
    }

    #[test]
    fn out_of_range_line_is_ignored() {
        let pins = IrqPins::new();
        pins.set_level(NUM_IRQ_INPUTS, true);
        assert_eq!(pins.levels(), 0);
        assert_eq!(pins.raise_count(NUM_IRQ_INPUTS), 0);
        assert!(!pins.level(99));
    }
}
