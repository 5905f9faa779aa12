//! Interrupt line plumbing shared by Slate device models.
#![forbid(unsafe_code)]

use std::cell::Cell;
use std::rc::Rc;

/// A single level-triggered interrupt output.
///
/// Devices drive the line; the machine decides where it is routed. Calling `set_level(true)` on a
/// line that is already high is still forwarded so edge-counting sinks can observe every assertion.
pub trait IrqLine {
    fn set_level(&self, level: bool);
}

impl<T: IrqLine + ?Sized> IrqLine for Rc<T> {
    fn set_level(&self, level: bool) {
        (**self).set_level(level);
    }
}

impl<T: IrqLine + ?Sized> IrqLine for Box<T> {
    fn set_level(&self, level: bool) {
        (**self).set_level(level);
    }
}

/// Line that is not wired to anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIrqLine;

impl IrqLine for NullIrqLine {
    fn set_level(&self, _level: bool) {}
}

/// Cloneable line whose level (and number of assertions) can be observed by the machine.
#[derive(Debug, Default, Clone)]
pub struct LevelIrqLine {
    level: Rc<Cell<bool>>,
    asserts: Rc<Cell<u64>>,
}

impl LevelIrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> bool {
        self.level.get()
    }

    /// Number of `set_level(true)` calls seen so far.
    pub fn assert_count(&self) -> u64 {
        self.asserts.get()
    }
}

impl IrqLine for LevelIrqLine {
    fn set_level(&self, level: bool) {
        if level {
            self.asserts.set(self.asserts.get() + 1);
        }
        self.level.set(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_line_tracks_level_and_counts_every_assertion() {
        let line = LevelIrqLine::new();
        let device_side: Box<dyn IrqLine> = Box::new(line.clone());

        device_side.set_level(true);
        device_side.set_level(true);
        assert!(line.level());
        assert_eq!(line.assert_count(), 2);

        device_side.set_level(false);
        assert!(!line.level());
        assert_eq!(line.assert_count(), 2);
    }

    #[test]
    fn null_line_accepts_everything() {
        let line: Rc<dyn IrqLine> = Rc::new(NullIrqLine);
        line.set_level(true);
        line.set_level(false);
    }
}
