//! The two notions of time the worker schedules by.

use std::fmt::{Display, Formatter};

/// Global edit ordinal. Ticked by every content-store mutation; a compile
/// pass is stamped with the clock value it started from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Clock(pub u64);

impl Clock {
    pub fn tick(self) -> Clock {
        Clock(self.0 + 1)
    }
}

impl Display for Clock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Editor-assigned revision of one open file's text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(pub i32);

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
#[path = "../../tests/worker/t_clock.rs"]
mod tests;
