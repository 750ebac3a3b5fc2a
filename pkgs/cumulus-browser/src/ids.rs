//! Engine-issued identifiers
//!
//! Every remote request, debounce timer and upload task gets a fresh id from
//! a single monotonically increasing counter, so "the latest request" is
//! always a plain comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! engine_id {
    ($(#[$attr:meta])* $name:ident, $prefix:literal) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

engine_id!(
    /// Identifies one remote call issued by the engine
    RequestId,
    "req"
);
engine_id!(
    /// Identifies one debounce timer
    TimerId,
    "timer"
);
engine_id!(
    /// Identifies one staged upload
    TaskId,
    "task"
);

#[derive(Debug, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    fn bump(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn request(&mut self) -> RequestId {
        RequestId(self.bump())
    }

    pub fn timer(&mut self) -> TimerId {
        TimerId(self.bump())
    }

    pub fn task(&mut self) -> TaskId {
        TaskId(self.bump())
    }
}
