//! Shared wait budgets

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SHORT: Duration = Duration::from_secs(5);
pub const STANDARD: Duration = Duration::from_secs(15);
pub const LONG: Duration = Duration::from_secs(30);
pub const EXTRA_LONG: Duration = Duration::from_secs(45);

/// Whole-test budget
pub const TEST: Duration = Duration::from_secs(60);

/// Keystroke delay used by the input action
pub const TYPE_DELAY: Duration = Duration::from_millis(15);

/// Named wait budget selectable from a test spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    Short,
    #[default]
    Standard,
    Long,
    ExtraLong,
}

impl Budget {
    pub fn duration(self) -> Duration {
        match self {
            Budget::Short => SHORT,
            Budget::Standard => STANDARD,
            Budget::Long => LONG,
            Budget::ExtraLong => EXTRA_LONG,
        }
    }

    pub fn as_millis(self) -> u64 {
        self.duration().as_millis() as u64
    }
}
