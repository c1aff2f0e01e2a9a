//! Repeat interval arithmetic.

use chrono::NaiveDateTime;

use crate::types::RepeatSpec;

/// Fixed-interval repeat schedule: no jitter, no drift correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    spec: RepeatSpec,
}

impl RepeatPolicy {
    pub fn new(spec: RepeatSpec) -> Self {
        Self { spec }
    }

    /// The fire instant following `reference`.
    pub fn next_fire_after(&self, reference: NaiveDateTime) -> NaiveDateTime {
        reference + self.spec.interval()
    }

    pub fn wait_finished(&self) -> bool {
        self.spec.wait_finished
    }
}
