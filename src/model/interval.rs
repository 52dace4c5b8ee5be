//! Closed intervals on the global axis that scope constraints and relations.

use serde::{Deserialize, Serialize};

/// A closed interval `[start, end]` on the global axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Create an interval; the endpoints may be given in either order.
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// An interval that contains every value.
    pub fn everywhere() -> Self {
        Self {
            start: f64::NEG_INFINITY,
            end: f64::INFINITY,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Whether a rule scoped by `intervals` applies at `value`. A rule with no
/// intervals applies everywhere.
pub fn applies(intervals: &[Interval], value: f64) -> bool {
    intervals.is_empty() || intervals.iter().any(|i| i.contains(value))
}
