//! Declarative clp constraints.

use crate::model::interval::{applies, Interval};
use serde::{Deserialize, Serialize};

/// A rule removing a clp from the linear fit at some global-axis values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClpConstraint {
    /// The target amplitude is exactly zero inside the intervals.
    Zero {
        target: String,
        #[serde(default)]
        interval: Vec<Interval>,
    },

    /// The target amplitude is exactly zero outside the intervals.
    Only {
        target: String,
        #[serde(default)]
        interval: Vec<Interval>,
    },

    /// Inside the intervals the target carries the same integrated area as
    /// the source, so its amplitude follows from the source amplitude.
    EqualArea {
        target: String,
        source: String,
        #[serde(default)]
        interval: Vec<Interval>,
    },
}

impl ClpConstraint {
    pub fn zero(target: &str) -> Self {
        Self::Zero {
            target: target.to_string(),
            interval: Vec::new(),
        }
    }

    pub fn only(target: &str, interval: Vec<Interval>) -> Self {
        Self::Only {
            target: target.to_string(),
            interval,
        }
    }

    pub fn equal_area(target: &str, source: &str) -> Self {
        Self::EqualArea {
            target: target.to_string(),
            source: source.to_string(),
            interval: Vec::new(),
        }
    }

    /// Restrict the constraint to the given intervals.
    pub fn within(mut self, intervals: Vec<Interval>) -> Self {
        match &mut self {
            Self::Zero { interval, .. }
            | Self::Only { interval, .. }
            | Self::EqualArea { interval, .. } => *interval = intervals,
        }
        self
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Zero { target, .. } | Self::Only { target, .. } | Self::EqualArea { target, .. } => {
                target
            }
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Self::EqualArea { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the constraint removes its target at the given global-axis
    /// value.
    pub fn is_active(&self, global_value: f64) -> bool {
        match self {
            Self::Zero { interval, .. } | Self::EqualArea { interval, .. } => {
                applies(interval, global_value)
            }
            Self::Only { interval, .. } => !applies(interval, global_value),
        }
    }
}
