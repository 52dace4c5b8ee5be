//! Linear relations between clps.

use crate::model::interval::{applies, Interval};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// `target = parameter * source`, applied where the intervals contain the
/// global-axis value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    /// Label of the parameter holding the factor
    pub parameter: String,
    #[serde(default)]
    pub interval: Vec<Interval>,
}

impl Relation {
    pub fn new(source: &str, target: &str, parameter: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            parameter: parameter.to_string(),
            interval: Vec::new(),
        }
    }

    pub fn within(mut self, interval: Vec<Interval>) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_active(&self, global_value: f64) -> bool {
        applies(&self.interval, global_value)
    }
}

/// Find a cycle in the target -> source graph of the relations, returning
/// the target label of a relation on it.
pub(crate) fn find_cycle(relations: &[Relation]) -> Option<String> {
    fn reaches(from: &str, goal: &str, relations: &[Relation], seen: &mut HashSet<String>) -> bool {
        relations.iter().filter(|r| r.target == from).any(|r| {
            r.source == goal
                || (seen.insert(r.source.clone()) && reaches(&r.source, goal, relations, seen))
        })
    }

    relations
        .iter()
        .find(|r| r.source == r.target || reaches(&r.source, &r.target, relations, &mut HashSet::new()))
        .map(|r| r.target.clone())
}
