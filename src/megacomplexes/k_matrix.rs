//! First-order transfer schemes between compartments.

use crate::error::{Result, TarFitError};
use crate::parameters::Parameters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One rate of a K-matrix. `from == to` is a decay to the ground state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    /// Label of the rate parameter
    pub rate: String,
}

/// A kinetic scheme as a list of rates.
///
/// Transfers between compartments must not form a cycle, which keeps the
/// rate matrix triangular in topological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KMatrix {
    pub transfers: Vec<Transfer>,
}

/// Rates closer than this (relative) are treated as one, which turns the
/// coupled solution into polynomial-times-exponential terms.
const DEGENERATE_RATE_TOLERANCE: f64 = 1e-7;

/// A basis function `t^power exp(-rate t)` of a decay system.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecayTerm {
    pub rate: f64,
    pub power: u32,
    /// The first compartment decaying with `rate`, suffixed `_t<power>` for
    /// polynomial terms
    pub label: String,
}

/// Closed-form solution of a filled K-matrix, in topological order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecaySystem {
    /// Compartments in topological order
    pub order: Vec<String>,
    /// Distinct total decay rates, in order of first appearance
    pub rates: Vec<f64>,
    /// Basis functions sorted by rate, then power
    pub terms: Vec<DecayTerm>,
    /// `amplitudes[i][j]`: weight of term `j` in compartment `i`
    pub amplitudes: Vec<Vec<f64>>,
}

fn same_rate(a: f64, b: f64) -> bool {
    (a - b).abs() <= DEGENERATE_RATE_TOLERANCE * a.abs().max(b.abs())
}

/// Terms of one compartment, keyed by `(rate index, power)`.
type Concentration = BTreeMap<(usize, u32), f64>;

/// Add the response of a compartment decaying with rate index `own` to the
/// inflow `amplitude * t^power exp(-rates[source] t)`:
/// `exp(-k t) * integral_0^t amplitude s^power exp((k - k_source) s) ds`.
fn add_inflow(c: &mut Concentration, rates: &[f64], own: usize, source: usize, power: u32, amplitude: f64) {
    if source == own {
        *c.entry((own, power + 1)).or_insert(0.0) += amplitude / f64::from(power + 1);
        return;
    }
    let d = rates[own] - rates[source];
    // integral_0^t s^p e^{ds} ds
    //   = e^{dt} sum_m (-1)^m p!/(p-m)! t^{p-m} / d^{m+1} - (-1)^p p! / d^{p+1}
    let mut falling = 1.0;
    for m in 0..=power {
        let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
        *c.entry((source, power - m)).or_insert(0.0) += amplitude * sign * falling / d.powi(m as i32 + 1);
        falling *= f64::from(power - m);
    }
    let factorial: f64 = (1..=power).map(f64::from).product();
    let sign = if power % 2 == 0 { 1.0 } else { -1.0 };
    *c.entry((own, 0)).or_insert(0.0) -= amplitude * sign * factorial / d.powi(power as i32 + 1);
}

impl KMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transfer(mut self, from: &str, to: &str, rate: &str) -> Self {
        self.transfers.push(Transfer {
            from: from.to_string(),
            to: to.to_string(),
            rate: rate.to_string(),
        });
        self
    }

    pub fn with_decay(self, compartment: &str, rate: &str) -> Self {
        self.with_transfer(compartment, compartment, rate)
    }

    /// Involved compartments in first-seen order.
    pub fn compartments(&self) -> Vec<String> {
        let mut compartments: Vec<String> = Vec::new();
        for t in &self.transfers {
            for c in [&t.from, &t.to] {
                if !compartments.contains(c) {
                    compartments.push(c.clone());
                }
            }
        }
        compartments
    }

    pub fn rate_labels(&self) -> Vec<String> {
        self.transfers.iter().map(|t| t.rate.clone()).collect()
    }

    /// Compartments in an order where every transfer goes forward, or `None`
    /// if the transfers form a cycle.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let compartments = self.compartments();
        let mut order: Vec<String> = Vec::with_capacity(compartments.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while order.len() < compartments.len() {
            let next = compartments.iter().find(|c| {
                !placed.contains(c.as_str())
                    && self
                        .transfers
                        .iter()
                        .filter(|t| t.to == **c && t.from != t.to)
                        .all(|t| placed.contains(t.from.as_str()))
            })?;
            placed.insert(next.as_str());
            order.push(next.clone());
        }
        Some(order)
    }

    /// Solve the scheme for the given parameters and initial
    /// concentrations (by compartment, missing ones are zero).
    ///
    /// Each concentration is a sum of `t^p exp(-k t)` terms. Compartments
    /// with distinct rates only contribute `p = 0`; a chain through
    /// compartments with equal rates raises the power instead of dividing by
    /// the rate difference.
    pub(crate) fn solve(
        &self,
        parameters: &Parameters,
        initial: impl Fn(&str) -> Option<f64>,
    ) -> Result<DecaySystem> {
        let order = self.topological_order().ok_or_else(|| {
            TarFitError::ModelValidation("K-matrix transfers form a cycle".to_string())
        })?;
        let n = order.len();
        let index = |c: &str| order.iter().position(|o| o == c);

        // dc_i/dt = -k_i c_i + sum_j inflow[i][j] c_j, with j before i
        let mut outflow = vec![0.0; n];
        let mut inflow = vec![vec![0.0; n]; n];
        for t in &self.transfers {
            let rate = parameters.value(&t.rate)?;
            if let (Some(from), Some(to)) = (index(&t.from), index(&t.to)) {
                outflow[from] += rate;
                if from != to {
                    inflow[to][from] += rate;
                }
            }
        }

        let mut rates: Vec<f64> = Vec::new();
        let rate_index: Vec<usize> = outflow
            .iter()
            .map(|&k| match rates.iter().position(|&r| same_rate(r, k)) {
                Some(i) => i,
                None => {
                    rates.push(k);
                    rates.len() - 1
                }
            })
            .collect();

        let mut concentrations: Vec<Concentration> = Vec::with_capacity(n);
        for i in 0..n {
            let own = rate_index[i];
            let mut c = Concentration::new();
            c.insert((own, 0), initial(&order[i]).unwrap_or(0.0));
            for (j, parent) in concentrations.iter().enumerate() {
                let k = inflow[i][j];
                if k == 0.0 {
                    continue;
                }
                for (&(source, power), &a) in parent {
                    add_inflow(&mut c, &rates, own, source, power, k * a);
                }
            }
            concentrations.push(c);
        }

        let keys: BTreeSet<(usize, u32)> = concentrations.iter().flat_map(|c| c.keys().copied()).collect();
        let terms = keys
            .iter()
            .map(|&(r, power)| {
                let compartment = rate_index
                    .iter()
                    .position(|&i| i == r)
                    .map_or("", |i| order[i].as_str());
                DecayTerm {
                    rate: rates[r],
                    power,
                    label: if power == 0 {
                        compartment.to_string()
                    } else {
                        format!("{}_t{}", compartment, power)
                    },
                }
            })
            .collect();
        let amplitudes = concentrations
            .iter()
            .map(|c| keys.iter().map(|key| c.get(key).copied().unwrap_or(0.0)).collect::<Vec<f64>>())
            .collect();

        Ok(DecaySystem {
            order,
            rates,
            terms,
            amplitudes,
        })
    }
}
