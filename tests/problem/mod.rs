//! Integration tests for the residual problems
//!
//! These tests build problems from simulated schemes and check the matrices,
//! clps and residuals they hold for one parameter snapshot.

// Zero, only and equal-area constraints
mod constraints;

// Interval-scoped relations between clps
mod relations;

// Grouped against ungrouped solving
mod grouping;

// Dataset weights and non-negative clps
mod weights;

// Scheme validation and degenerate inputs
mod validation;
