//! End-to-end fits through `optimize`
//!
//! Data is simulated from known parameters and clps, then fitted from
//! perturbed starting values.


// Simulate, evaluate at the truth, compare
mod round_trip;

// Decays with a coherent artifact around time zero
mod coherent_artifact;

// Several datasets sharing rates
mod global;

// Parameterized band shapes as spectra and as a model of their own
mod spectral;
