//! Reference megacomplex implementations.
//!
//! The fitting engine only depends on the [`Megacomplex`](crate::model::Megacomplex)
//! trait; these types are ordinary implementations of it.

pub mod coherent_artifact;
pub mod decay;
pub mod k_matrix;
pub mod spectral;

pub use coherent_artifact::CoherentArtifactMegacomplex;
pub use decay::DecayMegacomplex;
pub use k_matrix::{KMatrix, Transfer};
pub use spectral::{SpectralMegacomplex, SpectralShape};
