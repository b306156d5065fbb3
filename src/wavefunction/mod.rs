//! Wavefunction module - the dual-representation wave-function container
//! and its basis transformation.

mod container;
mod transform;

pub use container::WaveFunctions;
