//! Hybrid algorithm configuration: a gender-based genetic algorithm over a
//! parameter tree, interleaved with CMA-ES or JADE phases on the numerical
//! parameters, evaluated through a racing-aware concurrent coordinator.

pub mod config;
pub mod engines;
pub mod error;
pub mod tuner;
pub mod types;

pub use error::{Result, TunerError};
pub use tuner::AlgorithmTuner;
