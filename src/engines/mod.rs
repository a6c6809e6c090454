pub mod continuous;
pub mod evaluation;
pub mod generation;
pub mod strategies;
