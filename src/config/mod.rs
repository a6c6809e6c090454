pub mod continuous;
pub mod evaluation;
pub mod gga;
pub mod manager;
pub mod traits;
pub mod tuning;

pub use continuous::ContinuousConfig;
pub use evaluation::{EvaluationConfig, Objective};
pub use gga::GgaConfig;
pub use manager::{ConfigManager, TunerConfig};
pub use traits::ConfigSection;
pub use tuning::TuningConfig;
