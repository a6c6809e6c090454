use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Boundary error: {0}")]
    Boundary(String),

    #[error("No valid genome found after {attempts} attempts: {message}")]
    RepairExhausted { attempts: usize, message: String },

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Racing would cancel {cancellable} genomes, but at most {allowed} may be cancelled")]
    RacingInvariant { cancellable: usize, allowed: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Status dump error: {0}")]
    StatusDump(String),

    #[error("Evaluation coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TunerError>;
