use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A problem instance the target algorithm is run on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How a single target algorithm run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Timeout,
    Crashed,
}

/// Outcome of one (genome, instance) run.
///
/// Cancelled runs never produce a `RunResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub runtime: Duration,
    pub quality: Option<f64>,
    pub status: RunStatus,
}

impl RunResult {
    pub fn success(runtime: Duration) -> Self {
        Self {
            runtime,
            quality: None,
            status: RunStatus::Success,
        }
    }

    pub fn with_quality(runtime: Duration, quality: f64) -> Self {
        Self {
            runtime,
            quality: Some(quality),
            status: RunStatus::Success,
        }
    }

    pub fn timeout(cutoff: Duration) -> Self {
        Self {
            runtime: cutoff,
            quality: None,
            status: RunStatus::Timeout,
        }
    }

    pub fn crashed(runtime: Duration) -> Self {
        Self {
            runtime,
            quality: None,
            status: RunStatus::Crashed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
