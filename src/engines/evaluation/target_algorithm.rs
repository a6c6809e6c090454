use crate::engines::generation::genome::Genome;
use crate::error::Result;
use crate::types::{Instance, RunResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the coordinator and a run.
///
/// Target algorithms should poll [`CancellationToken::is_cancelled`] and
/// return early once it is set. Whatever a cancelled run returns is dropped.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One configured target algorithm, ready to be run on instances
pub trait TargetAlgorithm: Send {
    fn run(&mut self, instance: &Instance, cancellation: &CancellationToken) -> Result<RunResult>;
}

/// Builds target algorithms configured by a genome
pub trait TargetAlgorithmFactory: Send + Sync {
    fn configure(&self, genome: &Genome) -> Result<Box<dyn TargetAlgorithm>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_cancellation() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
