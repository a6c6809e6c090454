use crate::engines::generation::genome::Genome;
use crate::error::{Result, TunerError};
use crate::types::{Instance, RunResult};
use std::collections::BTreeMap;
use std::time::Duration;

/// Evaluation state of one (genome, instance) pair inside a tournament
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceState {
    Open,
    Running,
    Finished(RunResult),
    Cancelled,
}

/// Per-instance evaluation progress of a single genome
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeStats {
    genome: Genome,
    states: BTreeMap<Instance, InstanceState>,
}

impl GenomeStats {
    pub fn new(genome: Genome, instances: &[Instance]) -> Self {
        let states = instances
            .iter()
            .map(|instance| (instance.clone(), InstanceState::Open))
            .collect();
        Self { genome, states }
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn state(&self, instance: &Instance) -> Option<&InstanceState> {
        self.states.get(instance)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.states.keys()
    }

    pub fn number_of_instances(&self) -> usize {
        self.states.len()
    }

    pub fn open_instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances_in(|s| matches!(s, InstanceState::Open))
    }

    pub fn running_instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances_in(|s| matches!(s, InstanceState::Running))
    }

    fn instances_in<F>(&self, predicate: F) -> impl Iterator<Item = &Instance>
    where
        F: Fn(&InstanceState) -> bool,
    {
        self.states
            .iter()
            .filter(move |(_, state)| predicate(state))
            .map(|(instance, _)| instance)
    }

    pub fn open_count(&self) -> usize {
        self.open_instances().count()
    }

    pub fn running_count(&self) -> usize {
        self.running_instances().count()
    }

    pub fn finished_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, InstanceState::Finished(_)))
            .count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, InstanceState::Cancelled))
            .count()
    }

    pub fn has_open_instances(&self) -> bool {
        self.open_count() > 0
    }

    /// No instance is open or running
    pub fn is_done(&self) -> bool {
        self.states
            .values()
            .all(|s| matches!(s, InstanceState::Finished(_) | InstanceState::Cancelled))
    }

    pub fn finished_results(&self) -> impl Iterator<Item = (&Instance, &RunResult)> {
        self.states.iter().filter_map(|(instance, state)| match state {
            InstanceState::Finished(result) => Some((instance, result)),
            _ => None,
        })
    }

    pub fn total_finished_runtime(&self) -> Duration {
        self.finished_results().map(|(_, r)| r.runtime).sum()
    }

    pub fn start(&mut self, instance: &Instance) -> Result<()> {
        match self.states.get_mut(instance) {
            Some(state @ InstanceState::Open) => {
                *state = InstanceState::Running;
                Ok(())
            }
            Some(other) => Err(TunerError::Precondition(format!(
                "cannot start {} on {}: state is {:?}",
                self.genome, instance, other
            ))),
            None => Err(self.unknown_instance(instance)),
        }
    }

    /// Records a result for an open or running instance
    pub fn finish(&mut self, instance: &Instance, result: RunResult) -> Result<()> {
        match self.states.get_mut(instance) {
            Some(state @ (InstanceState::Open | InstanceState::Running)) => {
                *state = InstanceState::Finished(result);
                Ok(())
            }
            Some(other) => Err(TunerError::Precondition(format!(
                "cannot finish {} on {}: state is {:?}",
                self.genome, instance, other
            ))),
            None => Err(self.unknown_instance(instance)),
        }
    }

    /// Puts a running instance back into the queue
    pub fn reopen(&mut self, instance: &Instance) {
        if let Some(state @ InstanceState::Running) = self.states.get_mut(instance) {
            *state = InstanceState::Open;
        }
    }

    /// Cancels an open or running instance. Finished results are kept.
    pub fn cancel(&mut self, instance: &Instance) -> bool {
        match self.states.get_mut(instance) {
            Some(state @ (InstanceState::Open | InstanceState::Running)) => {
                *state = InstanceState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Cancels every open and running instance. Returns the instances that
    /// were running.
    pub fn cancel_unfinished(&mut self) -> Vec<Instance> {
        let mut were_running = Vec::new();
        for (instance, state) in self.states.iter_mut() {
            match state {
                InstanceState::Running => {
                    were_running.push(instance.clone());
                    *state = InstanceState::Cancelled;
                }
                InstanceState::Open => *state = InstanceState::Cancelled,
                _ => {}
            }
        }
        were_running
    }

    /// Copy in which every unfinished instance is finished with `fill`
    pub fn extended_with<F>(&self, fill: F) -> GenomeStats
    where
        F: Fn(&Instance) -> RunResult,
    {
        let states = self
            .states
            .iter()
            .map(|(instance, state)| {
                let state = match state {
                    InstanceState::Finished(result) => InstanceState::Finished(result.clone()),
                    _ => InstanceState::Finished(fill(instance)),
                };
                (instance.clone(), state)
            })
            .collect();
        GenomeStats {
            genome: self.genome.clone(),
            states,
        }
    }

    fn unknown_instance(&self, instance: &Instance) -> TunerError {
        TunerError::Precondition(format!(
            "instance {} is not part of the evaluation of {}",
            instance, self.genome
        ))
    }
}
