use super::incumbent::IncumbentGenomeWrapper;
use crate::engines::strategies::StrategyKind;
use log::info;
use std::sync::mpsc::Sender;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize, strategy: StrategyKind);
    fn on_generation_complete(&mut self, generation: usize, incumbent: &IncumbentGenomeWrapper);
    fn on_phase_switch(&mut self, generation: usize, from: StrategyKind, to: StrategyKind);
}

/// Reports progress through the `log` facade
pub struct LoggingProgressCallback;

impl ProgressCallback for LoggingProgressCallback {
    fn on_generation_start(&mut self, generation: usize, strategy: StrategyKind) {
        info!("Generation {} starting ({})", generation + 1, strategy);
    }

    fn on_generation_complete(&mut self, generation: usize, incumbent: &IncumbentGenomeWrapper) {
        info!(
            "Generation {} complete. Incumbent from generation {} with {} results: {}",
            generation + 1,
            incumbent.incumbent_generation + 1,
            incumbent.incumbent_instance_results.len(),
            incumbent.incumbent_genome
        );
    }

    fn on_phase_switch(&mut self, generation: usize, from: StrategyKind, to: StrategyKind) {
        info!("Switching from {} to {} after generation {}", from, to, generation + 1);
    }
}

// Forwards progress to another thread, e.g. a monitoring front end
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart {
        generation: usize,
        strategy: StrategyKind,
    },
    GenerationComplete {
        generation: usize,
        incumbent: IncumbentGenomeWrapper,
    },
    PhaseSwitch {
        generation: usize,
        from: StrategyKind,
        to: StrategyKind,
    },
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize, strategy: StrategyKind) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationStart { generation, strategy });
    }

    fn on_generation_complete(&mut self, generation: usize, incumbent: &IncumbentGenomeWrapper) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete {
            generation,
            incumbent: incumbent.clone(),
        });
    }

    fn on_phase_switch(&mut self, generation: usize, from: StrategyKind, to: StrategyKind) {
        let _ = self
            .sender
            .send(ProgressMessage::PhaseSwitch { generation, from, to });
    }
}
