use super::traits::ConfigSection;
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub seed: Option<u64>,
    pub max_generations: usize,
    /// Instances per generation grow linearly from start to end
    pub start_num_instances: usize,
    pub end_num_instances: usize,
    /// Generation at which `end_num_instances` is reached
    pub goal_generation: usize,
    /// Status dumps are written here after every generation
    pub status_directory: Option<PathBuf>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_generations: 20,
            start_num_instances: 5,
            end_num_instances: 20,
            goal_generation: 15,
            status_directory: None,
        }
    }
}

impl TuningConfig {
    /// Number of instances used in `generation`
    pub fn instances_for_generation(&self, generation: usize) -> usize {
        if generation >= self.goal_generation || self.goal_generation == 0 {
            return self.end_num_instances;
        }
        let start = self.start_num_instances as f64;
        let end = self.end_num_instances as f64;
        let progress = generation as f64 / self.goal_generation as f64;
        (start + (end - start) * progress).round() as usize
    }
}

impl ConfigSection for TuningConfig {
    fn section_name() -> &'static str {
        "tuning"
    }

    fn validate(&self) -> Result<()> {
        if self.max_generations == 0 {
            return Err(TunerError::Configuration(
                "At least one generation is required".to_string(),
            ));
        }
        if self.start_num_instances == 0 || self.end_num_instances < self.start_num_instances {
            return Err(TunerError::Configuration(format!(
                "Instance schedule {} -> {} is invalid",
                self.start_num_instances, self.end_num_instances
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_schedule_is_linear() {
        let config = TuningConfig {
            start_num_instances: 5,
            end_num_instances: 15,
            goal_generation: 10,
            ..TuningConfig::default()
        };
        assert_eq!(config.instances_for_generation(0), 5);
        assert_eq!(config.instances_for_generation(5), 10);
        assert_eq!(config.instances_for_generation(10), 15);
        assert_eq!(config.instances_for_generation(30), 15);
    }
}
