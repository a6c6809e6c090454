use super::{
    continuous::ContinuousConfig, evaluation::EvaluationConfig, gga::GgaConfig, traits::ConfigSection,
    tuning::TuningConfig,
};
use crate::engines::strategies::ContinuousOptimizationMethod;
use crate::error::{Result, TunerError};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables overriding file settings,
/// e.g. `TUNER__GGA__POPULATION_SIZE=32`
pub const ENV_PREFIX: &str = "TUNER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub tuning: TuningConfig,
    pub gga: GgaConfig,
    pub continuous: ContinuousConfig,
    pub evaluation: EvaluationConfig,
}

impl TunerConfig {
    pub fn validate(&self) -> Result<()> {
        self.tuning.validate()?;
        self.gga.validate()?;
        self.continuous.validate()?;
        self.evaluation.validate()?;

        if self.continuous.method == ContinuousOptimizationMethod::Jade
            && !self.continuous.focus_on_incumbent
            && self.gga.population_size / 2 < 3
        {
            return Err(TunerError::Configuration(
                "JADE on the competitive group needs at least 3 competitive genomes".to_string(),
            ));
        }
        Ok(())
    }

    /// Defaults, overridden by `path`, overridden by `TUNER__*` variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Config::try_from(&TunerConfig::default()).map_err(configuration_error)?;
        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()
            .map_err(configuration_error)?;

        let config: TunerConfig = settings.try_deserialize().map_err(configuration_error)?;
        config.validate()?;
        Ok(config)
    }
}

fn configuration_error(error: config::ConfigError) -> TunerError {
    TunerError::Configuration(format!("Failed to load config: {}", error))
}

pub struct ConfigManager {
    config: Arc<RwLock<TunerConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(TunerConfig::default())),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = TunerConfig::load(path)?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| TunerError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| TunerError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> TunerConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Applies `f` and keeps the result only if it validates
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut TunerConfig),
    {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        assert!(TunerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuner.toml");
        std::fs::write(
            &path,
            "[gga]\npopulation_size = 32\n\n[continuous]\nmethod = \"CmaEs\"\n",
        )
        .unwrap();

        let manager = ConfigManager::new();
        manager.load_from_file(&path).unwrap();
        let config = manager.get();
        assert_eq!(config.gga.population_size, 32);
        assert_eq!(config.continuous.method, ContinuousOptimizationMethod::CmaEs);
        assert_eq!(config.gga.max_genome_age, GgaConfig::default().max_genome_age);
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let manager = ConfigManager::new();
        assert!(manager.update(|c| c.gga.mutation_rate = 2.0).is_err());
        assert_eq!(manager.get().gga.mutation_rate, GgaConfig::default().mutation_rate);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let manager = ConfigManager::new();
        manager.update(|c| c.tuning.max_generations = 7).unwrap();
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get().tuning.max_generations, 7);
    }
}
