use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    dist::Backend,
    error::{Result, StrategyErr},
};

/// Knobs shared by strategies.
///
/// Process topology is never configured here; it comes from the launcher's
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    /// Collective backend requested from the process group.
    pub backend: Backend,
    /// How long the distributed rendezvous may take.
    pub init_timeout_ms: u64,
    /// Whether a missing or broken distributed environment is fatal.
    pub force_distributed: bool,
    /// Seed for dataloader shuffling; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Nccl,
            init_timeout_ms: 30 * 60 * 1000,
            force_distributed: false,
            seed: None,
        }
    }
}

impl StrategyConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.init_timeout_ms == 0 {
            return Err(StrategyErr::InvalidConfig(
                "init_timeout_ms must be > 0".into(),
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default() {
        assert_eq!(
            StrategyConfig::from_json_str("{}").unwrap(),
            StrategyConfig::default()
        );
    }

    #[test]
    fn fields_override_defaults() {
        let config = StrategyConfig::from_json_str(
            r#"{ "backend": "gloo", "init_timeout_ms": 500, "seed": 42 }"#,
        )
        .unwrap();

        assert_eq!(config.backend, Backend::Gloo);
        assert_eq!(config.init_timeout(), Duration::from_millis(500));
        assert_eq!(config.seed, Some(42));
        assert!(!config.force_distributed);
    }

    #[test]
    fn zero_timeout_and_unknown_fields_are_rejected() {
        assert!(matches!(
            StrategyConfig::from_json_str(r#"{ "init_timeout_ms": 0 }"#),
            Err(StrategyErr::InvalidConfig(_))
        ));
        assert!(matches!(
            StrategyConfig::from_json_str(r#"{ "world_size": 4 }"#),
            Err(StrategyErr::Json(_))
        ));
    }
}
