//! Block launch configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Settings for one cooperating block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Name used in log fields.
    #[serde(default = "default_name")]
    pub name: String,
    /// Shared memory available to the block, in bytes.
    #[serde(default = "default_shared_mem_bytes")]
    pub shared_mem_bytes: usize,
    /// Largest cube width this configuration accepts.
    #[serde(default = "default_max_block_dim")]
    pub max_block_dim: usize,
    /// Fill freshly allocated shared tiles with the element's maximum value
    /// so reads of never-written storage show up in numeric checks.
    #[serde(default = "default_poison_shared")]
    pub poison_shared: bool,
}

fn default_name() -> String {
    "block".to_string()
}

fn default_shared_mem_bytes() -> usize {
    48 * 1024
}

fn default_max_block_dim() -> usize {
    1024
}

fn default_poison_shared() -> bool {
    cfg!(debug_assertions)
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            shared_mem_bytes: default_shared_mem_bytes(),
            max_block_dim: default_max_block_dim(),
            poison_shared: default_poison_shared(),
        }
    }
}

impl BlockConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_mem_bytes == 0 {
            return Err(ConfigError::Invalid(
                "shared_mem_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_block_dim == 0 {
            return Err(ConfigError::Invalid(
                "max_block_dim must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that a cube of `block_dim` units fits this configuration.
    pub fn check_block_dim(&self, block_dim: usize) -> Result<(), ConfigError> {
        if block_dim > self.max_block_dim {
            return Err(ConfigError::Invalid(format!(
                "block width {block_dim} exceeds max_block_dim {}",
                self.max_block_dim
            )));
        }
        Ok(())
    }

    /// Check that a kernel's shared tiles fit the shared memory budget.
    pub fn check_shared_bytes(&self, bytes: usize) -> Result<(), ConfigError> {
        if bytes > self.shared_mem_bytes {
            return Err(ConfigError::Invalid(format!(
                "kernel needs {bytes} bytes of shared memory, budget is {}",
                self.shared_mem_bytes
            )));
        }
        Ok(())
    }
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = BlockConfig::from_toml_str("name = \"gemm\"\n").unwrap();
        assert_eq!(config.name, "gemm");
        assert_eq!(config.shared_mem_bytes, 48 * 1024);
        assert_eq!(config.max_block_dim, 1024);
        assert_eq!(config.poison_shared, cfg!(debug_assertions));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("block.toml");
        std::fs::write(
            &path,
            r#"
shared_mem_bytes = 16384
max_block_dim = 256
poison_shared = false
"#,
        )
        .unwrap();

        let config = BlockConfig::load(&path).unwrap();
        assert_eq!(config.shared_mem_bytes, 16384);
        assert_eq!(config.max_block_dim, 256);
        assert!(!config.poison_shared);
    }

    #[test]
    fn test_missing_file() {
        let err = BlockConfig::load("/nonexistent/block.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            BlockConfig::from_toml_str("shared_mem_bytes = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BlockConfig::from_toml_str("max_block_dim = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BlockConfig::from_toml_str("shared_mem_bytes = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_block_dim_limit() {
        let config = BlockConfig {
            max_block_dim: 64,
            ..BlockConfig::default()
        };
        assert!(config.check_block_dim(64).is_ok());
        assert!(config.check_block_dim(128).is_err());
    }

    #[test]
    fn test_shared_budget() {
        let config = BlockConfig {
            shared_mem_bytes: 1024,
            ..BlockConfig::default()
        };
        assert!(config.check_shared_bytes(1024).is_ok());
        assert!(matches!(
            config.check_shared_bytes(1025),
            Err(ConfigError::Invalid(msg)) if msg.contains("1025")
        ));
    }
}
