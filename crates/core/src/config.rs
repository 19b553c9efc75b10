// Engine configuration.
//
// Global config: `~/.outliner/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::CheckoutPolicy;

/// Root directory for outliner global state: `~/.outliner/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".outliner"))
}

/// Path to the global config file: `~/.outliner/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Engine configuration at `~/.outliner/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// What a second writer does while a document's connection is in use.
    pub checkout_policy: CheckoutPolicy,
    /// Keep at most this many undoable groups; older ones are pruned on save.
    pub history_limit: Option<usize>,
    /// Text given to items created without any.
    pub default_item_text: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkout_policy: CheckoutPolicy::Blocking,
            history_limit: None,
            default_item_text: String::new(),
        }
    }
}

impl EngineConfig {
    /// Load from `~/.outliner/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.outliner/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn engine_config_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.checkout_policy, CheckoutPolicy::Blocking);
        assert!(cfg.history_limit.is_none());
        assert!(cfg.default_item_text.is_empty());
    }

    #[test]
    fn engine_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = EngineConfig {
            checkout_policy: CheckoutPolicy::NonBlocking,
            history_limit: Some(50),
            default_item_text: "New item".into(),
        };
        cfg.save_to(&path).unwrap();
        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn engine_config_parse_from_toml() {
        let toml_str = r#"
checkout_policy = "non_blocking"
history_limit = 200
"#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.checkout_policy, CheckoutPolicy::NonBlocking);
        assert_eq!(cfg.history_limit, Some(200));
        assert!(cfg.default_item_text.is_empty());
    }

    #[test]
    fn engine_config_rejects_unknown_keys() {
        let error = toml::from_str::<EngineConfig>("undo_depth = 3").expect_err("parse should fail");
        assert!(error.to_string().contains("unknown field `undo_depth`"));
    }

    #[test]
    fn engine_config_load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = EngineConfig::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn engine_config_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep").join("nested").join("config.toml");
        EngineConfig::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn global_dir_is_under_home() {
        let dir = global_dir().expect("home directory should resolve");
        assert!(dir.ends_with(".outliner"));
    }
}
