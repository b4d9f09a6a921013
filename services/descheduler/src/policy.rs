//! Descheduler policy: which strategies run.
//!
//! ```toml
//! [strategies.remove_duplicates]
//! enabled = true
//! ```
//!
//! A strategy missing from the file is disabled.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Policy loading errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid policy TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Per-strategy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl StrategyConfig {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Strategies {
    pub remove_duplicates: StrategyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    pub strategies: Strategies,
}

impl Policy {
    /// Policy with every strategy enabled; used when no file is configured.
    pub fn all_enabled() -> Self {
        Self {
            strategies: Strategies {
                remove_duplicates: StrategyConfig::enabled(),
            },
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `path` if given, otherwise [`Policy::all_enabled`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::all_enabled()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled() {
        let policy = Policy::from_toml_str(
            r#"
[strategies.remove_duplicates]
enabled = true
"#,
        )
        .unwrap();
        assert!(policy.strategies.remove_duplicates.enabled);
    }

    #[test]
    fn test_missing_strategy_disabled() {
        let policy = Policy::from_toml_str("").unwrap();
        assert!(!policy.strategies.remove_duplicates.enabled);

        let policy = Policy::from_toml_str("[strategies]\n").unwrap();
        assert!(!policy.strategies.remove_duplicates.enabled);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = Policy::from_toml_str(
            r#"
[strategies.low_node_utilization]
enabled = true
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn test_no_path_enables_all() {
        let policy = Policy::load_or_default(None).unwrap();
        assert_eq!(policy, Policy::all_enabled());
    }

    #[test]
    fn test_missing_file() {
        let err = Policy::load(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }
}
