use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Top-level dagflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

/// Execution engine policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Halt the run at the first node failure (default: true). When false,
    /// nodes downstream of a failure are skipped and other branches continue.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    /// Treat a missing input as fatal to the whole run (default: false).
    #[serde(default)]
    pub fail_on_missing_input: bool,
    /// How multiple writes to one input slot are resolved.
    #[serde(default)]
    pub overwrite_policy: OverwritePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_fast: default_fail_fast(),
            fail_on_missing_input: false,
            overwrite_policy: OverwritePolicy::default(),
        }
    }
}

fn default_fail_fast() -> bool { true }

/// Resolution of fan-in writes to the same input slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// The last write in schedule order wins.
    #[default]
    LastWins,
    /// The first write in schedule order wins.
    FirstWins,
    /// A second write is a conflict; the target node fails.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. `~/` is expanded.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String { "~/.dagflow/dagflow.db".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:18790".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))
    }

    /// Resolve the database path (expand ~).
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store.path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Substitute `${VAR}` and `${VAR:-fallback}` references in config text.
///
/// An unset variable without a fallback, or an unterminated `${`, is kept
/// verbatim.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(len) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let reference = &after[..len];
        let (name, fallback) = match reference.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (reference, None),
        };
        match (std::env::var(name), fallback) {
            (Ok(value), _) => out.push_str(&value),
            (Err(_), Some(fallback)) => out.push_str(fallback),
            (Err(_), None) => out.push_str(&rest[start..start + 3 + len]),
        }
        rest = &after[len + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_DAGFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_DAGFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_DAGFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_DAGFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_DAGFLOW_VAR}\"");
    }

    #[test]
    fn test_expand_env_vars_fallback() {
        let result = expand_env_vars("bind = \"${NONEXISTENT_DAGFLOW_BIND:-127.0.0.1:9000}\"");
        assert_eq!(result, "bind = \"127.0.0.1:9000\"");
    }

    #[test]
    fn test_expand_env_vars_unterminated() {
        std::env::set_var("TEST_DAGFLOW_PREFIX", "db");
        let result = expand_env_vars("a = \"${TEST_DAGFLOW_PREFIX}\" b = \"${OPEN");
        assert_eq!(result, "a = \"db\" b = \"${OPEN");
        std::env::remove_var("TEST_DAGFLOW_PREFIX");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.engine.fail_fast);
        assert!(!config.engine.fail_on_missing_input);
        assert_eq!(config.engine.overwrite_policy, OverwritePolicy::LastWins);
        assert_eq!(config.store.path, "~/.dagflow/dagflow.db");
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_engine_section() {
        let toml_str = r#"
[engine]
fail_fast = false
overwrite_policy = "reject"

[gateway]
bind = "0.0.0.0:8080"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.engine.fail_fast);
        assert_eq!(config.engine.overwrite_policy, OverwritePolicy::Reject);
        assert_eq!(config.gateway.unwrap().bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_store_path_expands_home() {
        let config = AppConfig {
            store: StoreConfig {
                path: "/tmp/dagflow.db".into(),
            },
            ..Default::default()
        };
        assert_eq!(config.store_path(), PathBuf::from("/tmp/dagflow.db"));

        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home("~/.dagflow/dagflow.db"),
                PathBuf::from(home).join(".dagflow/dagflow.db")
            );
        }
        assert_eq!(expand_home("data/~/x.db"), PathBuf::from("data/~/x.db"));
    }
}
