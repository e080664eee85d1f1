use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exec::{ExecutionOptions, FailurePolicy};

/// Location of the project config, relative to the project root.
pub const CONFIG_PATH: &str = ".feedrank/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-invocation timeout in milliseconds; `0` disables it.
    #[serde(default)]
    pub function_timeout_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_link_field")]
    pub link_field: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            function_timeout_ms: 0,
            failure_policy: FailurePolicy::default(),
            id_field: default_id_field(),
            link_field: default_link_field(),
        }
    }
}

impl RankingConfig {
    #[must_use]
    pub fn function_timeout(&self) -> Option<Duration> {
        (self.function_timeout_ms > 0).then(|| Duration::from_millis(self.function_timeout_ms))
    }

    #[must_use]
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            workers: self.workers.max(1),
            timeout: self.function_timeout(),
            policy: self.failure_policy,
            id_field: self.id_field.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl StoreConfig {
    /// Store directory, resolved against `project_root` when relative.
    #[must_use]
    pub fn resolve_dir(&self, project_root: &Path) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            project_root.join(&self.dir)
        }
    }
}

/// Load `.feedrank/config.toml` under `project_root`, or defaults if absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(CONFIG_PATH);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_workers() -> usize {
    1
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_link_field() -> String {
    "url".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".feedrank/algorithms")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, content: &str) {
        let path = root.join(CONFIG_PATH);
        std::fs::create_dir_all(path.parent().expect("config has a parent"))
            .expect("create config dir");
        std::fs::write(path, content).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let cfg = load_project_config(temp.path()).expect("load should succeed");

        assert_eq!(cfg, ProjectConfig::default());
        assert_eq!(cfg.ranking.workers, 1);
        assert!(cfg.ranking.function_timeout().is_none());
        assert_eq!(cfg.ranking.failure_policy, FailurePolicy::Isolate);
        assert_eq!(cfg.ranking.id_field, "id");
        assert_eq!(cfg.ranking.link_field, "url");
        assert_eq!(
            cfg.store.resolve_dir(temp.path()),
            temp.path().join(".feedrank/algorithms")
        );
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        write_config(
            temp.path(),
            r#"
[ranking]
workers = 8
function_timeout_ms = 250
failure_policy = "fail_fast"
link_field = "twitter_url"
"#,
        );

        let cfg = load_project_config(temp.path()).expect("load should succeed");
        assert_eq!(cfg.ranking.workers, 8);
        assert_eq!(
            cfg.ranking.function_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(cfg.ranking.failure_policy, FailurePolicy::FailFast);
        assert_eq!(cfg.ranking.id_field, "id");
        assert_eq!(cfg.ranking.link_field, "twitter_url");
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn execution_options_clamp_workers() {
        let ranking = RankingConfig {
            workers: 0,
            ..RankingConfig::default()
        };
        assert_eq!(ranking.execution_options().workers, 1);
    }

    #[test]
    fn absolute_store_dir_is_kept() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = StoreConfig {
            dir: temp.path().join("algos"),
        };
        assert_eq!(store.resolve_dir(Path::new("/elsewhere")), temp.path().join("algos"));
    }

    #[test]
    fn invalid_policy_is_a_parse_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        write_config(temp.path(), "[ranking]\nfailure_policy = \"sometimes\"\n");

        let err = load_project_config(temp.path()).expect_err("unknown policy");
        assert!(format!("{err:#}").contains("Failed to parse"));
    }
}
