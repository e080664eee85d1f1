pub mod completions;
pub mod list;
pub mod rank;
pub mod remove;
pub mod save;
pub mod show;

use std::path::{Path, PathBuf};

use anyhow::Result;
use feedrank_core::AlgorithmStore;
use feedrank_core::config::{self, ProjectConfig};
use tracing::debug;

/// Project config plus the algorithm store it points at.
pub struct Workspace {
    pub config: ProjectConfig,
    pub store: AlgorithmStore,
}

/// Load `.feedrank/config.toml` and open the store. `store_override`
/// replaces `[store] dir` and is resolved against `project_root` when
/// relative.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
pub fn open_workspace(project_root: &Path, store_override: Option<&PathBuf>) -> Result<Workspace> {
    let mut config = config::load_project_config(project_root)?;
    if let Some(dir) = store_override {
        config.store.dir.clone_from(dir);
    }

    let store_dir = config.store.resolve_dir(project_root);
    debug!(store = %store_dir.display(), "opened workspace");
    Ok(Workspace {
        store: AlgorithmStore::new(store_dir),
        config,
    })
}
