//! Workspace sources: `config/config.toml`, then `config/{TREEFS_ENV}.toml`

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selects the environment overlay file; defaults to `development`.
pub const ENV_SELECTOR: &str = "TREEFS_ENV";

fn candidates(workspace_root: &Path) -> [PathBuf; 2] {
    let dir = workspace_root.join("config");
    let env = std::env::var(ENV_SELECTOR).unwrap_or_else(|_| "development".to_string());
    [dir.join("config.toml"), dir.join(format!("{}.toml", env))]
}

/// Layer whichever workspace files exist, base first.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(candidates(workspace_root)
        .into_iter()
        .filter(|path| path.is_file())
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Layering workspace configuration");
            builder.add_source(File::from(path))
        }))
}
