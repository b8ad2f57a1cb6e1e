//! Per-user source: `{config_dir}/treefs/config.toml`

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::debug;

/// XDG config dir on Linux, `Application Support` on macOS.
pub fn global_config_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "treefs")?;
    Some(dirs.config_dir().join("config.toml"))
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match global_config_path() {
        Some(path) if path.is_file() => {
            let path = dunce::canonicalize(&path).unwrap_or(path);
            debug!(config_path = %path.display(), "Layering per-user configuration");
            Ok(builder.add_source(File::from(path).required(false)))
        }
        _ => Ok(builder),
    }
}
