//! Config loading entry points

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::FsConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};

/// Environment variable prefix; `TREEFS__STORAGE__BACKEND=memory` sets `storage.backend`.
pub const ENV_PREFIX: &str = "TREEFS";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with full precedence: defaults, user config file, workspace
    /// `config/config.toml` and `config/{TREEFS_ENV}.toml`, environment.
    pub fn load(workspace_root: &Path) -> Result<FsConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("quota.notification_recipients")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }

    /// Load a single file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<FsConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Per-user config file location, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
