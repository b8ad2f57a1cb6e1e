//! Base layer every other source is merged over.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Seed the builder with the values sources most often override.
///
/// Sections are merged key by key, so a file that sets only
/// `revisions.keep_num` leaves the rest of the defaults in place. Keys not
/// seeded here fall back to the serde defaults on `FsConfig`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    [
        ("storage.backend", "sled"),
        ("storage.metadata_path", ".treefs/metadata"),
        ("storage.blob_path", ".treefs/content"),
    ]
    .into_iter()
    .try_fold(Config::builder(), |builder, (key, value)| builder.set_default(key, value))?
    .set_default("filesystem.modlog_active", true)?
    .set_default("transaction.max_conflict_retries", 8)?
    .set_default("stat_cache.capacity", 4096)
}
