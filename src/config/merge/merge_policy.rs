//! Merge rules: defaults, override order, conflict handling.

use crate::allocator::DEFAULT_BLOCK_SIZE;
use crate::config::StorageConfig;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key; lists such as
/// `assembly.model_roles` are replaced whole, never concatenated.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    let store_path = StorageConfig::default_store_path();
    Config::builder()
        .set_default(
            "storage.store_path",
            store_path.to_string_lossy().into_owned(),
        )?
        .set_default("allocator.block_size", DEFAULT_BLOCK_SIZE)?
        .set_default("assembly.fallback_to_all_participants", true)?
        .set_default("assembly.model_roles", vec!["output", "code", "result"])
}
