//! Configuration loader: layers every source in precedence order.

use super::merge::merge_policy;
use super::sources::{environment, global_file};
use super::ParleyConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::Path;
use tracing::debug;

/// Loads `ParleyConfig` from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): built-in defaults, global file,
    /// `config/config.toml`, `config/{PARLEY_ENV}.toml`, `PARLEY_*` environment.
    pub fn load(workspace_root: &Path) -> Result<ParleyConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = with_workspace_files(builder, workspace_root);
        let builder = environment::add_to_builder(builder);

        let config: ParleyConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace_root = %workspace_root.display(),
            store_path = %config.storage.store_path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from one explicit file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<ParleyConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        builder
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }
}

/// Stack `config/config.toml`, then `config/{PARLEY_ENV}.toml` (default
/// `development`), for whichever of them exist under `workspace_root`.
fn with_workspace_files(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> ConfigBuilder<DefaultState> {
    let config_dir = workspace_root.join("config");
    let profile = std::env::var("PARLEY_ENV").unwrap_or_else(|_| "development".to_string());

    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", profile)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .fold(builder, |builder, path| {
        debug!(config_path = %path.display(), "Adding workspace configuration");
        builder.add_source(File::from(path.as_path()))
    })
}
