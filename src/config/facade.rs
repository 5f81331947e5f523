//! Loader that stacks the configuration sources in precedence order.

use super::merge::merge_policy;
use super::sources::{env, global_file, workspace_file};
use super::PlayerConfig;
use config::{Config, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Sources, lowest precedence first: built-in defaults, the user-level
    /// file, `config/config.toml`, `config/{STUDYPLAYER_ENV}.toml`, then
    /// `STUDYPLAYER__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<PlayerConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);

        let config: PlayerConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a single file, without other layers.
    pub fn load_from_file(path: &Path) -> Result<PlayerConfig, ConfigError> {
        Config::builder()
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    /// Path of the user-level config file, if a home directory is known.
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Built-in defaults only.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> PlayerConfig {
        PlayerConfig::default()
    }
}
