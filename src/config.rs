//! Configuration System
//!
//! Layered configuration for the engine: storage location, identifier
//! allocation, assembly behaviour and logging. Sources are merged by
//! `ConfigLoader`; `ParleyConfig::validate` reports every problem at once.

use crate::allocator::DEFAULT_BLOCK_SIZE;
use crate::conversation::ConversationSettings;
use crate::logging::LoggingConfig;
use crate::query::AssemblySettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub assembly: AssemblySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the conversation store lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_store_path")]
    pub store_path: PathBuf,
}

impl StorageConfig {
    /// Platform data directory (`…/parley/store`), or `.parley/store` when
    /// no home directory can be resolved.
    pub fn default_store_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "parley")
            .map(|dirs| dirs.data_dir().join("store"))
            .unwrap_or_else(|| PathBuf::from(".parley/store"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: Self::default_store_path(),
        }
    }
}

/// Identifier allocator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Identifiers reserved from the store per refill
    #[serde(default = "default_block_size")]
    pub block_size: u64,
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Storage(String),
    Allocator(String),
    Assembly(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Allocator(msg) => write!(f, "Allocator: {}", msg),
            ValidationError::Assembly(msg) => write!(f, "Assembly: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ParleyConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }

        if self.allocator.block_size == 0 {
            errors.push(ValidationError::Allocator(
                "Block size must be at least 1".to_string(),
            ));
        }

        if self.assembly.model_roles.is_empty() {
            errors.push(ValidationError::Assembly(
                "Model role list cannot be empty".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "text") {
            errors.push(ValidationError::Logging(format!(
                "Invalid format '{}'",
                self.logging.format
            )));
        }
        if !matches!(
            self.logging.output.as_str(),
            "stdout" | "stderr" | "file" | "both"
        ) {
            errors.push(ValidationError::Logging(format!(
                "Invalid output '{}'",
                self.logging.output
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runtime settings handed to each conversation.
    pub fn conversation_settings(&self) -> ConversationSettings {
        ConversationSettings {
            block_size: self.allocator.block_size,
            assembly: self.assembly.clone(),
        }
    }
}
