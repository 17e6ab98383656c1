//! Configuration loading and validation for octavo.
//!
//! Settings merge in three layers, later layers winning: built-in
//! defaults (platform data directories), an optional TOML file, and
//! `OCTAVO_*` environment variables (`OCTAVO_DATABASE__PATH`,
//! `OCTAVO_IDS__SECRET`, …).

pub mod error;

pub use crate::error::{Error, ErrorKind, Result};

use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const ENV_PREFIX: &str = "OCTAVO_";
/// The placeholder deployment secret shipped in defaults. Deployments
/// must override it or their external ids are trivially decodable with a
/// copy of this source.
const DEFAULT_ID_SECRET: u64 = 72911;

/// Database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite catalogue file.
    pub path: PathBuf,
}

/// Blob store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the content-keyed file store.
    pub root: PathBuf,
    /// Maximum size of one stored blob, in bytes. Unlimited when absent.
    pub max_file_size: Option<u64>,
}

/// Opaque-identifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdsConfig {
    /// Deployment secret keying the external-id codec.
    pub secret: u64,
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub ids: IdsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", "octavo")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            database: DatabaseConfig { path: data_dir.join("catalogue.db") },
            storage: StorageConfig { root: data_dir.join("blobs"), max_file_size: None },
            ids: IdsConfig { secret: DEFAULT_ID_SECRET },
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (if given), then
    /// environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        if config.ids.secret == DEFAULT_ID_SECRET {
            warn!("ids.secret is the built-in default; set your own value");
        }
        Ok(config)
    }
}
