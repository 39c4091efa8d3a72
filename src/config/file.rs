use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use super::net::NetConfig;

// -----------------------------------------------------------------------------
// ----- Singleton -------------------------------------------------------------

static FILE_CONFIG: OnceCell<FileConfig> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- FileConfig ------------------------------------------------------------

/// Optional `simplenet.toml`. Missing tables fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub net: NetConfig,
}

// -----------------------------------------------------------------------------
// ----- FileConfig: Static ----------------------------------------------------

impl FileConfig {
    /// Load `path`, or use defaults when no file was given.
    pub async fn init(path: Option<&Path>) {
        let cfg = match path {
            Some(path) => Self::from_file_async(path)
                .await
                .unwrap_or_else(|e| panic!("failed to load config file {:?}: {e}", path)),
            None => FileConfig::default(),
        };

        FILE_CONFIG
            .set(cfg)
            .unwrap_or_else(|_| panic!("FileConfig::init called twice"));
    }

    pub fn handle() -> &'static FileConfig {
        FILE_CONFIG.get().expect("FileConfig not initialized")
    }

    pub async fn from_file_async(path: &Path) -> Result<FileConfig, ConfigFileError> {
        let raw = fs::read_to_string(path).await.map_err(|e| ConfigFileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<FileConfig, ConfigFileError> {
        toml::from_str(raw).map_err(|e| ConfigFileError::Toml { source: e })
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {source}")]
    Toml {
        #[source]
        source: toml::de::Error,
    },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
