//! Config - 返品処理の設定
//!
//! TOML ファイルから読み込みます。ファイルがなければデフォルト値を使います。
//!
//! ```toml
//! database_path = "returns.db"
//! restock_on_receive = true
//! require_fulfilled_order = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReturnsConfig {
    /// SQLite database file used by the CLI.
    pub database_path: PathBuf,

    /// Restock on `APPROVED -> RECEIVED` when the return was not restocked at creation.
    pub restock_on_receive: bool,

    /// Validate new returns against the originating order.
    pub require_fulfilled_order: bool,
}

impl Default for ReturnsConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("returns.db"),
            restock_on_receive: true,
            require_fulfilled_order: true,
        }
    }
}

impl ReturnsConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
