//! Backend selection.
//!
//! Which physical storage backs the store is a startup decision, not a
//! special case inside the store. Configuration comes either as a
//! deserialized [`BackendConfig`] or from environment variables:
//!
//! - `WHISPER_HUB_BACKEND`: `memory` | `file` | `sqlite` | `rest`
//!   (default: `memory`)
//! - `WHISPER_HUB_PATH`: data path for `file`/`sqlite` (sqlite falls
//!   back to the platform data directory when unset)
//! - `WHISPER_HUB_REST_URL`: API root for `rest`
//! - `WHISPER_HUB_REST_KEY`: optional API key for `rest`

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, FileBackend, MemoryBackend, RestBackend, SqliteBackend};
use crate::error::StoreError;
use crate::store::LineageStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    File {
        path: PathBuf,
    },
    Sqlite {
        /// `None` selects the platform data directory.
        path: Option<PathBuf>,
    },
    Rest {
        base_url: String,
        api_key: Option<String>,
    },
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        let kind = std::env::var("WHISPER_HUB_BACKEND").unwrap_or_else(|_| "memory".to_string());
        match kind.as_str() {
            "memory" => Ok(Self::Memory),
            "file" => {
                let path = std::env::var("WHISPER_HUB_PATH").map_err(|_| {
                    StoreError::InvalidInput(
                        "WHISPER_HUB_BACKEND=file requires WHISPER_HUB_PATH".into(),
                    )
                })?;
                Ok(Self::File { path: path.into() })
            }
            "sqlite" => Ok(Self::Sqlite {
                path: std::env::var("WHISPER_HUB_PATH").ok().map(PathBuf::from),
            }),
            "rest" => {
                let base_url = std::env::var("WHISPER_HUB_REST_URL").map_err(|_| {
                    StoreError::InvalidInput(
                        "WHISPER_HUB_BACKEND=rest requires WHISPER_HUB_REST_URL".into(),
                    )
                })?;
                Ok(Self::Rest {
                    base_url,
                    api_key: std::env::var("WHISPER_HUB_REST_KEY").ok(),
                })
            }
            other => Err(StoreError::InvalidInput(format!(
                "unknown backend kind {:?}",
                other
            ))),
        }
    }

    /// Open the configured backend, running any repair/migration it needs
    /// before it takes traffic.
    pub fn open(&self) -> Result<Arc<dyn Backend>, StoreError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryBackend::new())),
            Self::File { path } => Ok(Arc::new(FileBackend::open(path.clone())?)),
            Self::Sqlite { path } => {
                let backend = match path {
                    Some(path) => SqliteBackend::open(path.clone())?,
                    None => SqliteBackend::open_default()?,
                };
                backend.migrate()?;
                Ok(Arc::new(backend))
            }
            Self::Rest { base_url, api_key } => {
                Ok(Arc::new(RestBackend::new(base_url.clone(), api_key.clone())))
            }
        }
    }
}

impl LineageStore {
    /// Convenience: open the configured backend and wrap it in a store.
    pub fn from_config(config: &BackendConfig) -> Result<Self, StoreError> {
        Ok(Self::new(config.open()?))
    }
}
