use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AUTHORIZE_CACHE_FILE: &str = "authorize.json";

/// Non-secret prompt answers remembered between runs.
///
/// Client secret and state are never part of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorizeCache {
    #[serde(default)]
    pub authorize_uri: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("can't read '{path}' cache")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can't decode '{path}' cache")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("can't encode '{path}' cache")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn get_cache_file(config_dir: &Path) -> PathBuf {
    config_dir.join(AUTHORIZE_CACHE_FILE)
}

/// Loads the cache. A missing file is an empty cache, not an error.
pub fn load_cache(config_dir: &Path) -> Result<AuthorizeCache, CacheError> {
    let path = get_cache_file(config_dir);

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AuthorizeCache::default()),
        Err(source) => return Err(CacheError::Io { path, source }),
    };

    serde_json::from_str(&contents).map_err(|source| CacheError::Decode { path, source })
}

/// Writes the cache, creating the config directory if needed.
pub fn save_cache(config_dir: &Path, cache: &AuthorizeCache) -> Result<(), CacheError> {
    let path = get_cache_file(config_dir);
    let io_error = |source| CacheError::Io {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(config_dir).map_err(io_error)?;

    let json_string = serde_json::to_string_pretty(cache).map_err(|source| CacheError::Encode {
        path: path.clone(),
        source,
    })?;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(io_error)?;

    file.write_all(json_string.as_bytes()).map_err(io_error)?;
    file.flush().map_err(io_error)?;

    Ok(())
}
