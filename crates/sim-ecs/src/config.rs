//! Config service and storage port, shared by every crate that persists
//! typed configuration.
//!
//! A `ConfigStore` port plus a `ConfigService<S>` wrapper on top of it: the
//! store moves raw bytes, the service (de)serializes typed values.
//! Environment-variable-backed defaults for the concrete config structs
//! (`AuthConfig`, `ContainerConfig`, ...) live next to the crate they
//! configure rather than here, since that table is just a flat list of
//! scalars, not a blob to load/save.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Storage port for raw config blobs, keyed by logical name.
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config load/save operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in the store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes config values and delegates storage to a
/// [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// An in-memory [`ConfigStore`], used in tests and as the default when no
/// persistence backend is configured.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    blobs: std::sync::Mutex<rustc_hash::FxHashMap<String, Vec<u8>>>,
}

impl InMemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.blobs
            .lock()
            .map_or(Err(ConfigError::Other("lock poisoned".to_string())), |guard| {
                guard.get(key).cloned().ok_or(ConfigError::NotFound)
            })
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.blobs
            .lock()
            .map_or(Err(ConfigError::Other("lock poisoned".to_string())), |mut guard| {
                guard.insert(key.to_string(), data.to_vec());
                Ok(())
            })
    }
}

/// Read an environment variable and parse it, falling back to `default`
/// when unset or unparsable. Used by every ambient config struct's `from_env`.
#[must_use]
pub fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn save_then_load_round_trips() {
        let service = ConfigService::new(InMemoryConfigStore::new());
        service.save("sample", &Sample { value: 42 }).unwrap();
        let loaded: Option<Sample> = service.load("sample").unwrap();
        assert_eq!(loaded, Some(Sample { value: 42 }));
    }

    #[test]
    fn load_missing_key_returns_none() {
        let service = ConfigService::new(InMemoryConfigStore::new());
        let loaded: Option<Sample> = service.load("missing").unwrap();
        assert_eq!(loaded, None);
    }
}
