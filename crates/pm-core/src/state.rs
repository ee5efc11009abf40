//! Persisted agent state.

use std::collections::HashMap;

use thiserror::Error;

/// A write to the state store failed.
#[derive(Debug, Error)]
#[error("failed to persist state key {key}")]
pub struct StateError {
    key: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl StateError {
    pub fn new(
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Named boolean flags that survive across agent sessions.
pub trait StateStore {
    /// Reads a flag, falling back to `default` when it was never written.
    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StateError>;
}

/// A non-durable store, for tests and hosts without persistence.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    values: HashMap<String, bool>,
    writes: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_bool` calls seen so far.
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl StateStore for MemoryStateStore {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values.get(key).copied().unwrap_or(default)
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StateError> {
        self.values.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_returns_default() {
        let store = MemoryStateStore::new();
        assert!(store.get_bool("absent", true));
        assert!(!store.get_bool("absent", false));
    }

    #[test]
    fn set_then_get() {
        let mut store = MemoryStateStore::new();
        store.set_bool("flag", true).unwrap();
        assert!(store.get_bool("flag", false));
        store.set_bool("flag", false).unwrap();
        assert!(!store.get_bool("flag", true));
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn state_error_reports_key() {
        let err = StateError::new("flag", "disk full");
        assert_eq!(err.key(), "flag");
        assert_eq!(err.to_string(), "failed to persist state key flag");
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("disk full".to_string())
        );
    }
}
