//! Write-once store for values discovered during a run.

use crate::errors::DataConflictError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// Values captured by readiness checks for later stages to read.
///
/// Each key may be written once. Writing an existing key raises a
/// `DataConflictError`.
#[derive(Debug, Default)]
pub struct DiscoveredValues {
    data: RwLock<HashMap<String, Value>>,
}

impl DiscoveredValues {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Gets a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.data
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Gets a value decoded as `T`. Returns `None` if absent or of another shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Records a value.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), DataConflictError> {
        let key = key.into();
        let mut data = self.data.write();

        if data.contains_key(&key) {
            return Err(DataConflictError::new(key));
        }

        data.insert(key, value.into());
        Ok(())
    }

    /// Returns a copy of all values.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing has been discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}
