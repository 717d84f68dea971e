use serde::de::DeserializeOwned;
use serde::Serialize;
use std::rc::Rc;

use super::{StorageArea, StorageItems};

/// Typed access to the "local" area for payloads too large for sync.
/// No change notification. Failures are logged and surface as `None`/`false`.
#[derive(Clone)]
pub struct LocalStore {
    area: Rc<dyn StorageArea>,
}

impl LocalStore {
    pub fn new(area: Rc<dyn StorageArea>) -> Self {
        Self { area }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.area.get(&[key]).await {
            Ok(mut items) => items.remove(key)?,
            Err(err) => {
                log::warn!("Failed to read '{}' from {} storage: {:#}", key, self.area.area(), err);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Stored '{}' has unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to serialize '{}': {}", key, e);
                return false;
            }
        };

        let mut items = StorageItems::new();
        items.insert(key.to_string(), value);
        match self.area.set(items).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Failed to write '{}' to {} storage: {:#}", key, self.area.area(), err);
                false
            }
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self.area.remove(&[key]).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Failed to remove '{}': {:#}", key, err);
                false
            }
        }
    }
}
