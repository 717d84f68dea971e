// Key-value storage areas and the stores built on them
// "sync" carries settings and reports changes; "local" holds larger payloads

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
pub mod chrome;
pub mod local;
pub mod memory;
pub mod settings_store;

pub use local::LocalStore;
pub use memory::MemoryArea;
pub use settings_store::{SettingsStore, Subscription};

pub type StorageItems = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaName {
    Sync,
    Local,
}

impl AreaName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AreaName::Sync => "sync",
            AreaName::Local => "local",
        }
    }
}

impl std::fmt::Display for AreaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key's transition. `None` means absent.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type StorageChanges = BTreeMap<String, StorageChange>;

pub type ChangeListener = Rc<dyn Fn(&StorageChanges)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Asynchronous key-value area. Writes are atomic per call.
#[async_trait(?Send)]
pub trait StorageArea {
    fn area(&self) -> AreaName;

    /// Only keys that exist are returned
    async fn get(&self, keys: &[&str]) -> anyhow::Result<StorageItems>;

    async fn set(&self, items: StorageItems) -> anyhow::Result<()>;

    async fn remove(&self, keys: &[&str]) -> anyhow::Result<()>;

    async fn clear(&self) -> anyhow::Result<()>;
}

/// Area that reports its own changes to registered listeners
pub trait ObservableArea: StorageArea {
    fn add_listener(&self, listener: ChangeListener) -> ListenerId;

    /// Returns false when the listener was already gone
    fn remove_listener(&self, id: ListenerId) -> bool;
}
