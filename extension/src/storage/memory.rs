// In-process storage area
// Backs native builds and tests; mirrors chrome.storage change reporting

use async_trait::async_trait;
use std::cell::{Cell, RefCell};

use super::{
    AreaName, ChangeListener, ListenerId, ObservableArea, StorageArea, StorageChange,
    StorageChanges, StorageItems,
};

pub struct MemoryArea {
    area: AreaName,
    items: RefCell<StorageItems>,
    listeners: RefCell<Vec<(ListenerId, ChangeListener)>>,
    next_listener: Cell<u64>,
    unavailable: Cell<bool>,
}

impl MemoryArea {
    pub fn new(area: AreaName) -> Self {
        Self {
            area,
            items: RefCell::new(StorageItems::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            unavailable: Cell::new(false),
        }
    }

    pub fn sync() -> Self {
        Self::new(AreaName::Sync)
    }

    pub fn local() -> Self {
        Self::new(AreaName::Local)
    }

    /// Simulate a backend outage: every operation fails until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    pub fn snapshot(&self) -> StorageItems {
        self.items.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.get() {
            anyhow::bail!("Storage area '{}' is unavailable", self.area);
        }
        Ok(())
    }

    fn notify(&self, changes: StorageChanges) {
        if changes.is_empty() {
            return;
        }
        // Listeners may touch the area again, so call them without holding the borrow
        let listeners: Vec<ChangeListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&changes);
        }
    }
}

#[async_trait(?Send)]
impl StorageArea for MemoryArea {
    fn area(&self) -> AreaName {
        self.area
    }

    async fn get(&self, keys: &[&str]) -> anyhow::Result<StorageItems> {
        self.check_available()?;
        let items = self.items.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| items.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: StorageItems) -> anyhow::Result<()> {
        self.check_available()?;
        let mut changes = StorageChanges::new();
        {
            let mut stored = self.items.borrow_mut();
            for (key, value) in items {
                let old_value = stored.insert(key.clone(), value.clone());
                if old_value.as_ref() != Some(&value) {
                    changes.insert(
                        key,
                        StorageChange {
                            old_value,
                            new_value: Some(value),
                        },
                    );
                }
            }
        }
        self.notify(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> anyhow::Result<()> {
        self.check_available()?;
        let mut changes = StorageChanges::new();
        {
            let mut stored = self.items.borrow_mut();
            for key in keys {
                if let Some(old_value) = stored.remove(*key) {
                    changes.insert(
                        key.to_string(),
                        StorageChange {
                            old_value: Some(old_value),
                            new_value: None,
                        },
                    );
                }
            }
        }
        self.notify(changes);
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.check_available()?;
        let removed = std::mem::take(&mut *self.items.borrow_mut());
        let changes = removed
            .into_iter()
            .map(|(key, old_value)| {
                (
                    key,
                    StorageChange {
                        old_value: Some(old_value),
                        new_value: None,
                    },
                )
            })
            .collect();
        self.notify(changes);
        Ok(())
    }
}

impl ObservableArea for MemoryArea {
    fn add_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
