// Settings persistence over the synchronized storage area
// Storage failures stop here: callers only ever see defaults, `false` or `None`

use anyhow::Context;
use serde_json::Value;
use std::cell::Cell;
use std::rc::{Rc, Weak};

use super::{ListenerId, ObservableArea, StorageChanges, StorageItems};
use crate::config::StorageKeys;
use crate::settings::{SettingsPatch, UserSettings};

#[derive(Clone)]
pub struct SettingsStore {
    area: Rc<dyn ObservableArea>,
    keys: StorageKeys,
}

impl SettingsStore {
    pub fn new(area: Rc<dyn ObservableArea>, keys: StorageKeys) -> Self {
        Self { area, keys }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Current settings merged onto the defaults. Never fails.
    pub async fn get(&self) -> UserSettings {
        match self.raw().await {
            Ok(Some(stored)) => UserSettings::from_stored(stored),
            Ok(None) => UserSettings::default(),
            Err(err) => {
                log::error!("Failed to read settings, using defaults: {:#}", err);
                UserSettings::default()
            }
        }
    }

    /// The persisted record as-is, without default merging
    pub async fn raw(&self) -> anyhow::Result<Option<Value>> {
        let key = self.keys.settings.as_str();
        let mut items = self
            .area
            .get(&[key])
            .await
            .context("Failed to read settings")?;
        Ok(items.remove(key))
    }

    pub async fn save(&self, settings: &UserSettings) -> bool {
        match self.write(settings).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to save settings: {:#}", err);
                false
            }
        }
    }

    async fn write(&self, settings: &UserSettings) -> anyhow::Result<()> {
        let value = serde_json::to_value(settings).context("Failed to serialize settings")?;
        let mut items = StorageItems::new();
        items.insert(self.keys.settings.clone(), value);
        self.area.set(items).await.context("Failed to write settings")
    }

    /// Read, shallow-merge and write back. Not atomic: two overlapping
    /// updates are last-write-wins and may drop each other's fields.
    pub async fn update(&self, patch: SettingsPatch) -> Option<UserSettings> {
        if patch.is_empty() {
            // Nothing to merge, so nothing is written and no change fires
            return match self.raw().await {
                Ok(stored) => Some(stored.map(UserSettings::from_stored).unwrap_or_default()),
                Err(err) => {
                    log::error!("Failed to read settings: {:#}", err);
                    None
                }
            };
        }
        let merged = self.get().await.merged(patch);
        if self.save(&merged).await {
            Some(merged)
        } else {
            None
        }
    }

    pub async fn reset(&self) -> bool {
        log::info!("Resetting settings to defaults");
        self.save(&UserSettings::default()).await
    }

    /// Record the time of the last successful sync (milliseconds since epoch)
    pub async fn mark_synced(&self, timestamp_ms: u64) -> bool {
        let mut items = StorageItems::new();
        items.insert(self.keys.last_sync.clone(), Value::from(timestamp_ms));
        match self.area.set(items).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Failed to record sync time: {:#}", err);
                false
            }
        }
    }

    pub async fn last_sync(&self) -> Option<u64> {
        let key = self.keys.last_sync.as_str();
        match self.area.get(&[key]).await {
            Ok(mut items) => items.remove(key).and_then(|value| value.as_u64()),
            Err(err) => {
                log::warn!("Failed to read sync time: {:#}", err);
                None
            }
        }
    }

    /// Watch the settings slot. The listener receives the new settings merged
    /// onto the defaults and the raw previous record, if any. Changes to any
    /// other key are ignored.
    pub fn on_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(UserSettings, Option<Value>) + 'static,
    {
        let key = self.keys.settings.clone();
        let id = self
            .area
            .add_listener(Rc::new(move |changes: &StorageChanges| {
                let Some(change) = changes.get(&key) else {
                    return;
                };
                let settings = change
                    .new_value
                    .clone()
                    .map(UserSettings::from_stored)
                    .unwrap_or_default();
                listener(settings, change.old_value.clone());
            }));

        Subscription {
            area: Rc::downgrade(&self.area),
            id,
            active: Cell::new(true),
        }
    }
}

/// Handle returned by [`SettingsStore::on_changed`]. Dropping it keeps the
/// listener registered; call `unsubscribe` to remove it.
pub struct Subscription {
    area: Weak<dyn ObservableArea>,
    id: ListenerId,
    active: Cell<bool>,
}

impl Subscription {
    /// Idempotent
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(area) = self.area.upgrade() {
            area.remove_listener(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{NotificationSettings, Theme, Tier};
    use crate::storage::{MemoryArea, StorageArea};
    use serde_json::json;
    use std::cell::RefCell;

    fn store() -> (Rc<MemoryArea>, SettingsStore) {
        let area = Rc::new(MemoryArea::sync());
        let store = SettingsStore::new(area.clone(), StorageKeys::default());
        (area, store)
    }

    async fn write_raw(area: &MemoryArea, key: &str, value: Value) {
        let mut items = StorageItems::new();
        items.insert(key.to_string(), value);
        area.set(items).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_store_yields_defaults() {
        let (_, store) = store();
        let settings = store.get().await;
        assert_eq!(settings, UserSettings::default());
        assert_eq!(settings.tier, Tier::Free);
        assert!(settings.enabled);
        assert_eq!(settings.theme, Theme::System);
    }

    #[tokio::test]
    async fn test_partial_records_are_completed() {
        let (area, store) = store();
        let partials = [
            json!({}),
            json!({ "tier": "pro" }),
            json!({ "notifications": { "enabled": false } }),
            json!({ "theme": "dark", "preferences": { "fontSize": 12 } }),
        ];

        for partial in partials {
            write_raw(&area, "settings", partial.clone()).await;
            let settings = serde_json::to_value(store.get().await).unwrap();
            let object = settings.as_object().unwrap();
            for field in ["tier", "enabled", "theme", "notifications", "preferences"] {
                assert!(object.contains_key(field), "{} missing after {}", field, partial);
            }
            assert!(object["notifications"].get("sound").is_some());
        }
    }

    #[tokio::test]
    async fn test_unreadable_key_keeps_other_stored_fields() {
        let (area, store) = store();
        write_raw(
            &area,
            "settings",
            json!({ "tier": "gold", "theme": "dark", "enabled": false }),
        )
        .await;

        let settings = store.get().await;
        assert_eq!(settings.tier, Tier::Free);
        assert_eq!(settings.theme, Theme::Dark);
        assert!(!settings.enabled);

        // Writing back must not turn the bad key into lost good ones
        let updated = store.update(SettingsPatch::tier(Tier::Pro)).await.unwrap();
        assert_eq!(updated.theme, Theme::Dark);
        assert!(!updated.enabled);
        let stored = area.snapshot()["settings"].clone();
        assert_eq!(stored["theme"], json!("dark"));
        assert_eq!(stored["enabled"], json!(false));
        assert_eq!(stored["tier"], json!("pro"));
    }

    #[tokio::test]
    async fn test_empty_patch_writes_nothing() {
        let (area, store) = store();
        write_raw(&area, "settings", json!({ "theme": "light" })).await;
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let _subscription = store.on_changed(move |_, _| counter.set(counter.get() + 1));

        let current = store.update(SettingsPatch::default()).await.unwrap();
        assert_eq!(current.theme, Theme::Light);
        assert_eq!(fired.get(), 0);
        assert_eq!(area.snapshot()["settings"], json!({ "theme": "light" }));

        area.set_unavailable(true);
        assert!(store.update(SettingsPatch::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_yields_defaults() {
        let (area, store) = store();
        store.save(&UserSettings {
            tier: Tier::Pro,
            ..Default::default()
        })
        .await;
        area.set_unavailable(true);
        assert_eq!(store.get().await, UserSettings::default());
    }

    #[tokio::test]
    async fn test_save_then_get_round_trips() {
        let (_, store) = store();
        let mut preferences = serde_json::Map::new();
        preferences.insert("layout".to_string(), json!({ "columns": 2 }));
        let settings = UserSettings {
            tier: Tier::Pro,
            enabled: false,
            theme: Theme::Dark,
            notifications: NotificationSettings {
                enabled: true,
                sound: true,
            },
            preferences,
        };

        assert!(store.save(&settings).await);
        assert_eq!(store.get().await, settings);
    }

    #[tokio::test]
    async fn test_update_preserves_untouched_fields() {
        let (_, store) = store();
        store
            .save(&UserSettings {
                tier: Tier::Pro,
                ..Default::default()
            })
            .await;

        let updated = store.update(SettingsPatch::theme(Theme::Light)).await.unwrap();
        assert_eq!(updated.tier, Tier::Pro);
        assert_eq!(updated.theme, Theme::Light);
        assert_eq!(store.get().await, updated);
    }

    #[tokio::test]
    async fn test_write_failures_are_reported_not_raised() {
        let (area, store) = store();
        area.set_unavailable(true);
        assert!(!store.save(&UserSettings::default()).await);
        assert!(store.update(SettingsPatch::tier(Tier::Pro)).await.is_none());
        assert!(!store.reset().await);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (area, store) = store();
        store.update(SettingsPatch::tier(Tier::Pro)).await;

        assert!(store.reset().await);
        let once = area.snapshot();
        assert!(store.reset().await);
        assert_eq!(area.snapshot(), once);
        assert_eq!(store.get().await, UserSettings::default());
    }

    #[tokio::test]
    async fn test_change_listener_sees_merged_new_and_raw_old() {
        let (area, store) = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = store.on_changed(move |settings, old| {
            sink.borrow_mut().push((settings, old));
        });

        write_raw(&area, "settings", json!({ "theme": "dark" })).await;
        write_raw(&area, "cache", json!({ "anything": true })).await;
        store.update(SettingsPatch::tier(Tier::Pro)).await;

        {
            let seen = seen.borrow();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].0.theme, Theme::Dark);
            assert_eq!(seen[0].0.tier, Tier::Free);
            assert_eq!(seen[0].1, None);
            assert_eq!(seen[1].0.tier, Tier::Pro);
            assert_eq!(seen[1].1, Some(json!({ "theme": "dark" })));
        }

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        store.reset().await;
        assert_eq!(seen.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_only_its_listener() {
        let (area, store) = store();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let a = first.clone();
        let sub_a = store.on_changed(move |_, _| a.set(a.get() + 1));
        let b = second.clone();
        let _sub_b = store.on_changed(move |_, _| b.set(b.get() + 1));

        sub_a.unsubscribe();
        sub_a.unsubscribe();
        assert_eq!(area.listener_count(), 1);

        store.update(SettingsPatch::enabled(false)).await;
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[tokio::test]
    async fn test_last_sync_slot() {
        let (area, store) = store();
        assert_eq!(store.last_sync().await, None);
        assert!(store.mark_synced(1_700_000_000_000).await);
        assert_eq!(store.last_sync().await, Some(1_700_000_000_000));
        assert!(area.snapshot().contains_key("lastSync"));
        assert_eq!(store.get().await, UserSettings::default());
    }
}
