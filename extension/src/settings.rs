// User settings shared by every extension context
// The persisted record lives in the synchronized storage area; contexts only hold copies

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subscription level driving feature gating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// `sound` only matters while `enabled` is set; the store does not enforce it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub sound: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub tier: Tier,
    /// Global switch checked by the content script before it does anything
    pub enabled: bool,
    pub theme: Theme,
    pub notifications: NotificationSettings,
    pub preferences: Map<String, Value>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            tier: Tier::Free,
            enabled: true,
            theme: Theme::System,
            notifications: NotificationSettings::default(),
            preferences: Map::new(),
        }
    }
}

impl UserSettings {
    /// Decode a stored record, filling absent top-level keys from the defaults.
    ///
    /// The merge is shallow: a stored key replaces the default wholesale. Each
    /// key is decoded on its own, so one unreadable value only costs that key.
    /// A non-object record contributes nothing.
    pub fn from_stored(stored: Value) -> Self {
        let mut settings = Self::default();
        let Value::Object(record) = stored else {
            log::warn!("Stored settings are not an object, using defaults");
            return settings;
        };

        for (key, value) in record {
            let applied = match key.as_str() {
                "tier" => decode(value).map(|tier| settings.tier = tier),
                "enabled" => decode(value).map(|enabled| settings.enabled = enabled),
                "theme" => decode(value).map(|theme| settings.theme = theme),
                "notifications" => decode(value).map(|n| settings.notifications = n),
                "preferences" => decode(value).map(|p| settings.preferences = p),
                // Keys from older layouts
                _ => continue,
            };
            if let Err(err) = applied {
                log::warn!("Ignoring unreadable stored '{}', using default: {}", key, err);
            }
        }
        settings
    }

    /// Apply a partial update, replacing each supplied top-level field
    pub fn merged(mut self, patch: SettingsPatch) -> Self {
        if let Some(tier) = patch.tier {
            self.tier = tier;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        if let Some(preferences) = patch.preferences {
            self.preferences = preferences;
        }
        self
    }
}

/// Partial settings carried by UPDATE_SETTINGS
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Map<String, Value>>,
}

impl SettingsPatch {
    pub fn tier(tier: Tier) -> Self {
        Self {
            tier: Some(tier),
            ..Default::default()
        }
    }

    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Default::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    serde_json::from_value(value)
}
