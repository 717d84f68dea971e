use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type TabId = u32;

/// Tab metadata derived per request from the runtime; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u32>,
}

/// Who sent a message. `tab` is only set for content scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<TabInfo>,
}

impl MessageSender {
    pub fn from_tab(tab: TabInfo) -> Self {
        Self {
            url: tab.url.clone(),
            tab: Some(tab),
            ..Default::default()
        }
    }
}

/// `chrome.tabs.query` filter for the active tab of the focused window.
/// Service workers have no current window.
pub fn active_tab_filter() -> serde_json::Value {
    serde_json::json!({ "active": true, "lastFocusedWindow": true })
}

/// Lookup of the active tab in the focused window
#[async_trait(?Send)]
pub trait TabQuery {
    async fn active_tab(&self) -> anyhow::Result<Option<TabInfo>>;
}
