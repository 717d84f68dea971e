// Typed request helpers for popup, options and content script contexts
// Peers never touch the store; everything goes through the coordinator

use serde_json::Value;

use crate::features::Feature;
use crate::protocol::{
    ActionAck, ActionRequest, FeatureAccess, FeatureQuery, Message, Messenger, PageInfo, Response,
    TabInfo,
};
use crate::settings::{SettingsPatch, UserSettings};

#[derive(Clone)]
pub struct ExtensionClient {
    messenger: Messenger,
}

impl ExtensionClient {
    pub fn new(messenger: Messenger) -> Self {
        Self { messenger }
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub async fn get_settings(&self) -> Response<UserSettings> {
        self.messenger.request(&Message::GetSettings).await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Response<UserSettings> {
        self.messenger.request(&Message::UpdateSettings(patch)).await
    }

    pub async fn get_tab_info(&self) -> Response<TabInfo> {
        self.messenger.request(&Message::GetTabInfo).await
    }

    pub async fn notify_ready(&self, page: PageInfo) -> Response {
        self.messenger.send(&Message::ContentScriptReady(page)).await
    }

    pub async fn perform_action(&self, action: &str, data: Option<Value>) -> Response<ActionAck> {
        let request = ActionRequest {
            action: action.to_string(),
            data,
        };
        self.messenger.request(&Message::PerformAction(request)).await
    }

    pub async fn check_feature_access(&self, feature: Feature) -> Response<FeatureAccess> {
        self.messenger
            .request(&Message::CheckFeatureAccess(FeatureQuery { feature }))
            .await
    }

    /// Convenience for UI gating: any failure counts as no access
    pub async fn can_use(&self, feature: Feature) -> bool {
        self.check_feature_access(feature)
            .await
            .data
            .is_some_and(|access| access.has_access)
    }
}
