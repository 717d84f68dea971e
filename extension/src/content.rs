// Content script side of the core
// Checks the global switch, announces itself, and answers reach-in actions

use crate::client::ExtensionClient;
use crate::protocol::{
    ActionAck, HandlerResult, Message, MessageSender, MessageType, PageInfo, Router,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentScriptState {
    /// Settings say the extension is switched off
    Disabled,
    /// Coordinator acknowledged the ready notification
    Ready,
    /// Coordinator could not be reached
    Unreachable(String),
}

pub struct ContentScript {
    client: ExtensionClient,
    page: PageInfo,
}

impl ContentScript {
    pub fn new(client: ExtensionClient, page: PageInfo) -> Self {
        Self { client, page }
    }

    pub fn page(&self) -> &PageInfo {
        &self.page
    }

    pub async fn init(&self) -> ContentScriptState {
        let settings = match self.client.get_settings().await.into_result() {
            Ok(Some(settings)) => settings,
            Ok(None) => return ContentScriptState::Unreachable("Empty settings reply".to_string()),
            Err(err) => {
                log::warn!("Content script could not load settings: {}", err);
                return ContentScriptState::Unreachable(err);
            }
        };

        if !settings.enabled {
            log::debug!("Extension disabled, content script idle on {}", self.page.url);
            return ContentScriptState::Disabled;
        }

        match self.client.notify_ready(self.page.clone()).await.into_result() {
            Ok(_) => ContentScriptState::Ready,
            Err(err) => {
                log::warn!("Ready notification failed: {}", err);
                ContentScriptState::Unreachable(err)
            }
        }
    }

    /// Listener for coordinator-to-tab requests
    pub fn router(&self) -> Router {
        let url = self.page.url.clone();
        Router::new().route_fn(
            MessageType::PerformAction,
            move |message: Message, _sender: MessageSender| {
                let url = url.clone();
                async move { perform_on_page(&url, message) }
            },
        )
    }
}

fn perform_on_page(url: &str, message: Message) -> HandlerResult {
    let request = match message {
        Message::PerformAction(request) => request,
        other => anyhow::bail!("Unexpected {} for page action", other.kind()),
    };
    log::info!("Performing '{}' on {}", request.action, url);
    let ack = ActionAck::acknowledged(request.action);
    Ok(Some(serde_json::to_value(ack)?))
}
