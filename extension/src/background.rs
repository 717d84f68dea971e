// Background coordinator
// Sole writer of the settings store; answers every message tag
// Holds no state between terminations: each handler re-reads the store

use anyhow::Context;
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

use crate::features::has_access;
use crate::protocol::{
    ActionAck, FeatureAccess, Handler, HandlerResult, Message, MessageSender, MessageType,
    Router, TabInfo, TabQuery,
};
use crate::storage::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Uninitialized,
    Active,
}

/// Why the runtime fired its install event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallReason {
    Install,
    Update,
    ChromeUpdate,
    SharedModuleUpdate,
}

pub struct Coordinator {
    store: SettingsStore,
    tabs: Rc<dyn TabQuery>,
    state: Cell<CoordinatorState>,
}

impl Coordinator {
    pub fn new(store: SettingsStore, tabs: Rc<dyn TabQuery>) -> Rc<Self> {
        Rc::new(Self {
            store,
            tabs,
            state: Cell::new(CoordinatorState::Uninitialized),
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.state.get()
    }

    /// Activate and build the dispatch table answering every tag
    pub fn start(self: &Rc<Self>) -> Router {
        self.state.set(CoordinatorState::Active);
        log::info!("Background coordinator active");

        let handler: Rc<dyn Handler> = self.clone();
        MessageType::ALL
            .into_iter()
            .fold(Router::new(), |router, kind| router.route(kind, handler.clone()))
    }

    /// Seed defaults on a fresh install; keep user settings on updates
    pub async fn on_installed(&self, reason: InstallReason) {
        log::info!("Extension installed or updated ({:?})", reason);
        if reason != InstallReason::Install {
            return;
        }

        match self.store.raw().await {
            Ok(None) => {
                if !self.store.reset().await {
                    log::warn!("Could not seed default settings");
                }
            }
            Ok(Some(_)) => log::info!("Existing settings kept"),
            Err(err) => log::warn!("Skipping settings seed: {:#}", err),
        }
    }

    async fn respond(&self, message: Message, sender: MessageSender) -> HandlerResult {
        if self.state() != CoordinatorState::Active {
            anyhow::bail!("Background coordinator is not active");
        }

        match message {
            Message::GetSettings => {
                let settings = self.store.get().await;
                Ok(Some(serde_json::to_value(settings)?))
            }
            Message::UpdateSettings(patch) => {
                let settings = self
                    .store
                    .update(patch)
                    .await
                    .context("Failed to update settings")?;
                Ok(Some(serde_json::to_value(settings)?))
            }
            Message::GetTabInfo => {
                let tab = self.tab_info(sender).await?;
                Ok(Some(serde_json::to_value(tab)?))
            }
            Message::ContentScriptReady(page) => {
                log::info!(
                    "Content script ready in tab {:?}: {} ({})",
                    sender.tab.as_ref().map(|tab| tab.id),
                    page.title,
                    page.url
                );
                Ok(None)
            }
            Message::PerformAction(request) => {
                log::info!("Performing action: {}", request.action);
                let ack = ActionAck::acknowledged(request.action);
                Ok(Some(serde_json::to_value(ack)?))
            }
            Message::CheckFeatureAccess(query) => {
                let settings = self.store.get().await;
                let access = FeatureAccess {
                    feature: query.feature,
                    tier: settings.tier,
                    has_access: has_access(settings.tier, query.feature),
                };
                Ok(Some(serde_json::to_value(access)?))
            }
        }
    }

    /// The sender's own tab wins; popup requests fall back to the active tab
    async fn tab_info(&self, sender: MessageSender) -> anyhow::Result<TabInfo> {
        if let Some(tab) = sender.tab {
            return Ok(tab);
        }

        self.tabs
            .active_tab()
            .await
            .context("Failed to query active tab")?
            .context("No active tab found")
    }
}

impl Handler for Coordinator {
    fn handle(&self, message: Message, sender: MessageSender) -> LocalBoxFuture<'_, HandlerResult> {
        self.respond(message, sender).boxed_local()
    }
}

#[cfg(target_arch = "wasm32")]
mod service_worker {
    // JavaScript glue only forwards chrome events here

    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::spawn_local;

    use super::{Coordinator, InstallReason};
    use crate::config::ExtensionConfig;
    use crate::protocol::chrome::{from_js, to_js, ChromeTransport};
    use crate::protocol::{MessageSender, Reply, Router};
    use crate::storage::chrome::ChromeArea;
    use crate::storage::{AreaName, SettingsStore};

    thread_local! {
        static COORDINATOR: RefCell<Option<(Rc<Coordinator>, Router)>> = const { RefCell::new(None) };
    }

    /// Called once when the service worker loads
    #[wasm_bindgen]
    pub fn init_background() {
        let config = ExtensionConfig::bundled().unwrap_or_else(|err| {
            log::error!("Invalid bundled config, using defaults: {:#}", err);
            ExtensionConfig::default()
        });

        let store = SettingsStore::new(Rc::new(ChromeArea::new(AreaName::Sync)), config.storage);
        let coordinator = Coordinator::new(store, Rc::new(ChromeTransport));
        let router = coordinator.start();
        COORDINATOR.with(|slot| *slot.borrow_mut() = Some((coordinator, router)));
    }

    #[wasm_bindgen]
    pub fn handle_install(reason: String) {
        let reason = serde_json::from_value(serde_json::Value::String(reason))
            .unwrap_or(InstallReason::Update);
        let Some(coordinator) = COORDINATOR.with(|slot| slot.borrow().as_ref().map(|(c, _)| c.clone()))
        else {
            log::warn!("Install event before init_background");
            return;
        };
        spawn_local(async move { coordinator.on_installed(reason).await });
    }

    /// chrome.runtime.onMessage listener body. Returns true when the reply
    /// will be sent asynchronously so the channel must stay open.
    #[wasm_bindgen]
    pub fn handle_message(message: JsValue, sender: JsValue, send_response: js_sys::Function) -> bool {
        let Some(router) = COORDINATOR.with(|slot| slot.borrow().as_ref().map(|(_, r)| r.clone()))
        else {
            log::warn!("Message received before init_background");
            return false;
        };

        let wire = from_js(&message).unwrap_or(serde_json::Value::Null);
        let sender: MessageSender = from_js(&sender)
            .and_then(|value| serde_json::from_value(value).map_err(Into::into))
            .unwrap_or_default();

        let reply = router.receive(wire, sender);
        let keep_open = reply.keeps_channel_open();
        match reply {
            Reply::Ready(response) => respond(&send_response, &response),
            Reply::Pending(response) => spawn_local(async move {
                let response = response.await;
                respond(&send_response, &response);
            }),
        }
        keep_open
    }

    fn respond(send_response: &js_sys::Function, response: &crate::protocol::Response) {
        let result = serde_json::to_value(response)
            .map_err(anyhow::Error::from)
            .and_then(|value| to_js(&value));
        match result {
            Ok(value) => {
                if let Err(err) = send_response.call1(&JsValue::NULL, &value) {
                    log::warn!("sendResponse failed: {:?}", err);
                }
            }
            Err(err) => log::error!("Failed to encode response: {:#}", err),
        }
    }
}
