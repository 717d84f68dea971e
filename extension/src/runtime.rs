// In-process extension runtime
// Hosts the background router and per-tab content-script routers in one
// process. Messages still travel as JSON, so every context sees exactly what
// it would see across the real browser boundary.

use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::port::PortHub;
use crate::protocol::{MessageSender, Router, TabId, TabInfo, TabQuery, Transport};

const NO_RECEIVER: &str = "Could not establish connection. Receiving end does not exist.";

struct TabSlot {
    info: TabInfo,
    router: Option<Router>,
}

#[derive(Default)]
struct RuntimeInner {
    extension_id: String,
    background: RefCell<Option<Router>>,
    tabs: RefCell<BTreeMap<TabId, TabSlot>>,
    active: Cell<Option<TabId>>,
    next_tab: Cell<TabId>,
    ports: PortHub,
}

#[derive(Clone, Default)]
pub struct InProcessRuntime {
    inner: Rc<RuntimeInner>,
}

impl InProcessRuntime {
    pub fn new(extension_id: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                extension_id: extension_id.into(),
                next_tab: Cell::new(1),
                ..Default::default()
            }),
        }
    }

    /// Register the background listener. Replaces any previous one, which is
    /// how a restarted coordinator re-attaches.
    pub fn serve_background(&self, router: Router) {
        *self.inner.background.borrow_mut() = Some(router);
    }

    /// Simulate the runtime terminating the background context
    pub fn stop_background(&self) {
        self.inner.background.borrow_mut().take();
    }

    pub fn open_tab(&self, url: &str, title: &str) -> TabInfo {
        let id = self.inner.next_tab.get().max(1);
        self.inner.next_tab.set(id + 1);

        let info = TabInfo {
            id,
            url: Some(url.to_string()),
            title: Some(title.to_string()),
            active: false,
            window_id: Some(1),
        };
        self.inner.tabs.borrow_mut().insert(
            id,
            TabSlot {
                info: info.clone(),
                router: None,
            },
        );
        log::debug!("Opened tab {}: {}", id, url);
        info
    }

    pub fn close_tab(&self, tab: TabId) {
        self.inner.tabs.borrow_mut().remove(&tab);
        if self.inner.active.get() == Some(tab) {
            self.inner.active.set(None);
        }
    }

    /// Make a tab the active tab of the focused window
    pub fn activate(&self, tab: TabId) {
        if self.inner.tabs.borrow().contains_key(&tab) {
            self.inner.active.set(Some(tab));
        }
    }

    /// Inject a content script into a tab by registering its listener
    pub fn attach_content_script(&self, tab: TabId, router: Router) -> bool {
        match self.inner.tabs.borrow_mut().get_mut(&tab) {
            Some(slot) => {
                slot.router = Some(router);
                true
            }
            None => false,
        }
    }

    pub fn tab(&self, tab: TabId) -> Option<TabInfo> {
        let tabs = self.inner.tabs.borrow();
        tabs.get(&tab).map(|slot| self.describe(&slot.info))
    }

    pub fn ports(&self) -> &PortHub {
        &self.inner.ports
    }

    /// Endpoint for extension pages (popup, options): no sender tab
    pub fn extension_page(&self, page: &str) -> RuntimeEndpoint {
        RuntimeEndpoint {
            runtime: self.clone(),
            sender: MessageSender {
                id: Some(self.inner.extension_id.clone()),
                url: Some(format!("chrome-extension://{}/{}", self.inner.extension_id, page)),
                tab: None,
            },
        }
    }

    /// Endpoint for the content script running in `tab`
    pub fn content_script(&self, tab: TabId) -> Option<RuntimeEndpoint> {
        let info = self.tab(tab)?;
        let mut sender = MessageSender::from_tab(info);
        sender.id = Some(self.inner.extension_id.clone());
        Some(RuntimeEndpoint {
            runtime: self.clone(),
            sender,
        })
    }

    fn describe(&self, info: &TabInfo) -> TabInfo {
        TabInfo {
            active: self.inner.active.get() == Some(info.id),
            ..info.clone()
        }
    }

    async fn deliver(router: Router, message: Value, sender: MessageSender) -> anyhow::Result<Value> {
        let response = router.receive(message, sender).into_response().await;
        Ok(serde_json::to_value(response)?)
    }
}

#[async_trait(?Send)]
impl TabQuery for InProcessRuntime {
    async fn active_tab(&self) -> anyhow::Result<Option<TabInfo>> {
        Ok(self.inner.active.get().and_then(|id| self.tab(id)))
    }
}

/// One context's view of the runtime; stamps its own sender metadata
#[derive(Clone)]
pub struct RuntimeEndpoint {
    runtime: InProcessRuntime,
    sender: MessageSender,
}

impl RuntimeEndpoint {
    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }
}

#[async_trait(?Send)]
impl Transport for RuntimeEndpoint {
    async fn send_message(&self, message: Value) -> anyhow::Result<Value> {
        // Clone out of the cell so the background may be replaced mid-call
        let router = self.runtime.inner.background.borrow().clone();
        let Some(router) = router else {
            anyhow::bail!(NO_RECEIVER);
        };
        InProcessRuntime::deliver(router, message, self.sender.clone()).await
    }

    async fn send_to_tab(&self, tab: TabId, message: Value) -> anyhow::Result<Value> {
        let router = {
            let tabs = self.runtime.inner.tabs.borrow();
            let Some(slot) = tabs.get(&tab) else {
                anyhow::bail!("No tab with id: {}", tab);
            };
            slot.router.clone()
        };
        let Some(router) = router else {
            anyhow::bail!(NO_RECEIVER);
        };
        InProcessRuntime::deliver(router, message, self.sender.clone()).await
    }

    async fn peers(&self) -> anyhow::Result<Vec<TabId>> {
        Ok(self.runtime.inner.tabs.borrow().keys().copied().collect())
    }
}
