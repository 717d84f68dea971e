// Sending side of the protocol
// Every outcome, including transport failure, resolves to a Response

use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::message::{Message, Response};
use super::tabs::TabId;

/// Raw channel to the other contexts. Implementations report unreachable
/// endpoints as errors instead of leaving the call pending.
#[async_trait(?Send)]
pub trait Transport {
    /// Deliver to the background coordinator
    async fn send_message(&self, message: Value) -> anyhow::Result<Value>;

    /// Deliver to the content script of one tab
    async fn send_to_tab(&self, tab: TabId, message: Value) -> anyhow::Result<Value>;

    /// Tabs currently known to the runtime
    async fn peers(&self) -> anyhow::Result<Vec<TabId>>;
}

#[derive(Clone)]
pub struct Messenger {
    transport: Rc<dyn Transport>,
}

impl Messenger {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, message: &Message) -> Response {
        let wire = match message.to_wire() {
            Ok(wire) => wire,
            Err(e) => return Response::failure(format!("Serialization error: {}", e)),
        };
        into_response(self.transport.send_message(wire).await)
    }

    pub async fn send_to_peer(&self, peer: TabId, message: &Message) -> Response {
        let wire = match message.to_wire() {
            Ok(wire) => wire,
            Err(e) => return Response::failure(format!("Serialization error: {}", e)),
        };
        into_response(self.transport.send_to_tab(peer, wire).await)
    }

    /// Send to every peer known right now, concurrently. Individual failures
    /// are recorded per peer; the call itself never fails.
    pub async fn broadcast_to_all_peers(&self, message: &Message) -> BTreeMap<TabId, Response> {
        let peers = match self.transport.peers().await {
            Ok(peers) => peers,
            Err(err) => {
                log::warn!("Failed to enumerate peers: {:#}", err);
                return BTreeMap::new();
            }
        };

        log::debug!("Broadcasting {} to {} peers", message.kind(), peers.len());

        join_all(
            peers
                .into_iter()
                .map(|peer| async move { (peer, self.send_to_peer(peer, message).await) }),
        )
        .await
        .into_iter()
        .collect()
    }

    /// Send to the coordinator and decode the payload
    pub async fn request<T: DeserializeOwned>(&self, message: &Message) -> Response<T> {
        self.send(message).await.decode()
    }
}

fn into_response(result: anyhow::Result<Value>) -> Response {
    match result {
        Ok(raw) => serde_json::from_value(raw)
            .unwrap_or_else(|e| Response::failure(format!("Malformed response: {}", e))),
        Err(err) => {
            log::debug!("Transport error: {:#}", err);
            Response::failure(format!("{:#}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::PageInfo;
    use serde_json::json;
    use std::cell::RefCell;

    /// Transport stub answering from a fixed table of tab replies
    #[derive(Default)]
    struct StubTransport {
        tabs: BTreeMap<TabId, Option<Value>>,
        sent: RefCell<Vec<Value>>,
    }

    #[async_trait(?Send)]
    impl Transport for StubTransport {
        async fn send_message(&self, message: Value) -> anyhow::Result<Value> {
            self.sent.borrow_mut().push(message);
            Ok(json!({ "success": true, "data": { "tier": "pro" } }))
        }

        async fn send_to_tab(&self, tab: TabId, message: Value) -> anyhow::Result<Value> {
            self.sent.borrow_mut().push(message);
            match self.tabs.get(&tab) {
                Some(Some(reply)) => Ok(reply.clone()),
                _ => anyhow::bail!("Could not establish connection. Receiving end does not exist."),
            }
        }

        async fn peers(&self) -> anyhow::Result<Vec<TabId>> {
            Ok(self.tabs.keys().copied().collect())
        }
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure() {
        let mut tabs = BTreeMap::new();
        tabs.insert(1, Some(json!({ "success": true, "data": "one" })));
        tabs.insert(2, None);
        tabs.insert(3, Some(json!({ "success": true, "data": "three" })));
        let messenger = Messenger::new(Rc::new(StubTransport {
            tabs,
            ..Default::default()
        }));

        let replies = messenger
            .broadcast_to_all_peers(&Message::GetTabInfo)
            .await;

        assert_eq!(replies.len(), 3);
        assert_eq!(replies.values().filter(|r| r.success).count(), 2);
        assert!(!replies[&2].success);
        assert!(replies[&2].error.as_deref().unwrap().contains("Receiving end does not exist"));
    }

    #[tokio::test]
    async fn test_send_to_missing_peer_is_a_failed_response() {
        let messenger = Messenger::new(Rc::new(StubTransport::default()));
        let response = messenger.send_to_peer(42, &Message::GetTabInfo).await;
        assert!(!response.success);
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let mut tabs = BTreeMap::new();
        tabs.insert(1, Some(Value::Null));
        let messenger = Messenger::new(Rc::new(StubTransport {
            tabs,
            ..Default::default()
        }));
        let response = messenger.send_to_peer(1, &Message::GetTabInfo).await;
        assert!(response.error.unwrap().starts_with("Malformed response"));
    }

    #[tokio::test]
    async fn test_send_serializes_envelope() {
        let transport = Rc::new(StubTransport::default());
        let messenger = Messenger::new(transport.clone());
        let message = Message::ContentScriptReady(PageInfo {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
        });

        let response = messenger.send(&message).await;
        assert!(response.success);
        assert_eq!(
            transport.sent.borrow()[0],
            json!({
                "type": "CONTENT_SCRIPT_READY",
                "payload": { "url": "https://example.com", "title": "Example" }
            })
        );
    }

    #[tokio::test]
    async fn test_typed_request() {
        #[derive(serde::Deserialize)]
        struct TierOnly {
            tier: crate::settings::Tier,
        }

        let messenger = Messenger::new(Rc::new(StubTransport::default()));
        let response: Response<TierOnly> = messenger.request(&Message::GetSettings).await;
        assert_eq!(response.data.unwrap().tier, crate::settings::Tier::Pro);
    }
}
