// Dispatch table mapping message tags to handlers
// Each context registers one Router with its runtime's message listener

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use super::message::{Message, MessageType, Response};
use super::tabs::MessageSender;

/// `Ok(None)` means success without a payload
pub type HandlerResult = anyhow::Result<Option<Value>>;

/// Every handler is asynchronous, even trivially synchronous ones
pub trait Handler {
    fn handle(&self, message: Message, sender: MessageSender) -> LocalBoxFuture<'_, HandlerResult>;
}

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Message, MessageSender) -> Fut,
    Fut: Future<Output = HandlerResult> + 'static,
{
    fn handle(&self, message: Message, sender: MessageSender) -> LocalBoxFuture<'_, HandlerResult> {
        (self.0)(message, sender).boxed_local()
    }
}

/// Outcome of handing one incoming message to the router.
///
/// `Ready` replies go out immediately and the channel can close. `Pending`
/// replies need the channel kept open until the future settles.
pub enum Reply {
    Ready(Response),
    Pending(LocalBoxFuture<'static, Response>),
}

impl Reply {
    pub fn keeps_channel_open(&self) -> bool {
        matches!(self, Reply::Pending(_))
    }

    pub async fn into_response(self) -> Response {
        match self {
            Reply::Ready(response) => response,
            Reply::Pending(response) => response.await,
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ready(response) => f.debug_tuple("Ready").field(response).finish(),
            Reply::Pending(_) => f.write_str("Pending"),
        }
    }
}

#[derive(Clone, Default)]
pub struct Router {
    handlers: HashMap<MessageType, Rc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared handler. A later registration for the same tag
    /// replaces the earlier one.
    pub fn route(mut self, kind: MessageType, handler: Rc<dyn Handler>) -> Self {
        if self.handlers.insert(kind, handler).is_some() {
            log::debug!("Handler for {} replaced", kind);
        }
        self
    }

    pub fn route_fn<F, Fut>(self, kind: MessageType, handler: F) -> Self
    where
        F: Fn(Message, MessageSender) -> Fut + 'static,
        Fut: Future<Output = HandlerResult> + 'static,
    {
        self.route(kind, Rc::new(FnHandler(handler)))
    }

    pub fn handles(&self, kind: MessageType) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Entry point for the runtime listener. Never panics on bad input:
    /// decode failures and missing handlers become failed responses.
    pub fn receive(&self, wire: Value, sender: MessageSender) -> Reply {
        let message = match Message::from_wire(wire) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("Rejected message: {}", err);
                return Reply::Ready(Response::failure(err.to_string()));
            }
        };

        let kind = message.kind();
        let Some(handler) = self.handlers.get(&kind).cloned() else {
            log::warn!("No handler registered for {}", kind);
            return Reply::Ready(Response::failure(format!("Unknown message type: {}", kind)));
        };

        let mut response = async move {
            let result = handler.handle(message, sender).await;
            settle(kind, result)
        }
        .boxed_local();

        match response.as_mut().now_or_never() {
            Some(response) => Reply::Ready(response),
            None => Reply::Pending(response),
        }
    }

    /// Receive and wait for the reply
    pub async fn dispatch(&self, wire: Value, sender: MessageSender) -> Response {
        self.receive(wire, sender).into_response().await
    }
}

fn settle(kind: MessageType, result: HandlerResult) -> Response {
    match result {
        Ok(Some(data)) => Response::ok(data),
        Ok(None) => Response::empty(),
        Err(err) => {
            log::warn!("{} handler failed: {:#}", kind, err);
            Response::failure(format!("{:#}", err))
        }
    }
}
