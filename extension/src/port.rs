// Long-lived named duplex channels between contexts
// Independent of the request/response protocol; carries raw JSON values

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// One end of a named channel. Dropping it disconnects the other end.
pub struct Port {
    name: String,
    tx: UnboundedSender<Value>,
    rx: UnboundedReceiver<Value>,
}

impl Port {
    fn pair(name: &str) -> (Port, Port) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (
            Port {
                name: name.to_string(),
                tx: a_tx,
                rx: b_rx,
            },
            Port {
                name: name.to_string(),
                tx: b_tx,
                rx: a_rx,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns false once the other end is gone
    pub fn post_message(&self, message: Value) -> bool {
        self.tx.unbounded_send(message).is_ok()
    }

    /// Next message, or `None` after the other end disconnected
    pub async fn next_message(&mut self) -> Option<Value> {
        self.rx.next().await
    }

    pub fn disconnect(self) {
        log::debug!("Port '{}' disconnected", self.name);
    }
}

/// Rendezvous point for `connect` and `on_connect`
#[derive(Clone, Default)]
pub struct PortHub {
    listeners: Rc<RefCell<Vec<UnboundedSender<Port>>>>,
}

impl PortHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for ports opened by other contexts
    pub fn on_connect(&self) -> UnboundedReceiver<Port> {
        let (tx, rx) = unbounded();
        self.listeners.borrow_mut().push(tx);
        rx
    }

    /// Open a port. With no listener the returned port is already
    /// disconnected, matching the browser's behaviour.
    pub fn connect(&self, name: &str) -> Port {
        let (local, mut remote) = Port::pair(name);
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|listener| !listener.is_closed());

        for listener in listeners.iter() {
            match listener.unbounded_send(remote) {
                Ok(()) => {
                    log::debug!("Port '{}' connected", name);
                    return local;
                }
                Err(err) => remote = err.into_inner(),
            }
        }

        log::debug!("Port '{}' has no listener", name);
        local
    }
}
