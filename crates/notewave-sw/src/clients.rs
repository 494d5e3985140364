//! Open pages under the agent's scope.
//!
//! The agent never holds a handle to a page. It can only broadcast notices
//! to every page under its scope (controlled or not) and take control of
//! them at activation. Pages hear about both through their signal stream.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use url::Url;

use crate::protocol::{AgentNotice, PageSignal};
use crate::scope::Scope;
use crate::{ClientId, GenerationId};

/// One open page.
#[derive(Debug)]
struct Client {
    url: Url,
    controller: Option<GenerationId>,
    signals: mpsc::UnboundedSender<PageSignal>,
}

/// Registry of open pages; the agent-side `clients` capability.
///
/// Clones are cheap and observe the same set of pages.
#[derive(Debug, Clone, Default)]
pub struct Clients {
    clients: Arc<RwLock<HashMap<ClientId, Client>>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a page. `controller` is the generation already in control at
    /// load time, if any; starting controlled does not fire a
    /// controller-change signal. Returns the page id and its signal stream.
    pub async fn connect(
        &self,
        url: Url,
        controller: Option<GenerationId>,
    ) -> (ClientId, mpsc::UnboundedReceiver<PageSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::new();
        debug!(client = %id, url = %url, controlled = controller.is_some(), "Page connected");
        self.clients.write().await.insert(
            id,
            Client {
                url,
                controller,
                signals: tx,
            },
        );
        (id, rx)
    }

    /// Close a page.
    pub async fn disconnect(&self, id: ClientId) {
        if self.clients.write().await.remove(&id).is_some() {
            debug!(client = %id, "Page disconnected");
        }
    }

    /// The generation controlling a page, if any.
    pub async fn controller(&self, id: ClientId) -> Option<GenerationId> {
        self.clients
            .read()
            .await
            .get(&id)
            .and_then(|client| client.controller)
    }

    /// Number of pages controlled by a generation.
    pub async fn controlled_count(&self, generation: GenerationId) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|client| client.controller == Some(generation))
            .count()
    }

    /// Broadcast a notice to every page under scope, controlled or not.
    /// Delivery is fire-and-forget; pages that are gone are skipped.
    pub async fn broadcast(&self, scope: &Scope, notice: AgentNotice) {
        let clients = self.clients.read().await;
        let mut delivered = 0;
        for client in clients.values() {
            if !scope.contains(&client.url) {
                continue;
            }
            if client.signals.send(PageSignal::Notice(notice)).is_ok() {
                delivered += 1;
            }
        }
        trace!(notice = ?notice, delivered, "Notice broadcast");
    }

    /// Make `generation` the controller of every page under scope.
    ///
    /// Only pages whose controller actually changes are signalled, and each
    /// gets exactly one [`PageSignal::ControllerChange`]. Claiming twice for
    /// the same generation is a no-op.
    pub async fn claim(&self, scope: &Scope, generation: GenerationId) {
        let mut clients = self.clients.write().await;
        for (id, client) in clients.iter_mut() {
            if !scope.contains(&client.url) || client.controller == Some(generation) {
                continue;
            }
            client.controller = Some(generation);
            let _ = client.signals.send(PageSignal::ControllerChange);
            debug!(client = %id, generation = %generation, "Controller changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn scope(s: &str) -> Scope {
        Scope::new(url(s)).unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let clients = Clients::new();
        let (id, _rx) = clients
            .connect(url("https://notes.example/app/"), None)
            .await;

        assert_eq!(clients.controller(id).await, None);

        clients.disconnect(id).await;
        assert_eq!(clients.controller(id).await, None);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_uncontrolled_pages_in_scope_only() {
        let clients = Clients::new();
        let app = scope("https://notes.example/app/");

        let (_in_scope, mut in_rx) = clients
            .connect(url("https://notes.example/app/index.html"), None)
            .await;
        let (_outside, mut out_rx) = clients
            .connect(url("https://notes.example/admin/index.html"), None)
            .await;

        clients.broadcast(&app, AgentNotice::Installed).await;

        assert_eq!(
            in_rx.recv().await,
            Some(PageSignal::Notice(AgentNotice::Installed))
        );
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_claim_signals_exactly_once() {
        let clients = Clients::new();
        let app = scope("https://notes.example/app/");
        let generation = GenerationId::new();

        let (id, mut rx) = clients
            .connect(url("https://notes.example/app/index.html"), None)
            .await;

        clients.claim(&app, generation).await;
        clients.claim(&app, generation).await;

        assert_eq!(clients.controller(id).await, Some(generation));
        assert_eq!(rx.recv().await, Some(PageSignal::ControllerChange));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_claim_takes_over_from_older_generation() {
        let clients = Clients::new();
        let app = scope("https://notes.example/app/");
        let old = GenerationId::new();
        let new = GenerationId::new();

        let (id, mut rx) = clients
            .connect(url("https://notes.example/app/index.html"), Some(old))
            .await;
        assert_eq!(clients.controlled_count(old).await, 1);

        clients.claim(&app, new).await;

        assert_eq!(clients.controller(id).await, Some(new));
        assert_eq!(clients.controlled_count(old).await, 0);
        assert_eq!(rx.recv().await, Some(PageSignal::ControllerChange));
    }
}
