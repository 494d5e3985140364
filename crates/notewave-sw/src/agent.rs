//! One caching agent generation: a lifecycle state machine over a typed
//! inbox.
//!
//! A generation is spawned in `Installing`, told to install (populate the
//! precache), parked in `Waiting` until the host chooses it, told to
//! activate (reclaim stale caches, claim pages), and finally routes fetches
//! until a newer generation retires it. Install and activate acks settle
//! only when the whole phase has finished, so the host can gate lifecycle
//! transitions on them.

use std::sync::Arc;

use notewave_cache::CacheStorage;
use notewave_common::SiteVersion;
use notewave_net::{FetchRequest, FetchResponse, Network};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::Clients;
use crate::fetch::FetchRouter;
use crate::protocol::{AgentNotice, PageMessage};
use crate::scope::Scope;
use crate::{precache_name, runtime_name, GenerationId, SwError, PRECACHE_MANIFEST};

// ==================== Lifecycle ====================

/// Lifecycle of one agent generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Precache population in progress.
    #[default]
    Installing,
    /// Installed; holding until the host chooses this generation.
    Waiting,
    /// Reclaiming stale caches and claiming scoped pages.
    Activating,
    /// Controlling fetches under the scope.
    Activated,
    /// Discarded: install failed or a newer generation took over.
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        }
    }
}

// ==================== Events ====================

/// Events delivered to a generation's inbox.
pub(crate) enum AgentEvent {
    /// Populate the precache. The ack settles when the whole phase is done.
    Install {
        done: oneshot::Sender<Result<(), SwError>>,
    },

    /// Reclaim stale caches, claim scoped pages, announce the takeover.
    Activate {
        done: oneshot::Sender<Result<(), SwError>>,
    },

    /// An intercepted request to route.
    Fetch {
        request: FetchRequest,
        respond: oneshot::Sender<Result<FetchResponse, SwError>>,
    },

    /// A message posted by a page.
    Message(PageMessage),

    /// The host discarded this generation.
    Retire,
}

/// Requests a generation raises back to its host.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HostRequest {
    /// A page asked this generation to take over immediately.
    TakeoverRequested(GenerationId),
}

// ==================== Handle ====================

/// Host-side handle to one generation.
///
/// Cloneable; the generation itself is only reachable through the inbox
/// behind this handle.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: GenerationId,
    version: SiteVersion,
    inbox: mpsc::UnboundedSender<AgentEvent>,
    state: Arc<RwLock<LifecycleState>>,
}

impl AgentHandle {
    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn version(&self) -> &SiteVersion {
        &self.version
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Post a page message into the generation's inbox, fire-and-forget.
    pub fn post_message(&self, message: PageMessage) {
        let _ = self.inbox.send(AgentEvent::Message(message));
    }

    /// Run the install phase to completion.
    pub(crate) async fn install(&self) -> Result<(), SwError> {
        let (done, ack) = oneshot::channel();
        self.inbox
            .send(AgentEvent::Install { done })
            .map_err(|_| SwError::AgentGone)?;
        ack.await.map_err(|_| SwError::AgentGone)?
    }

    /// Run the activate phase to completion.
    pub(crate) async fn activate(&self) -> Result<(), SwError> {
        let (done, ack) = oneshot::channel();
        self.inbox
            .send(AgentEvent::Activate { done })
            .map_err(|_| SwError::AgentGone)?;
        ack.await.map_err(|_| SwError::AgentGone)?
    }

    /// Route an intercepted request through this generation.
    pub(crate) async fn dispatch_fetch(
        &self,
        request: FetchRequest,
    ) -> Result<FetchResponse, SwError> {
        let (respond, response) = oneshot::channel();
        self.inbox
            .send(AgentEvent::Fetch { request, respond })
            .map_err(|_| SwError::AgentGone)?;
        response.await.map_err(|_| SwError::AgentGone)?
    }

    /// Discard this generation, fire-and-forget.
    pub(crate) fn retire(&self) {
        let _ = self.inbox.send(AgentEvent::Retire);
    }
}

// ==================== Agent ====================

/// One generation's background task.
pub(crate) struct CachingAgent {
    id: GenerationId,
    version: SiteVersion,
    scope: Scope,
    caches: CacheStorage,
    clients: Clients,
    network: Arc<dyn Network>,
    router: FetchRouter,
    state: Arc<RwLock<LifecycleState>>,
    host: mpsc::UnboundedSender<HostRequest>,
}

impl CachingAgent {
    /// Spawn a generation in `Installing` and return its handle.
    pub(crate) fn spawn(
        version: SiteVersion,
        scope: Scope,
        caches: CacheStorage,
        clients: Clients,
        network: Arc<dyn Network>,
        host: mpsc::UnboundedSender<HostRequest>,
    ) -> Result<AgentHandle, SwError> {
        let id = GenerationId::new();
        let state = Arc::new(RwLock::new(LifecycleState::Installing));
        let router = FetchRouter::new(&scope, caches.clone(), Arc::clone(&network), &version)?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let agent = Self {
            id,
            version: version.clone(),
            scope,
            caches,
            clients,
            network,
            router,
            state: Arc::clone(&state),
            host,
        };
        tokio::spawn(agent.run(inbox_rx));

        Ok(AgentHandle {
            id,
            version,
            inbox: inbox_tx,
            state,
        })
    }

    async fn run(self, mut inbox: mpsc::UnboundedReceiver<AgentEvent>) {
        while let Some(event) = inbox.recv().await {
            match event {
                AgentEvent::Install { done } => {
                    let result = self.on_install().await;
                    let failed = result.is_err();
                    let _ = done.send(result);
                    if failed {
                        break;
                    }
                }
                AgentEvent::Activate { done } => {
                    let _ = done.send(self.on_activate().await);
                }
                AgentEvent::Fetch { request, respond } => self.on_fetch(request, respond).await,
                AgentEvent::Message(message) => self.on_message(message),
                AgentEvent::Retire => {
                    self.set_state(LifecycleState::Redundant).await;
                    break;
                }
            }
        }
        debug!(generation = %self.id, "Generation task ended");
    }

    /// Install: fetch the whole app-shell manifest, then swap it into the
    /// version's precache in one step. Any asset failure fails the phase and
    /// discards the generation.
    async fn on_install(&self) -> Result<(), SwError> {
        info!(generation = %self.id, version = %self.version, "Install started");
        let cache_name = precache_name(&self.version);

        match self.populate_precache().await {
            Ok(entries) => {
                let assets = entries.len();
                self.caches.replace(&cache_name, entries).await;
                info!(cache = %cache_name, assets, "Precache populated");
                self.clients
                    .broadcast(&self.scope, AgentNotice::Installed)
                    .await;
                self.set_state(LifecycleState::Waiting).await;
                Ok(())
            }
            Err(error) => {
                warn!(
                    generation = %self.id,
                    error = %error,
                    "Install failed; discarding generation"
                );
                self.caches.delete(&cache_name).await;
                self.set_state(LifecycleState::Redundant).await;
                Err(error)
            }
        }
    }

    async fn populate_precache(&self) -> Result<Vec<(Url, FetchResponse)>, SwError> {
        let mut entries = Vec::with_capacity(PRECACHE_MANIFEST.len());
        for path in PRECACHE_MANIFEST {
            let asset = self.scope.resolve(path)?;
            let response = self
                .network
                .fetch(&FetchRequest::get(asset.clone()))
                .await
                .map_err(|e| SwError::PrecacheFailed {
                    url: asset.to_string(),
                    reason: e.to_string(),
                })?;
            if response.is_opaque() {
                return Err(SwError::PrecacheFailed {
                    url: asset.to_string(),
                    reason: "opaque response".to_string(),
                });
            }
            if !response.ok() {
                return Err(SwError::PrecacheFailed {
                    url: asset.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            entries.push((asset, response));
        }
        Ok(entries)
    }

    /// Activate: delete every cache generation other than this version's
    /// two, take control of scoped pages, then announce the takeover.
    async fn on_activate(&self) -> Result<(), SwError> {
        self.set_state(LifecycleState::Activating).await;
        info!(generation = %self.id, version = %self.version, "Activation started");

        let precache = precache_name(&self.version);
        let runtime = runtime_name(&self.version);
        for name in self.caches.names().await {
            if name != precache && name != runtime {
                self.caches.delete(&name).await;
                info!(cache = %name, "Stale cache generation reclaimed");
            }
        }
        self.caches.open(&runtime).await;

        self.clients.claim(&self.scope, self.id).await;
        self.set_state(LifecycleState::Activated).await;
        self.clients
            .broadcast(&self.scope, AgentNotice::Activated)
            .await;

        info!(generation = %self.id, version = %self.version, "Activated");
        Ok(())
    }

    /// Route a fetch on its own task so slow requests never block the inbox.
    async fn on_fetch(
        &self,
        request: FetchRequest,
        respond: oneshot::Sender<Result<FetchResponse, SwError>>,
    ) {
        let state = *self.state.read().await;
        if !matches!(
            state,
            LifecycleState::Activating | LifecycleState::Activated
        ) {
            let _ = respond.send(Err(SwError::StateError(format!(
                "fetch dispatched to {} generation",
                state.as_str()
            ))));
            return;
        }

        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = respond.send(router.handle(request).await);
        });
    }

    fn on_message(&self, message: PageMessage) {
        match message {
            PageMessage::SkipWaiting => {
                debug!(generation = %self.id, "Skip-waiting requested");
                let _ = self.host.send(HostRequest::TakeoverRequested(self.id));
            }
        }
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.write().await = state;
        debug!(generation = %self.id, state = state.as_str(), "State changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use notewave_net::{SimNetwork, SimResource};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn app_scope() -> Scope {
        Scope::new(url("https://notes.example/app/")).unwrap()
    }

    async fn serve_site(net: &SimNetwork, scope: &Scope) {
        for path in PRECACHE_MANIFEST {
            let asset = scope.resolve(path).unwrap();
            let resource = if path.ends_with(".png") {
                SimResource::ok("image/png", "png-bytes")
            } else if path.ends_with(".js") {
                SimResource::ok("text/javascript", "// js")
            } else if path.ends_with(".json") {
                SimResource::ok("application/manifest+json", "{}")
            } else {
                SimResource::html(format!("<h1>{path}</h1>"))
            };
            net.serve(asset, resource).await;
        }
    }

    struct Harness {
        net: Arc<SimNetwork>,
        caches: CacheStorage,
        clients: Clients,
        host_rx: UnboundedReceiver<HostRequest>,
        handle: AgentHandle,
    }

    async fn spawn_agent(version: &str) -> Harness {
        let net = Arc::new(SimNetwork::new());
        serve_site(&net, &app_scope()).await;
        let caches = CacheStorage::new();
        let clients = Clients::new();
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let handle = CachingAgent::spawn(
            SiteVersion::new(version),
            app_scope(),
            caches.clone(),
            clients.clone(),
            net.clone(),
            host_tx,
        )
        .unwrap();
        Harness {
            net,
            caches,
            clients,
            host_rx,
            handle,
        }
    }

    #[tokio::test]
    async fn test_install_populates_precache_and_broadcasts() {
        let harness = spawn_agent("1.1.7").await;
        let (_page, mut signals) = harness
            .clients
            .connect(url("https://notes.example/app/index.html"), None)
            .await;

        harness.handle.install().await.unwrap();

        assert_eq!(harness.handle.state().await, LifecycleState::Waiting);
        assert_eq!(
            harness.caches.entry_count("my-pwa-notes-cache-1.1.7").await,
            PRECACHE_MANIFEST.len()
        );
        assert_eq!(
            signals.recv().await,
            Some(crate::PageSignal::Notice(AgentNotice::Installed))
        );

        // Scope root and index.html are distinct precache keys.
        let urls = harness.caches.urls("my-pwa-notes-cache-1.1.7").await;
        assert!(urls.contains(&"https://notes.example/app/".to_string()));
        assert!(urls.contains(&"https://notes.example/app/index.html".to_string()));
    }

    #[tokio::test]
    async fn test_install_failure_discards_generation() {
        let harness = spawn_agent("1.1.7").await;
        harness
            .net
            .serve(
                url("https://notes.example/app/paths.js"),
                SimResource::ok("text/javascript", "nope")
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR),
            )
            .await;

        let result = harness.handle.install().await;

        assert!(matches!(result, Err(SwError::PrecacheFailed { .. })));
        assert_eq!(harness.handle.state().await, LifecycleState::Redundant);
        assert!(!harness.caches.has("my-pwa-notes-cache-1.1.7").await);

        // The task is gone; later phases cannot be driven.
        assert!(matches!(
            harness.handle.install().await,
            Err(SwError::AgentGone)
        ));
    }

    #[tokio::test]
    async fn test_reinstall_same_version_overwrites_not_merges() {
        let first = spawn_agent("1.1.7").await;
        first.handle.install().await.unwrap();

        // Leave a stray entry behind to prove replace drops it.
        let stray = url("https://notes.example/app/stray.css");
        first
            .caches
            .put(
                "my-pwa-notes-cache-1.1.7",
                &stray,
                notewave_net::FetchResponse::new(
                    stray.clone(),
                    StatusCode::OK,
                    bytes::Bytes::from_static(b"stray"),
                ),
            )
            .await;

        let (host_tx, _host_rx) = mpsc::unbounded_channel();
        let again = CachingAgent::spawn(
            SiteVersion::new("1.1.7"),
            app_scope(),
            first.caches.clone(),
            first.clients.clone(),
            first.net.clone(),
            host_tx,
        )
        .unwrap();
        again.install().await.unwrap();

        assert_eq!(
            first.caches.entry_count("my-pwa-notes-cache-1.1.7").await,
            PRECACHE_MANIFEST.len()
        );
        assert!(first
            .caches
            .match_in("my-pwa-notes-cache-1.1.7", &stray)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_activate_reclaims_stale_generations() {
        let harness = spawn_agent("1.1.7").await;
        harness.caches.open("my-pwa-notes-cache-1.1.6").await;
        harness.caches.open("runtime-cache-1.1.6").await;
        harness.caches.open("some-other-cache").await;

        harness.handle.install().await.unwrap();
        harness.handle.activate().await.unwrap();

        assert_eq!(harness.handle.state().await, LifecycleState::Activated);
        assert_eq!(
            harness.caches.names().await,
            vec!["my-pwa-notes-cache-1.1.7", "runtime-cache-1.1.7"]
        );
    }

    #[tokio::test]
    async fn test_activate_claims_and_announces() {
        let harness = spawn_agent("1.1.7").await;
        let (page, mut signals) = harness
            .clients
            .connect(url("https://notes.example/app/index.html"), None)
            .await;

        harness.handle.install().await.unwrap();
        assert_eq!(
            signals.recv().await,
            Some(crate::PageSignal::Notice(AgentNotice::Installed))
        );

        harness.handle.activate().await.unwrap();

        assert_eq!(
            harness.clients.controller(page).await,
            Some(harness.handle.id())
        );
        assert_eq!(signals.recv().await, Some(crate::PageSignal::ControllerChange));
        assert_eq!(
            signals.recv().await,
            Some(crate::PageSignal::Notice(AgentNotice::Activated))
        );
    }

    #[tokio::test]
    async fn test_skip_waiting_message_raises_host_request() {
        let mut harness = spawn_agent("1.1.7").await;
        harness.handle.install().await.unwrap();

        harness.handle.post_message(PageMessage::SkipWaiting);

        match harness.host_rx.recv().await {
            Some(HostRequest::TakeoverRequested(id)) => assert_eq!(id, harness.handle.id()),
            other => panic!("expected takeover request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_waiting_generation_never_routes_fetches() {
        let harness = spawn_agent("1.1.7").await;
        harness.handle.install().await.unwrap();

        let result = harness
            .handle
            .dispatch_fetch(FetchRequest::get(url(
                "https://notes.example/app/script.js",
            )))
            .await;

        assert!(matches!(result, Err(SwError::StateError(_))));
    }
}
