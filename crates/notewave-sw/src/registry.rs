//! The agent host: registration, generation slots, and takeover.
//!
//! `SwContainer` is what a site embeds. It owns the cache storage and the
//! page roster, keeps at most one generation per slot (installing, waiting,
//! active), and runs a driver task that seats a waiting generation when a
//! page requests it via `SKIP_WAITING`.

use std::sync::Arc;

use notewave_cache::CacheStorage;
use notewave_common::SiteVersion;
use notewave_net::{FetchRequest, FetchResponse, Network};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::agent::{AgentHandle, CachingAgent, HostRequest};
use crate::clients::Clients;
use crate::protocol::PageSignal;
use crate::scope::Scope;
use crate::{ClientId, GenerationId, SwError};

// ==================== Script ====================

/// What a page registers: the agent script URL plus the site version baked
/// into that script build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentScript {
    pub url: Url,
    pub version: SiteVersion,
}

impl AgentScript {
    pub fn new(url: Url, version: impl Into<SiteVersion>) -> Self {
        Self {
            url,
            version: version.into(),
        }
    }
}

// ==================== Events ====================

/// Host-level happenings, for observers outside the page signal path.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A new version's generation started installing.
    UpdateFound {
        generation: GenerationId,
        version: SiteVersion,
    },

    /// Install failed; the generation was discarded.
    InstallFailed {
        version: SiteVersion,
        error: SwError,
    },

    /// A generation finished activation and now controls the scope.
    GenerationActivated {
        generation: GenerationId,
        version: SiteVersion,
    },
}

// ==================== Registration ====================

/// Generation slots. At most one generation per slot; a generation moves
/// installing -> waiting -> active and never backwards.
#[derive(Default)]
struct Registration {
    installing: Option<AgentHandle>,
    waiting: Option<AgentHandle>,
    active: Option<AgentHandle>,
}

impl Registration {
    /// The most recent generation, newest slot first.
    fn newest(&self) -> Option<&AgentHandle> {
        self.installing
            .as_ref()
            .or(self.waiting.as_ref())
            .or(self.active.as_ref())
    }
}

struct Shared {
    scope: Scope,
    caches: CacheStorage,
    clients: Clients,
    network: Arc<dyn Network>,
    registration: RwLock<Registration>,
    /// Serializes takeovers so two `SKIP_WAITING` bursts cannot interleave.
    activation: Mutex<()>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    host_tx: mpsc::UnboundedSender<HostRequest>,
}

// ==================== Container ====================

/// The per-scope agent host.
#[derive(Clone)]
pub struct SwContainer {
    shared: Arc<Shared>,
}

impl SwContainer {
    /// Create a container for a scope and return it with its event stream.
    pub fn new(
        scope: Scope,
        network: Arc<dyn Network>,
    ) -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            scope,
            caches: CacheStorage::new(),
            clients: Clients::new(),
            network,
            registration: RwLock::new(Registration::default()),
            activation: Mutex::new(()),
            events: events_tx,
            host_tx,
        });
        tokio::spawn(Self::drive(Arc::clone(&shared), host_rx));
        (Self { shared }, events_rx)
    }

    pub fn scope(&self) -> &Scope {
        &self.shared.scope
    }

    /// The container's cache storage. Clones share the same caches.
    pub fn caches(&self) -> CacheStorage {
        self.shared.caches.clone()
    }

    /// The page roster. Clones share the same roster.
    pub fn clients(&self) -> Clients {
        self.shared.clients.clone()
    }

    pub async fn installing(&self) -> Option<AgentHandle> {
        self.shared.registration.read().await.installing.clone()
    }

    pub async fn waiting(&self) -> Option<AgentHandle> {
        self.shared.registration.read().await.waiting.clone()
    }

    pub async fn active(&self) -> Option<AgentHandle> {
        self.shared.registration.read().await.active.clone()
    }

    // ==================== Registration ====================

    /// Register the agent script for this scope.
    ///
    /// Re-registering the version already held is a no-op, the same way a
    /// byte-identical script is. A new version starts installing right away;
    /// this settles when the install phase has finished. The first-ever
    /// generation activates immediately, later ones park in waiting.
    pub async fn register(&self, script: &AgentScript) -> Result<GenerationId, SwError> {
        let shared = &self.shared;

        let script_scope = Scope::from_script_url(&script.url)?;
        if script_scope != shared.scope {
            return Err(SwError::RegistrationFailed(format!(
                "script {} resolves scope {}, container scope is {}",
                script.url,
                script_scope.base(),
                shared.scope.base()
            )));
        }

        {
            let registration = shared.registration.read().await;
            if let Some(current) = registration.newest() {
                if current.version() == &script.version {
                    debug!(version = %script.version, "Script unchanged; registration is a no-op");
                    return Ok(current.id());
                }
            }
        }

        let handle = CachingAgent::spawn(
            script.version.clone(),
            shared.scope.clone(),
            shared.caches.clone(),
            shared.clients.clone(),
            Arc::clone(&shared.network),
            shared.host_tx.clone(),
        )?;
        {
            let mut registration = shared.registration.write().await;
            if let Some(superseded) = registration.installing.take() {
                superseded.retire();
            }
            registration.installing = Some(handle.clone());
        }
        info!(
            generation = %handle.id(),
            version = %script.version,
            scope = %shared.scope.base(),
            "Installing new generation"
        );
        let _ = shared.events.send(RegistryEvent::UpdateFound {
            generation: handle.id(),
            version: script.version.clone(),
        });

        if let Err(error) = handle.install().await {
            let mut registration = shared.registration.write().await;
            if registration.installing.as_ref().map(AgentHandle::id) == Some(handle.id()) {
                registration.installing = None;
            }
            let _ = shared.events.send(RegistryEvent::InstallFailed {
                version: script.version.clone(),
                error: error.clone(),
            });
            return Err(error);
        }

        let first = {
            let mut registration = shared.registration.write().await;
            if registration.installing.as_ref().map(AgentHandle::id) != Some(handle.id()) {
                // A newer register superseded us mid-install.
                debug!(generation = %handle.id(), "Generation superseded while installing");
                return Ok(handle.id());
            }
            registration.installing = None;
            if registration.active.is_none() && registration.waiting.is_none() {
                registration.active = Some(handle.clone());
                true
            } else {
                if let Some(stale) = registration.waiting.take() {
                    stale.retire();
                }
                registration.waiting = Some(handle.clone());
                false
            }
        };

        if first {
            handle.activate().await?;
            let _ = shared.events.send(RegistryEvent::GenerationActivated {
                generation: handle.id(),
                version: script.version.clone(),
            });
        } else {
            info!(generation = %handle.id(), version = %script.version, "Generation waiting");
        }
        Ok(handle.id())
    }

    // ==================== Pages ====================

    /// Open a page under this scope. Pages opened while a generation is
    /// active come up already controlled by it.
    pub async fn connect_page(
        &self,
        url: Url,
    ) -> Result<(ClientId, mpsc::UnboundedReceiver<PageSignal>), SwError> {
        if !self.shared.scope.contains(&url) {
            return Err(SwError::InvalidUrl(format!(
                "page {url} is outside scope {}",
                self.shared.scope.base()
            )));
        }
        let controller = {
            let registration = self.shared.registration.read().await;
            registration.active.as_ref().map(AgentHandle::id)
        };
        Ok(self.shared.clients.connect(url, controller).await)
    }

    /// Close a page.
    pub async fn disconnect_page(&self, client: ClientId) {
        self.shared.clients.disconnect(client).await;
    }

    /// Route a page's request: through the active generation when the page
    /// is controlled, straight to the network otherwise.
    pub async fn fetch(
        &self,
        client: ClientId,
        request: FetchRequest,
    ) -> Result<FetchResponse, SwError> {
        let shared = &self.shared;
        let controlled = shared.clients.controller(client).await.is_some();
        let active = shared.registration.read().await.active.clone();

        match (controlled, active) {
            (true, Some(agent)) => agent.dispatch_fetch(request).await,
            _ => {
                debug!(url = %request.url, "Uncontrolled fetch going direct to network");
                shared
                    .network
                    .fetch(&request)
                    .await
                    .map_err(|e| SwError::NetworkError(e.to_string()))
            }
        }
    }

    // ==================== Takeover ====================

    async fn drive(shared: Arc<Shared>, mut host_rx: mpsc::UnboundedReceiver<HostRequest>) {
        while let Some(request) = host_rx.recv().await {
            match request {
                HostRequest::TakeoverRequested(id) => {
                    if let Err(error) = Self::promote(&shared, id).await {
                        warn!(generation = %id, error = %error, "Takeover failed");
                    }
                }
            }
        }
    }

    /// Seat the waiting generation as active, retiring the previous one,
    /// then run its activate phase.
    async fn promote(shared: &Shared, id: GenerationId) -> Result<(), SwError> {
        let _takeover = shared.activation.lock().await;

        let handle = {
            let mut registration = shared.registration.write().await;
            match registration.waiting.take() {
                Some(waiting) if waiting.id() == id => {
                    if let Some(previous) = registration.active.take() {
                        previous.retire();
                    }
                    registration.active = Some(waiting.clone());
                    waiting
                }
                other => {
                    // Stale request: the generation already moved on.
                    registration.waiting = other;
                    debug!(generation = %id, "No matching waiting generation; takeover ignored");
                    return Ok(());
                }
            }
        };

        info!(
            generation = %handle.id(),
            version = %handle.version(),
            "Waiting generation taking over"
        );
        handle.activate().await?;
        let _ = shared.events.send(RegistryEvent::GenerationActivated {
            generation: handle.id(),
            version: handle.version().clone(),
        });
        Ok(())
    }
}
