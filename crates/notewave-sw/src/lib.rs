//! # NoteWave SW
//!
//! The offline caching agent for the NoteWave notes app.
//!
//! ## Features
//!
//! - **Registration**: one agent generation per deployed site version
//! - **Lifecycle**: install (precache), waiting, activate (reclaim + claim)
//! - **Fetch routing**: network-first navigations, cache-first sub-resources
//! - **Update handshake**: `SW_INSTALLED` / `SW_ACTIVATED` / `SKIP_WAITING`
//! - **Clients**: scoped pages, broadcast, controller takeover
//!
//! ## Architecture
//!
//! ```text
//! SwContainer
//!     │
//!     ├── Registration
//!     │       ├── installing (AgentHandle)
//!     │       ├── waiting (AgentHandle)
//!     │       └── active (AgentHandle) ── inbox ──> CachingAgent task
//!     │                                                 └── FetchRouter
//!     ├── CacheStorage
//!     │       ├── my-pwa-notes-cache-<version>
//!     │       └── runtime-cache-<version>
//!     └── Clients ── PageSignal ──> open pages
//! ```
//!
//! Each generation runs as a detached single-threaded task owning nothing a
//! page can touch directly; pages talk to it only through its inbox and hear
//! back only through broadcast signals.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use notewave_common::SiteVersion;
use thiserror::Error;

pub mod agent;
pub mod clients;
pub mod fetch;
pub mod protocol;
pub mod registry;
pub mod scope;

pub use agent::{AgentHandle, LifecycleState};
pub use clients::Clients;
pub use fetch::FetchRouter;
pub use protocol::{AgentNotice, PageMessage, PageSignal};
pub use registry::{AgentScript, RegistryEvent, SwContainer};
pub use scope::Scope;

// ==================== Errors ====================

/// Errors that can occur in caching agent operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Precache failed for {url}: {reason}")]
    PrecacheFailed { url: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Agent generation is gone")]
    AgentGone,
}

// ==================== Types ====================

/// Unique identifier for one agent generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationId(u64);

impl GenerationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation-{}", self.0)
    }
}

/// Unique identifier for an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ==================== Site Contract ====================

/// Version literal shipped with the current site build. Bumping it is the
/// sole trigger for a new install cycle.
pub const SITE_VERSION: &str = "1.1.7";

/// Precache generation name prefix.
pub const PRECACHE_PREFIX: &str = "my-pwa-notes-cache-";

/// Runtime generation name prefix.
pub const RUNTIME_PREFIX: &str = "runtime-cache-";

/// App-shell assets precached at install, resolved against the agent's own
/// scope so the same list works at a domain root or nested sub-path. The
/// empty entry is the scope root itself.
pub const PRECACHE_MANIFEST: [&str; 8] = [
    "",
    "index.html",
    "manifest.json",
    "images/icon-192x192.png",
    "images/icon-512x512.png",
    "script.js",
    "paths.js",
    "offline.html",
];

/// Offline fallback document, relative to scope.
pub const OFFLINE_DOC: &str = "offline.html";

/// Precache generation name for a version.
pub fn precache_name(version: &SiteVersion) -> String {
    format!("{PRECACHE_PREFIX}{version}")
}

/// Runtime generation name for a version.
pub fn runtime_name(version: &SiteVersion) -> String {
    format!("{RUNTIME_PREFIX}{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_names_embed_version() {
        let version = SiteVersion::new(SITE_VERSION);
        assert_eq!(precache_name(&version), "my-pwa-notes-cache-1.1.7");
        assert_eq!(runtime_name(&version), "runtime-cache-1.1.7");
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(GenerationId::new(), GenerationId::new());
        assert_ne!(ClientId::new(), ClientId::new());
    }

    #[test]
    fn test_manifest_covers_offline_doc() {
        assert!(PRECACHE_MANIFEST.contains(&OFFLINE_DOC));
        assert!(PRECACHE_MANIFEST.contains(&""));
    }
}
