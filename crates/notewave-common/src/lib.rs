//! # NoteWave Common
//!
//! Shared types and logging configuration for the NoteWave offline notes app.
//!
//! ## Features
//!
//! - Site version literal used to name cache generations
//! - Logging configuration and setup

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Manually bumped deploy version (a `1.1.7`-style literal).
///
/// Bumping this literal is the sole trigger for a new install cycle: the
/// caching agent embeds it in the names of both cache generations and treats
/// any live cache whose name carries a different version as stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteVersion(String);

impl SiteVersion {
    /// Create a version from its literal form, e.g. `SiteVersion::new("1.1.7")`.
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The raw version literal.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteVersion {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}
