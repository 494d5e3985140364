//! Per-request fetch routing.
//!
//! Only GETs are routed; anything else passes straight through to the
//! network. Navigations are network-first so users always see fresh content
//! when the origin is reachable, with every successful document copied into
//! the runtime cache on the way out. Sub-resources are cache-first so the
//! precached app shell never re-downloads. Every failure path lands on a
//! servable body: a cached copy, the offline document, or an inline image
//! placeholder.

use bytes::Bytes;
use http::StatusCode;
use notewave_cache::CacheStorage;
use notewave_common::SiteVersion;
use notewave_net::{FetchRequest, FetchResponse, Network, RequestDestination};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use url::Url;

use crate::scope::Scope;
use crate::{runtime_name, SwError, OFFLINE_DOC};

/// Inline SVG served when an image cannot be fetched or found.
pub const PLACEHOLDER_SVG: &str = r##"<?xml version="1.0" encoding="UTF-8"?><svg xmlns='http://www.w3.org/2000/svg' width='400' height='300' viewBox='0 0 400 300'><rect width='100%' height='100%' fill='#eee'/><text x='50%' y='50%' dominant-baseline='middle' text-anchor='middle' fill='#999' font-family='Arial, Helvetica, sans-serif' font-size='20'>Image unavailable</text></svg>"##;

/// Last-resort offline document, used only when `offline.html` is missing
/// from every cache (a failed or never-run install).
const OFFLINE_FALLBACK_HTML: &str = "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>Offline</title></head><body><h1>You are offline</h1><p>NoteWave needs a connection for this page. Saved notes are still available on the home screen.</p></body></html>";

/// URL suffixes treated as images when the destination is not already known.
const IMAGE_SUFFIXES: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

/// Routing context for one agent generation.
///
/// Cheap to clone; every intercepted request is handled on its own task over
/// a clone, so slow fetches never block one another.
#[derive(Clone)]
pub struct FetchRouter {
    caches: CacheStorage,
    network: Arc<dyn Network>,
    runtime_cache: String,
    offline_url: Url,
}

impl FetchRouter {
    /// Build the router for a generation.
    pub fn new(
        scope: &Scope,
        caches: CacheStorage,
        network: Arc<dyn Network>,
        version: &SiteVersion,
    ) -> Result<Self, SwError> {
        let offline_url = scope.resolve(OFFLINE_DOC)?;
        Ok(Self {
            caches,
            network,
            runtime_cache: runtime_name(version),
            offline_url,
        })
    }

    /// Route one request.
    ///
    /// GETs always produce a servable response. Non-GETs pass through and
    /// surface transport failures to the caller unchanged.
    pub async fn handle(&self, request: FetchRequest) -> Result<FetchResponse, SwError> {
        if !request.is_get() {
            trace!(url = %request.url, method = %request.method, "Pass-through");
            return self
                .network
                .fetch(&request)
                .await
                .map_err(|e| SwError::NetworkError(e.to_string()));
        }

        if request.is_navigation() {
            Ok(self.navigate(request).await)
        } else {
            Ok(self.subresource(request).await)
        }
    }

    /// Network-first: fresh documents win, every success is copied into the
    /// runtime cache, failures fall back to any cached copy and then to the
    /// offline document.
    async fn navigate(&self, request: FetchRequest) -> FetchResponse {
        match self.network.fetch(&request).await {
            Ok(live) => {
                self.caches
                    .put(&self.runtime_cache, &request.url, live.clone())
                    .await;
                debug!(url = %request.url, status = %live.status, "Navigation served from network");
                live
            }
            Err(error) => {
                warn!(url = %request.url, error = %error, "Navigation fetch failed; falling back");
                if let Some(cached) = self.caches.match_any(&request.url).await {
                    return cached;
                }
                self.offline_document().await
            }
        }
    }

    /// Cache-first: a hit is served without touching the network. Misses go
    /// to the network; only status-200 non-opaque responses are stored.
    async fn subresource(&self, request: FetchRequest) -> FetchResponse {
        if let Some(cached) = self.caches.match_any(&request.url).await {
            trace!(url = %request.url, "Sub-resource cache hit");
            return cached;
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.status == StatusCode::OK && !response.is_opaque() {
                    self.caches
                        .put(&self.runtime_cache, &request.url, response.clone())
                        .await;
                }
                response
            }
            Err(error) => {
                warn!(url = %request.url, error = %error, "Sub-resource fetch failed; synthesizing");
                if is_image_request(&request) {
                    image_placeholder(&request.url)
                } else {
                    self.offline_document().await
                }
            }
        }
    }

    /// The precached offline document, or a built-in copy when no cache has
    /// one.
    async fn offline_document(&self) -> FetchResponse {
        if let Some(cached) = self.caches.match_any(&self.offline_url).await {
            return cached;
        }
        FetchResponse::new(
            self.offline_url.clone(),
            StatusCode::OK,
            Bytes::from_static(OFFLINE_FALLBACK_HTML.as_bytes()),
        )
        .with_content_type("text/html; charset=utf-8")
    }
}

/// Whether a failed request should get the image placeholder: either the
/// destination says image, or the URL path carries an image suffix.
fn is_image_request(request: &FetchRequest) -> bool {
    if request.destination == RequestDestination::Image {
        return true;
    }
    let path = request.url.path().to_ascii_lowercase();
    IMAGE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Synthesize the inline placeholder for an unavailable image.
pub fn image_placeholder(url: &Url) -> FetchResponse {
    FetchResponse::new(
        url.clone(),
        StatusCode::OK,
        Bytes::from_static(PLACEHOLDER_SVG.as_bytes()),
    )
    .with_content_type("image/svg+xml")
}
