//! Scripted origin for tests and demos.
//!
//! A `SimNetwork` serves canned resources by exact URL, can be flipped
//! offline, and records every request that actually reached it. The request
//! log is what lets a caller prove a cache hit never touched the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tokio::sync::RwLock;
use tracing::trace;
use url::Url;

use crate::{FetchRequest, FetchResponse, NetError, Network, ResponseKind};

/// One canned resource a `SimNetwork` can serve.
#[derive(Debug, Clone)]
pub struct SimResource {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl SimResource {
    /// An HTML document.
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// An arbitrary 200 resource with the given content type.
    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: content_type.to_string(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// Override the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Mark the resource as served across the cross-origin boundary.
    pub fn opaque(mut self) -> Self {
        self.kind = ResponseKind::Opaque;
        self
    }

    fn to_response(&self, url: &Url) -> FetchResponse {
        let response = FetchResponse::new(url.clone(), self.status, self.body.clone())
            .with_content_type(&self.content_type);
        match self.kind {
            ResponseKind::Opaque => response.into_opaque(),
            kind => FetchResponse { kind, ..response },
        }
    }
}

/// In-memory origin that replays scripted resources.
pub struct SimNetwork {
    routes: RwLock<HashMap<Url, SimResource>>,
    online: AtomicBool,
    log: RwLock<Vec<Url>>,
}

impl SimNetwork {
    /// Create an online origin with no routes.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            log: RwLock::new(Vec::new()),
        }
    }

    /// Serve `resource` at `url`, replacing any previous content. Replacing
    /// a route is how tests model a new deploy.
    pub async fn serve(&self, url: Url, resource: SimResource) {
        trace!(url = %url, status = %resource.status, "Sim route added");
        self.routes.write().await.insert(url, resource);
    }

    /// Flip connectivity. While offline every fetch fails with
    /// [`NetError::Offline`] without being logged.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Every URL that reached the origin, in arrival order.
    pub async fn requests(&self) -> Vec<Url> {
        self.log.read().await.clone()
    }

    /// How many times `url` reached the origin.
    pub async fn hits(&self, url: &Url) -> usize {
        self.log.read().await.iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Network for SimNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        if !self.is_online() {
            return Err(NetError::Offline(request.url.to_string()));
        }

        self.log.write().await.push(request.url.clone());

        match self.routes.read().await.get(&request.url) {
            Some(resource) => Ok(resource.to_response(&request.url)),
            None => Ok(FetchResponse::new(
                request.url.clone(),
                StatusCode::NOT_FOUND,
                Bytes::from_static(b"not found"),
            )
            .with_content_type("text/plain")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_serves_scripted_resource() {
        let net = SimNetwork::new();
        net.serve(
            url("https://notes.example/app/index.html"),
            SimResource::html("<h1>notes</h1>"),
        )
        .await;

        let request = FetchRequest::navigation(url("https://notes.example/app/index.html"));
        let response = net.fetch(&request).await.unwrap();

        assert!(response.ok());
        assert_eq!(response.text().unwrap(), "<h1>notes</h1>");
        assert_eq!(net.hits(&request.url).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_not_transport_failure() {
        let net = SimNetwork::new();
        let request = FetchRequest::get(url("https://notes.example/app/missing.css"));

        let response = net.fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offline_fails_without_logging() {
        let net = SimNetwork::new();
        net.serve(
            url("https://notes.example/app/index.html"),
            SimResource::html("<h1>notes</h1>"),
        )
        .await;
        net.set_online(false);

        let request = FetchRequest::navigation(url("https://notes.example/app/index.html"));
        let result = net.fetch(&request).await;

        assert!(matches!(result, Err(NetError::Offline(_))));
        assert!(net.requests().await.is_empty());

        net.set_online(true);
        assert!(net.fetch(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_redeploy_replaces_route() {
        let net = SimNetwork::new();
        let page = url("https://notes.example/app/index.html");
        net.serve(page.clone(), SimResource::html("v1")).await;
        net.serve(page.clone(), SimResource::html("v2")).await;

        let response = net
            .fetch(&FetchRequest::navigation(page.clone()))
            .await
            .unwrap();
        assert_eq!(response.text().unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_opaque_route_comes_back_sealed() {
        let net = SimNetwork::new();
        let widget = url("https://cdn.example/widget.js");
        net.serve(
            widget.clone(),
            SimResource::ok("text/javascript", "payload").opaque(),
        )
        .await;

        let response = net.fetch(&FetchRequest::get(widget)).await.unwrap();
        assert!(response.is_opaque());
        assert!(response.body.is_empty());
    }
}
