//! # NoteWave Net
//!
//! The fetch primitive consumed by the NoteWave caching agent.
//!
//! ## Design Goals
//!
//! 1. **One seam**: the agent sees a single [`Network`] trait, never a client
//! 2. **Request shape**: carries mode and destination so routing can branch
//! 3. **Opaque sealing**: cross-origin no-cors responses hide their payload
//! 4. **Scripted origin**: [`SimNetwork`] replays a site for tests and demos

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

pub mod sim;

pub use sim::{SimNetwork, SimResource};

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// How a request was initiated, mirroring `Request.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Full-page load (address bar, link click, reload).
    Navigate,
    /// Cross-origin fetch performed with CORS permission checks.
    Cors,
    /// Cross-origin fetch without CORS; the response comes back opaque.
    #[default]
    NoCors,
    /// Same-origin only; crossing origins is an error.
    SameOrigin,
}

/// What the fetched resource will be used for, mirroring `Request.destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    Document,
    Script,
    Style,
    Image,
    Manifest,
    #[default]
    Other,
}

/// A request as seen by the caching agent.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub mode: RequestMode,
    pub destination: RequestDestination,
    pub headers: HeaderMap,
}

impl FetchRequest {
    /// Create a plain GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: RequestMode::NoCors,
            destination: RequestDestination::Other,
            headers: HeaderMap::new(),
        }
    }

    /// Create a full-page navigation request.
    pub fn navigation(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: RequestMode::Navigate,
            destination: RequestDestination::Document,
            headers: HeaderMap::new(),
        }
    }

    /// Create an image sub-resource request.
    pub fn image(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            mode: RequestMode::NoCors,
            destination: RequestDestination::Image,
            headers: HeaderMap::new(),
        }
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the destination.
    pub fn destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this request is a full-page load.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Whether this request uses the GET method.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}

/// Visibility class of a response, mirroring `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    /// Same-origin response; fully visible.
    #[default]
    Basic,
    /// Cross-origin response fetched with CORS permission.
    Cors,
    /// Cross-origin response without CORS permission. Payload and headers
    /// are sealed; such a response must never be stored in a cache.
    Opaque,
}

/// A response as seen by the caching agent.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub kind: ResponseKind,
    /// Set on copies served out of a cache, never on live responses.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Create a basic response with the given status and body.
    pub fn new(url: Url, status: StatusCode, body: Bytes) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body,
            kind: ResponseKind::Basic,
            from_cache: false,
        }
    }

    /// Set the Content-Type header.
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(http::header::CONTENT_TYPE, value);
        }
        self
    }

    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the payload is sealed behind the cross-origin boundary.
    ///
    /// Policy decisions must branch on this, never on `status`: an opaque
    /// response keeps its transport status for logging only.
    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    /// Parsed Content-Type, if present and well-formed.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// The body as text, for callers that know the payload is UTF-8.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Seal this response behind the cross-origin boundary: payload and
    /// headers are dropped, only the transport status survives.
    pub fn into_opaque(mut self) -> Self {
        self.headers = HeaderMap::new();
        self.body = Bytes::new();
        self.kind = ResponseKind::Opaque;
        self
    }
}

/// The fetch capability the caching agent consumes.
///
/// `HttpNetwork` talks to real origins; `SimNetwork` replays a scripted one.
/// The agent holds an `Arc<dyn Network>` and cannot tell them apart.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform one request against the origin.
    ///
    /// An `Err` means the transport failed (offline, refused, reset). HTTP
    /// error statuses are not transport failures and come back as `Ok`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError>;
}

/// HTTP network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Enable cookies.
    pub cookies_enabled: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: "NoteWave/1.0".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            max_redirects: 10,
            cookies_enabled: true,
        }
    }
}

/// Real HTTP origin access over reqwest.
///
/// Requests carry no deadline: a navigation attempt must run until the
/// transport itself gives up, so the cache fallback keys off real failure
/// rather than an artificial timeout.
pub struct HttpNetwork {
    client: Client,
    config: NetworkConfig,
}

impl HttpNetwork {
    /// Create an HTTP network with the given configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookies_enabled)
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Classify the response visibility from the request/response origins.
    fn classify(request: &FetchRequest, final_url: &Url) -> Result<ResponseKind, NetError> {
        let same_origin = request.url.origin() == final_url.origin();
        if same_origin || request.is_navigation() {
            return Ok(ResponseKind::Basic);
        }
        match request.mode {
            RequestMode::Cors => Ok(ResponseKind::Cors),
            RequestMode::SameOrigin => Err(NetError::RequestFailed(format!(
                "same-origin request crossed origins: {} -> {}",
                request.url, final_url
            ))),
            _ => Ok(ResponseKind::Opaque),
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }
        req_builder = req_builder.header("Accept-Language", &self.config.accept_language);

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %final_url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        let kind = Self::classify(request, &final_url)?;
        let fetched = FetchResponse {
            url: final_url,
            status,
            headers,
            body,
            kind,
            from_cache: false,
        };

        Ok(match kind {
            ResponseKind::Opaque => fetched.into_opaque(),
            _ => fetched,
        })
    }
}
