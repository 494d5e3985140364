//! # NoteWave Page
//!
//! The foreground half of the update handshake: registers the caching agent
//! for an open page, turns agent signals into shell UI events, and carries
//! the user's "Refresh" decision back to the waiting generation.
//!
//! ## Features
//!
//! - **Registration**: registers the agent on load, degrades gracefully when
//!   registration fails
//! - **Update banner**: shown once per page when a new build is installed or
//!   already parked in waiting
//! - **Toasts**: "New version available" on install, "App updated to latest
//!   version!" on takeover
//! - **Reload**: emitted when the page's controller changes
//!
//! The controller never touches a real DOM. It emits [`UiEvent`]s on a
//! channel and leaves rendering to whatever shell embeds it.

use notewave_net::{FetchRequest, FetchResponse};
use notewave_sw::{
    AgentNotice, AgentScript, ClientId, PageMessage, PageSignal, SwContainer, SwError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

// ==================== UI Events ====================

/// Toast severity, mapped by the shell to its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
}

/// What the page shell should show or do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Surface the update banner with its Refresh button.
    UpdateBanner,

    /// Show a transient toast.
    Toast { message: String, kind: ToastKind },

    /// Reload the page so it loads under the new controller.
    Reload,
}

// ==================== Controller ====================

/// Drives one open page's side of the update handshake.
pub struct UpdateController {
    container: SwContainer,
    client: ClientId,
    signals: mpsc::UnboundedReceiver<PageSignal>,
    ui: mpsc::UnboundedSender<UiEvent>,
    banner_shown: bool,
}

impl UpdateController {
    /// Open the page under the container's scope and register the agent
    /// script. Returns the controller and the shell's UI event stream.
    ///
    /// Registration failure is logged and swallowed: the page keeps working,
    /// it just has no offline support.
    pub async fn start(
        container: SwContainer,
        script: &AgentScript,
        page_url: Url,
    ) -> Result<(Self, mpsc::UnboundedReceiver<UiEvent>), SwError> {
        let (client, signals) = container.connect_page(page_url).await?;
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();

        let mut controller = Self {
            container,
            client,
            signals,
            ui: ui_tx,
            banner_shown: false,
        };

        match controller.container.register(script).await {
            Ok(generation) => debug!(%generation, "Agent registered"),
            Err(error) => warn!(
                error = %error,
                "Agent registration failed; continuing without offline support"
            ),
        }

        // A new build may already be parked from an earlier visit.
        if controller.container.waiting().await.is_some() {
            controller.show_update_banner();
        }

        Ok((controller, ui_rx))
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Issue a request as this page.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, SwError> {
        self.container.fetch(self.client, request).await
    }

    /// The user clicked Refresh on the update banner: ask the waiting
    /// generation to take over now, or just reload when none is parked.
    pub async fn accept_update(&self) {
        match self.container.waiting().await {
            Some(waiting) => {
                info!(generation = %waiting.id(), "Update accepted");
                waiting.post_message(PageMessage::SkipWaiting);
            }
            None => {
                let _ = self.ui.send(UiEvent::Reload);
            }
        }
    }

    /// Wait for the next agent signal and apply it to the shell. Returns
    /// `false` once the signal stream has closed.
    pub async fn handle_next(&mut self) -> bool {
        match self.signals.recv().await {
            Some(signal) => {
                self.on_signal(signal);
                true
            }
            None => false,
        }
    }

    /// Pump signals until the stream closes.
    pub async fn run(mut self) {
        while self.handle_next().await {}
    }

    fn on_signal(&mut self, signal: PageSignal) {
        match signal {
            PageSignal::Notice(AgentNotice::Installed) => {
                self.show_update_banner();
                self.toast("New version available", ToastKind::Info);
            }
            PageSignal::Notice(AgentNotice::Activated) => {
                self.toast("App updated to latest version!", ToastKind::Success);
            }
            PageSignal::ControllerChange => {
                info!(client = %self.client, "Controller changed; reloading");
                let _ = self.ui.send(UiEvent::Reload);
            }
        }
    }

    /// Once per page: later installs while the banner is already up change
    /// nothing.
    fn show_update_banner(&mut self) {
        if self.banner_shown {
            return;
        }
        self.banner_shown = true;
        let _ = self.ui.send(UiEvent::UpdateBanner);
    }

    fn toast(&self, message: &str, kind: ToastKind) {
        let _ = self.ui.send(UiEvent::Toast {
            message: message.to_string(),
            kind,
        });
    }
}
