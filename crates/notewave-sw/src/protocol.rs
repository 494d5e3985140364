//! Update handshake wire messages.
//!
//! The payloads are deliberately tiny and tagged: `{"type":"SW_INSTALLED"}`,
//! `{"type":"SW_ACTIVATED"}`, `{"type":"SKIP_WAITING"}`. Delivery in both
//! directions is fire-and-forget with no acknowledgment or retry; a page
//! that misses a notice recovers on its next registration.

use serde::{Deserialize, Serialize};

/// Agent → page lifecycle notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentNotice {
    /// A new generation finished precaching. It may be waiting behind an
    /// older active generation or already on its way to activation.
    #[serde(rename = "SW_INSTALLED")]
    Installed,

    /// A generation finished activating and now controls fetches.
    #[serde(rename = "SW_ACTIVATED")]
    Activated,
}

/// Page → agent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Ask a waiting generation to take over immediately instead of waiting
    /// for the active one to be released.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

/// Everything a page can hear from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    /// Broadcast notice from an agent generation.
    Notice(AgentNotice),

    /// A different generation began controlling this page. Pages reload on
    /// this signal so the new generation serves their next document load.
    ControllerChange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_wire_format() {
        assert_eq!(
            serde_json::to_string(&AgentNotice::Installed).unwrap(),
            r#"{"type":"SW_INSTALLED"}"#
        );
        assert_eq!(
            serde_json::to_string(&AgentNotice::Activated).unwrap(),
            r#"{"type":"SW_ACTIVATED"}"#
        );
    }

    #[test]
    fn test_skip_waiting_wire_format() {
        assert_eq!(
            serde_json::to_string(&PageMessage::SkipWaiting).unwrap(),
            r#"{"type":"SKIP_WAITING"}"#
        );
    }

    #[test]
    fn test_round_trip() {
        let parsed: AgentNotice = serde_json::from_str(r#"{"type":"SW_ACTIVATED"}"#).unwrap();
        assert_eq!(parsed, AgentNotice::Activated);

        let parsed: PageMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(parsed, PageMessage::SkipWaiting);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<PageMessage>(r#"{"type":"NOT_A_THING"}"#).is_err());
        assert!(serde_json::from_str::<AgentNotice>(r#"{}"#).is_err());
    }
}
