//! Telemetry relay
//!
//! Fire-and-forget reporting of filtering events to the background store.
//! A closed or missing channel is logged and otherwise ignored.

use storage::{ContentKind, StoreMessage};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// Replacement recorded in history for blurred images
pub const BLURRED_IMAGE: &str = "blurred-image";

/// History partition key for a page: its host, or the raw URL when it has none
pub fn domain_of(page_url: &str) -> String {
    Url::parse(page_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| page_url.to_string())
}

/// Sends filtering events for one page
#[derive(Debug, Clone)]
pub struct TelemetryRelay {
    tx: Option<UnboundedSender<StoreMessage>>,
    domain: String,
}

impl TelemetryRelay {
    /// Relay events for `page_url` into `tx`
    pub fn new(tx: UnboundedSender<StoreMessage>, page_url: &str) -> Self {
        Self {
            tx: Some(tx),
            domain: domain_of(page_url),
        }
    }

    /// A relay that drops every event
    pub fn disabled(page_url: &str) -> Self {
        Self {
            tx: None,
            domain: domain_of(page_url),
        }
    }

    /// Domain events are filed under
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Report one filtering event: a stats bump and a history entry
    pub fn report(&self, kind: ContentKind, original: &str, replacement: &str) {
        self.send(StoreMessage::UpdateStats { kind });
        self.send(StoreMessage::AddToHistory {
            domain: self.domain.clone(),
            kind,
            content: original.to_string(),
            replacement: replacement.to_string(),
        });
    }

    fn send(&self, message: StoreMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(message) {
            tracing::warn!("Failed to report filtering event for {}: {}", self.domain, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://news.example.com/a/b?c=d"), "news.example.com");
        assert_eq!(domain_of("http://localhost:8080/"), "localhost");
        assert_eq!(domain_of("not a url"), "not a url");
    }

    #[test]
    fn test_report_sends_stats_and_history() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = TelemetryRelay::new(tx, "https://example.com/page");

        relay.report(ContentKind::Text, "so vulgar", "so ******");

        assert_eq!(rx.try_recv().unwrap(), StoreMessage::UpdateStats { kind: ContentKind::Text });
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreMessage::AddToHistory {
                domain: "example.com".to_string(),
                kind: ContentKind::Text,
                content: "so vulgar".to_string(),
                replacement: "so ******".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let relay = TelemetryRelay::new(tx, "https://example.com/");
        relay.report(ContentKind::Image, "/a.png", BLURRED_IMAGE);
    }

    #[test]
    fn test_disabled_relay() {
        let relay = TelemetryRelay::disabled("https://example.com/");
        assert_eq!(relay.domain(), "example.com");
        relay.report(ContentKind::Text, "a", "b");
    }
}
