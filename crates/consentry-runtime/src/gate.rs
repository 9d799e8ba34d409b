//! Content gate: one per wrapped fragment.
//!
//! `Hidden` is the initial state and `Revealed` is terminal for the page:
//! revoking consent later does not hide the content again. Markup inserted
//! as HTML does not run its scripts, so every `<script>` in the payload is
//! rebuilt with the same attributes and body before it is inserted.

use std::sync::Arc;

use consentry_core::{Document, Element, Result};
use consentry_protocol::category::sanitize_key;
use consentry_protocol::{CategoryMapper, ConsentCategory, ConsentEvent, ConsentOracle};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::codec;
use crate::render::WrappedFragment;

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\b((?:[^>"']|"[^"]*"|'[^']*')*)>(.*?)</script\s*>"#).unwrap()
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Hidden,
    Revealed,
}

/// Button pressed on a gate overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Accept only this fragment's content type.
    AcceptContentType,
    AcceptAll,
}

/// Decoded payload ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedPayload {
    pub html: String,
    /// Rebuilt, executable copies of the payload's scripts, in order.
    pub scripts: Vec<Element>,
}

/// Decode a payload and rebuild its scripts. Nothing touches the document
/// here, so a failure cannot leave a half-revealed fragment.
pub fn prepare_payload(encoded: &str) -> Result<RevealedPayload> {
    let html = codec::decode_html(encoded)?;
    let scripts = SCRIPT_RE
        .captures_iter(&html)
        .map(|caps| {
            let mut script = Element::script();
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            for attr in ATTR_RE.captures_iter(attrs) {
                let value = attr
                    .get(2)
                    .or_else(|| attr.get(3))
                    .or_else(|| attr.get(4))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                script.set_attribute(&attr[1].to_lowercase(), value);
            }
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            script.with_text(body)
        })
        .collect();
    Ok(RevealedPayload { html, scripts })
}

/// Visibility controller for a single wrapped fragment.
pub struct ContentGate {
    fragment: WrappedFragment,
    category: ConsentCategory,
    /// Content type as it appears in acceptance cookies and events.
    content_key: String,
    state: Mutex<GateState>,
}

impl ContentGate {
    pub fn new(fragment: WrappedFragment) -> Self {
        let category = CategoryMapper::map(&fragment.content_type);
        let content_key = sanitize_key(&fragment.content_type);
        Self {
            fragment,
            category,
            content_key,
            state: Mutex::new(GateState::Hidden),
        }
    }

    pub fn wrapper_id(&self) -> &str {
        &self.fragment.wrapper_id
    }

    pub fn content_type(&self) -> &str {
        &self.fragment.content_type
    }

    pub fn content_key(&self) -> &str {
        &self.content_key
    }

    pub fn category(&self) -> ConsentCategory {
        self.category
    }

    pub fn fragment(&self) -> &WrappedFragment {
        &self.fragment
    }

    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    /// Put the placeholder and overlay into the document, blocked.
    pub fn mount(&self, document: &Document) {
        document.insert_node(&self.fragment.wrapper_id, &["wpca-external-content-wrapper"], true);
        document.insert_node(&self.fragment.container_id(), &["wrapped-content"], false);
        document.insert_node(&self.fragment.overlay_id(), &["content-blocking-overlay"], true);
    }

    /// Whether an event can change this gate's answer. Events for other
    /// categories or content types are ignored.
    pub fn is_affected_by(&self, event: &ConsentEvent) -> bool {
        match event {
            ConsentEvent::GlobalCookiesAccepted | ConsentEvent::HostClassChanged => true,
            ConsentEvent::GlobalCookiesDeclined => false,
            ConsentEvent::ContentTypeAccepted { content_type } => {
                !self.content_key.is_empty() && *content_type == self.content_key
            }
            ConsentEvent::ExternalConsentChanged { category, granted } => {
                *granted && *category == self.category
            }
        }
    }

    /// Re-check consent and reveal if allowed. Idempotent.
    pub fn evaluate(&self, oracle: &ConsentOracle, document: &Document) -> GateState {
        if self.state() == GateState::Revealed {
            debug!("ContentGate: {} already revealed", self.fragment.wrapper_id);
            return GateState::Revealed;
        }
        if !oracle.content_allowed(&self.fragment.content_type) {
            return GateState::Hidden;
        }
        match self.reveal(document) {
            Ok(()) => GateState::Revealed,
            Err(e) => {
                error!(
                    "ContentGate: cannot decode {}, keeping it blocked: {}",
                    self.fragment.wrapper_id, e
                );
                GateState::Hidden
            }
        }
    }

    /// Decode and insert the payload, running its scripts.
    pub fn reveal(&self, document: &Document) -> Result<()> {
        let mut state = self.state.lock();
        if *state == GateState::Revealed {
            return Ok(());
        }
        let payload = prepare_payload(&self.fragment.encoded_payload)?;

        let container = self.fragment.container_id();
        document.set_inner_html(&container, &payload.html);
        let script_count = payload.scripts.len();
        for script in payload.scripts {
            document.execute_script(&container, script);
        }
        document.set_visible(&container, true);
        document.set_visible(&self.fragment.overlay_id(), false);
        *state = GateState::Revealed;

        info!(
            "ContentGate: revealed {} ({}, {} scripts)",
            self.fragment.wrapper_id, self.fragment.content_type, script_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FragmentAttributes;

    fn gate(content_type: &str, inner: &str) -> ContentGate {
        let attrs = FragmentAttributes {
            content_identifier: Some(content_type.into()),
            ..Default::default()
        };
        ContentGate::new(WrappedFragment::wrap(&attrs, inner))
    }

    #[test]
    fn test_prepare_rebuilds_scripts() {
        let html = r#"<div id="map"></div><script src="https://maps.example/api.js" async data-key='k1'></script><SCRIPT type="text/javascript">initMap("map");</SCRIPT>"#;
        let payload = prepare_payload(&codec::encode(html.as_bytes())).unwrap();
        assert_eq!(payload.html, html);
        assert_eq!(payload.scripts.len(), 2);

        let first = &payload.scripts[0];
        assert_eq!(first.attribute("src"), Some("https://maps.example/api.js"));
        assert_eq!(first.attribute("async"), Some(""));
        assert_eq!(first.attribute("data-key"), Some("k1"));
        assert_eq!(first.text.as_deref(), Some(""));

        let second = &payload.scripts[1];
        assert_eq!(second.attribute("type"), Some("text/javascript"));
        assert_eq!(second.text.as_deref(), Some(r#"initMap("map");"#));
    }

    #[test]
    fn test_quoted_angle_bracket_in_attribute() {
        let html = r#"<script data-x="a>b" src='/s.js?q=1>0'>run()</script>"#;
        let payload = prepare_payload(&codec::encode(html.as_bytes())).unwrap();
        assert_eq!(payload.scripts.len(), 1);
        let script = &payload.scripts[0];
        assert_eq!(script.attribute("data-x"), Some("a>b"));
        assert_eq!(script.attribute("src"), Some("/s.js?q=1>0"));
        assert_eq!(script.text.as_deref(), Some("run()"));
    }

    #[test]
    fn test_reveal_updates_document() {
        let document = Document::new();
        let gate = gate("maps", "<p>map</p><script>draw()</script>");
        gate.mount(&document);
        assert!(document.is_visible(&gate.fragment().overlay_id()));

        gate.reveal(&document).unwrap();
        assert_eq!(gate.state(), GateState::Revealed);
        let container = gate.fragment().container_id();
        assert_eq!(
            document.node(&container).unwrap().inner_html.as_deref(),
            Some("<p>map</p><script>draw()</script>")
        );
        assert!(document.is_visible(&container));
        assert!(!document.is_visible(&gate.fragment().overlay_id()));

        gate.reveal(&document).unwrap();
        assert_eq!(document.executed_scripts().len(), 1);
    }

    #[test]
    fn test_corrupt_payload_stays_hidden() {
        let document = Document::new();
        let mut fragment = WrappedFragment::wrap(&FragmentAttributes::default(), "");
        fragment.encoded_payload = "%%% not base64 %%%".into();
        let gate = ContentGate::new(fragment);
        gate.mount(&document);

        assert!(gate.reveal(&document).is_err());
        assert_eq!(gate.state(), GateState::Hidden);
        let container = gate.fragment().container_id();
        assert!(document.node(&container).unwrap().inner_html.is_none());
        assert!(document.is_visible(&gate.fragment().overlay_id()));
        assert!(document.executed_scripts().is_empty());
    }

    #[test]
    fn test_event_relevance() {
        let video = gate("video", "");
        assert!(video.is_affected_by(&ConsentEvent::GlobalCookiesAccepted));
        assert!(video.is_affected_by(&ConsentEvent::HostClassChanged));
        assert!(!video.is_affected_by(&ConsentEvent::GlobalCookiesDeclined));
        assert!(video.is_affected_by(&ConsentEvent::ContentTypeAccepted {
            content_type: "video".into()
        }));
        assert!(!video.is_affected_by(&ConsentEvent::ContentTypeAccepted {
            content_type: "maps".into()
        }));
        assert!(video.is_affected_by(&ConsentEvent::ExternalConsentChanged {
            category: ConsentCategory::Marketing,
            granted: true,
        }));
        assert!(!video.is_affected_by(&ConsentEvent::ExternalConsentChanged {
            category: ConsentCategory::Statistics,
            granted: true,
        }));
        assert!(!video.is_affected_by(&ConsentEvent::ExternalConsentChanged {
            category: ConsentCategory::Marketing,
            granted: false,
        }));
    }

    #[test]
    fn test_content_type_events_use_sanitized_key() {
        let newsletter = gate("custom:Newsletter", "");
        assert_eq!(newsletter.content_key(), "customnewsletter");
        assert!(newsletter.is_affected_by(&ConsentEvent::ContentTypeAccepted {
            content_type: "customnewsletter".into()
        }));
        assert!(gate("Video", "").is_affected_by(&ConsentEvent::ContentTypeAccepted {
            content_type: "video".into()
        }));
        assert!(!gate("", "").is_affected_by(&ConsentEvent::ContentTypeAccepted {
            content_type: "".into()
        }));
    }
}
