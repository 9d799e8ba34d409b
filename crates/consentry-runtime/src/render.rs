//! Server-side rendering of wrapped third-party content.
//!
//! The inner markup is never emitted as-is: it travels base64-encoded in a
//! `data-content` attribute and only the gate turns it back into markup.

use serde::{Deserialize, Serialize};

use consentry_protocol::category::sanitize_key;

use crate::codec;

pub const DEFAULT_BLOCKING_MESSAGE: &str =
    "This content is currently blocked to protect your privacy.";
pub const DEFAULT_BUTTON_TEXT: &str = "Accept cookies and show content";
pub const ACCEPT_ALL_TEXT: &str = "Accept all cookies";

/// Block attributes as saved by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentAttributes {
    #[serde(default)]
    pub blocking_message: Option<String>,
    #[serde(default)]
    pub button_text: Option<String>,
    #[serde(default)]
    pub content_identifier: Option<String>,
    /// Used when `content_identifier` is `other`.
    #[serde(default)]
    pub custom_identifier: Option<String>,
}

/// A piece of third-party markup held back until consent allows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedFragment {
    pub wrapper_id: String,
    pub content_type: String,
    pub encoded_payload: String,
    pub blocking_message: String,
    pub button_label: String,
}

impl WrappedFragment {
    /// Wrap inner markup with a fresh wrapper id.
    pub fn wrap(attributes: &FragmentAttributes, inner_html: &str) -> Self {
        let mut content_type = attributes.content_identifier.clone().unwrap_or_default();
        if content_type == "other" {
            if let Some(custom) = attributes
                .custom_identifier
                .as_deref()
                .map(sanitize_key)
                .filter(|k| !k.is_empty())
            {
                content_type = custom;
            }
        }

        Self {
            wrapper_id: format!("wpca-wrapper-{}", uuid::Uuid::new_v4().simple()),
            content_type,
            encoded_payload: codec::encode(inner_html.as_bytes()),
            blocking_message: attributes
                .blocking_message
                .clone()
                .unwrap_or_else(|| DEFAULT_BLOCKING_MESSAGE.into()),
            button_label: attributes
                .button_text
                .clone()
                .unwrap_or_else(|| DEFAULT_BUTTON_TEXT.into()),
        }
    }

    /// Id of the element the decoded payload is inserted into.
    pub fn container_id(&self) -> String {
        format!("{}-content", self.wrapper_id)
    }

    /// Id of the overlay shown while the content is blocked.
    pub fn overlay_id(&self) -> String {
        format!("{}-overlay", self.wrapper_id)
    }

    /// Markup sent to the browser.
    pub fn to_html(&self) -> String {
        let content_type = escape(&self.content_type);
        let mut html = String::new();
        html.push_str(&format!(
            "<div id=\"{}\" class=\"wpca-external-content-wrapper\" data-content-type=\"{}\">\n",
            escape(&self.wrapper_id),
            content_type
        ));
        html.push_str(&format!(
            "  <div id=\"{}\" class=\"wrapped-content\" data-content=\"{}\" style=\"display:none\"></div>\n",
            escape(&self.container_id()),
            escape(&self.encoded_payload)
        ));
        html.push_str(&format!(
            "  <div id=\"{}\" class=\"content-blocking-overlay\">\n",
            escape(&self.overlay_id())
        ));
        html.push_str(&format!("    <p>{}</p>\n", escape(&self.blocking_message)));
        if !self.content_type.is_empty() {
            html.push_str(&format!(
                "    <button type=\"button\" class=\"accept-cookies-btn btn button btn-primary wp-element-button\" data-content-type=\"{}\">{}</button>\n",
                content_type,
                escape(&self.button_label)
            ));
        }
        html.push_str(&format!(
            "    <button type=\"button\" class=\"accept-cookies-btn btn button btn-secondary wp-element-button\">{}</button>\n",
            ACCEPT_ALL_TEXT
        ));
        html.push_str("  </div>\n</div>\n");
        html
    }
}

/// Escape text for use in HTML content and double-quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
