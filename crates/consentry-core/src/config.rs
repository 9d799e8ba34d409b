//! Operator settings supplied by the surrounding site.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the blanket consent cookie.
pub const DEFAULT_COOKIE_NAME: &str = "wp_conditional_ana_banner";

static ANALYTICS_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static COOKIE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9!#$%&'*+.^_`|~-]+$").unwrap());

/// An additional third-party script fired together with the analytics bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub id: String,
    pub url: String,
}

/// Consent settings, as stored by the admin side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentryConfig {
    #[serde(default = "default_true")]
    pub activate_banner: bool,
    /// Days an "accept" decision is remembered.
    #[serde(default = "default_save_days")]
    pub acceptance_save_duration_days: i64,
    /// Days a "decline" decision is remembered.
    #[serde(default = "default_decline_days")]
    pub acceptance_decline_duration_days: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_analytics_tag: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Prefix for per-content-type cookies (`<prefix>_<contentType>`).
    #[serde(default = "default_cookie_name")]
    pub content_cookie_prefix: String,
    #[serde(default)]
    pub additional_scripts: Vec<ScriptEntry>,
}

fn default_true() -> bool {
    true
}
fn default_save_days() -> i64 {
    1825
}
fn default_decline_days() -> i64 {
    30
}
fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.into()
}

impl Default for ConsentryConfig {
    fn default() -> Self {
        Self {
            activate_banner: true,
            acceptance_save_duration_days: 1825,
            acceptance_decline_duration_days: 30,
            google_analytics_tag: None,
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            content_cookie_prefix: DEFAULT_COOKIE_NAME.into(),
            additional_scripts: Vec::new(),
        }
    }
}

impl ConsentryConfig {
    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config: {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `CONSENTRY_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("CONSENTRY_ACTIVATE_BANNER") {
            self.activate_banner = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("CONSENTRY_SAVE_DAYS") {
            self.acceptance_save_duration_days = v
                .parse()
                .map_err(|_| Error::Config(format!("CONSENTRY_SAVE_DAYS is not a number: {}", v)))?;
        }
        if let Ok(v) = std::env::var("CONSENTRY_DECLINE_DAYS") {
            self.acceptance_decline_duration_days = v.parse().map_err(|_| {
                Error::Config(format!("CONSENTRY_DECLINE_DAYS is not a number: {}", v))
            })?;
        }
        if let Ok(v) = std::env::var("CONSENTRY_GA_TAG") {
            self.google_analytics_tag = Some(v).filter(|t| !t.is_empty());
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values that would end up unescaped in cookies or inline scripts.
    pub fn validate(&self) -> Result<()> {
        if let Some(tag) = &self.google_analytics_tag {
            if !ANALYTICS_TAG_RE.is_match(tag) {
                return Err(Error::Config(format!("invalid analytics tag: {:?}", tag)));
            }
        }
        for name in [&self.cookie_name, &self.content_cookie_prefix] {
            if !COOKIE_TOKEN_RE.is_match(name) {
                return Err(Error::Config(format!("invalid cookie name: {:?}", name)));
            }
        }
        for script in &self.additional_scripts {
            if script.id.is_empty() || script.url.is_empty() {
                return Err(Error::Config("additional script needs an id and a url".into()));
            }
        }
        Ok(())
    }

    /// Name of the cookie that records acceptance of a single content type.
    pub fn content_cookie_name(&self, content_type: &str) -> String {
        format!("{}_{}", self.content_cookie_prefix, content_type)
    }
}
