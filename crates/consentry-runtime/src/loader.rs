//! Script loader: at-most-once injection of third-party scripts.
//!
//! Every injected script carries the id `<id>-js`; its presence in the
//! document is what makes repeated loads no-ops. Several trigger paths
//! (initial load, accept click, host API event, window load) may all try
//! the same injection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use consentry_core::{Document, Element};
use consentry_protocol::{ConsentCategory, ConsentOracle};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

/// Id of the primary analytics script.
pub const ANALYTICS_SCRIPT_ID: &str = "google-analytics";
/// Id of the inline `dataLayer` configuration block.
pub const ANALYTICS_CONFIG_ID: &str = "google-analytics-config";
/// Entry point of the secondary marketing integration (ActiveCampaign).
pub const SECONDARY_ENTRY_POINT: &str = "vgo";

/// Element id for a script registered under `id`.
pub fn element_id(id: &str) -> String {
    format!("{}-js", id)
}

/// A script waiting to be fired with the analytics bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptRegistration {
    pub id: String,
    pub url: String,
    pub attributes: Vec<(String, String)>,
}

/// Injects scripts into the document head.
pub struct ScriptLoader {
    document: Arc<Document>,
    oracle: Arc<ConsentOracle>,
    /// Registration order is kept; re-registering keeps the original slot.
    registry: RwLock<Vec<ScriptRegistration>>,
}

impl ScriptLoader {
    pub fn new(document: Arc<Document>, oracle: Arc<ConsentOracle>) -> Self {
        Self {
            document,
            oracle,
            registry: RwLock::new(Vec::new()),
        }
    }

    /// Inject a script unless one with the derived id exists.
    /// Returns whether anything was injected.
    pub fn load(&self, id: &str, url: &str, attributes: &[(String, String)]) -> bool {
        let element_id = element_id(id);
        if self.document.contains_id(&element_id) {
            debug!("ScriptLoader: {} already present", element_id);
            return false;
        }

        let mut script = Element::script()
            .with_attribute("src", url)
            .with_attribute("async", "true");
        for (name, value) in attributes {
            if name.eq_ignore_ascii_case("id") {
                debug!("ScriptLoader: ignoring id override {:?} for {}", value, element_id);
                continue;
            }
            script.set_attribute(name, value);
        }
        // The derived id is what keeps repeated loads from injecting twice.
        script.set_attribute("id", &element_id);
        self.document.append_to_head(script);
        info!("ScriptLoader: injected {} ({})", element_id, url);
        true
    }

    /// Inject only if `category` is currently consented. Callers re-invoke
    /// this on consent changes; the loader keeps no subscription.
    pub fn conditionally_load(
        &self,
        id: &str,
        url: &str,
        category: ConsentCategory,
        attributes: &[(String, String)],
    ) -> bool {
        if !self.oracle.has_consent(category) {
            debug!("ScriptLoader: {} withheld, no {} consent", id, category);
            return false;
        }
        self.load(id, url, attributes)
    }

    // ---------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------

    /// Register a script for the analytics bundle. Last writer wins.
    pub fn register(&self, id: &str, url: &str, attributes: Vec<(String, String)>) {
        let mut registry = self.registry.write();
        let registration = ScriptRegistration {
            id: id.to_string(),
            url: url.to_string(),
            attributes,
        };
        match registry.iter_mut().find(|r| r.id == id) {
            Some(slot) => *slot = registration,
            None => registry.push(registration),
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|r| r.id != id);
        registry.len() != before
    }

    pub fn registrations(&self) -> Vec<ScriptRegistration> {
        self.registry.read().clone()
    }

    /// Inject one registered script by id.
    pub fn load_registered(&self, id: &str) -> bool {
        let registration = self.registry.read().iter().find(|r| r.id == id).cloned();
        match registration {
            Some(r) => self.load(&r.id, &r.url, &r.attributes),
            None => false,
        }
    }

    /// Inject all registered scripts in registration order.
    pub fn load_all_registered(&self) -> usize {
        let registrations = self.registrations();
        registrations
            .iter()
            .filter(|r| self.load(&r.id, &r.url, &r.attributes))
            .count()
    }
}

/// What a bundle call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    pub primary_injected: bool,
    pub config_injected: bool,
    pub additional_injected: usize,
    pub secondary_activated: bool,
}

/// The analytics payload: primary script, inline configuration, the
/// registered extras and the secondary integration. Runs fully at most once
/// per page.
pub struct AnalyticsBundle {
    loader: Arc<ScriptLoader>,
    document: Arc<Document>,
    tag: Option<String>,
    /// Global "already loaded" flag.
    loaded: AtomicBool,
    secondary_activated: AtomicBool,
}

impl AnalyticsBundle {
    pub fn new(loader: Arc<ScriptLoader>, document: Arc<Document>, tag: Option<String>) -> Self {
        Self {
            loader,
            document,
            tag,
            loaded: AtomicBool::new(false),
            secondary_activated: AtomicBool::new(false),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Fire the bundle. Without an analytics tag this is a no-op.
    /// Returns `None` if nothing ran.
    pub fn load(&self) -> Option<BundleReport> {
        let tag = self.tag.as_deref()?;
        if self.loaded.swap(true, Ordering::AcqRel) {
            debug!("AnalyticsBundle: already loaded");
            return None;
        }

        let mut report = BundleReport {
            primary_injected: self.loader.load(
                ANALYTICS_SCRIPT_ID,
                &format!("https://www.googletagmanager.com/gtag/js?id={}", tag),
                &[],
            ),
            ..Default::default()
        };

        if !self.document.contains_id(ANALYTICS_CONFIG_ID) {
            let inline = format!(
                "window.dataLayer = window.dataLayer || [];\nfunction gtag(){{dataLayer.push(arguments);}}\ngtag('js', new Date());\ngtag('config', '{}');",
                tag
            );
            self.document.append_to_head(
                Element::script()
                    .with_attribute("id", ANALYTICS_CONFIG_ID)
                    .with_text(&inline),
            );
            report.config_injected = true;
        }

        report.additional_injected = self.loader.load_all_registered();
        report.secondary_activated = self.activate_secondary();

        info!(
            "AnalyticsBundle: loaded tag {} (+{} additional scripts)",
            tag, report.additional_injected
        );
        Some(report)
    }

    /// Tell the secondary integration tracking is allowed, once, as soon as
    /// its entry point exists.
    pub fn activate_secondary(&self) -> bool {
        if self.secondary_activated.load(Ordering::Acquire)
            || !self.document.has_global(SECONDARY_ENTRY_POINT)
        {
            return false;
        }
        if self.secondary_activated.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.document
            .invoke_global(SECONDARY_ENTRY_POINT, &["process", "allowTracking"])
    }
}
