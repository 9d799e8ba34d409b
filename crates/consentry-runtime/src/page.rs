//! Page context: wires oracle, loader, analytics bundle and gates to one
//! document and one event bus for the lifetime of a page view.
//!
//! All "already done" state lives here (or in the components the page
//! owns) and disappears with the page.

use std::sync::{Arc, Weak};

use consentry_core::document::BODY_ID;
use consentry_core::{ConsentryConfig, CookieStore, Document, Result};
use consentry_protocol::{
    ConsentCategory, ConsentEvent, ConsentOracle, ConsentRecord, EventBus, HostConsentApi,
    SubscriptionId, VisitorProfile,
};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::gate::{ContentGate, GateAction, GateState};
use crate::loader::{AnalyticsBundle, ScriptLoader};
use crate::render::WrappedFragment;

/// Id of the consent banner element.
pub const BANNER_ID: &str = "wpca_banner";
pub const CLASS_HIDDEN: &str = "hidden";
pub const CLASS_ACCEPTED: &str = "cookies-accepted";
pub const CLASS_DECLINED: &str = "cookies-declined";

struct PageInner {
    config: ConsentryConfig,
    document: Arc<Document>,
    bus: Arc<EventBus>,
    oracle: Arc<ConsentOracle>,
    loader: Arc<ScriptLoader>,
    bundle: AnalyticsBundle,
    gates: RwLock<Vec<Arc<ContentGate>>>,
}

/// Snapshot of the page's consent situation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    pub records: Vec<ConsentRecord>,
    pub external_api: bool,
    pub autoload_analytics: bool,
    pub banner_visible: bool,
    pub body_classes: Vec<String>,
    pub head_scripts: Vec<String>,
    pub gates: Vec<GateReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    pub wrapper_id: String,
    pub content_type: String,
    pub category: ConsentCategory,
    pub state: GateState,
}

/// One page view.
pub struct Page {
    inner: Arc<PageInner>,
    subscription: SubscriptionId,
}

impl Page {
    /// Start a page view: evaluate consent, fire what may fire, show the
    /// banner if needed and start listening for changes.
    pub fn init(
        config: ConsentryConfig,
        document: Arc<Document>,
        cookies: Arc<CookieStore>,
        visitor: VisitorProfile,
        host_api: Option<Arc<dyn HostConsentApi>>,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        document.insert_node(BODY_ID, &[], true);
        document.insert_node(BANNER_ID, &["wp-conditional-analytics-banner", CLASS_HIDDEN], true);

        let oracle = Arc::new(ConsentOracle::new(
            config.clone(),
            cookies,
            visitor,
            host_api,
            bus.clone(),
        ));
        let loader = Arc::new(ScriptLoader::new(document.clone(), oracle.clone()));
        for script in &config.additional_scripts {
            loader.register(&script.id, &script.url, Vec::new());
        }
        let bundle = AnalyticsBundle::new(
            loader.clone(),
            document.clone(),
            config.google_analytics_tag.clone(),
        );

        let inner = Arc::new(PageInner {
            config,
            document,
            bus: bus.clone(),
            oracle,
            loader,
            bundle,
            gates: RwLock::new(Vec::new()),
        });

        let local = inner.oracle.local_decision();
        if inner.config.activate_banner && local.is_none() {
            inner.document.remove_class(BANNER_ID, CLASS_HIDDEN);
        }
        if inner.should_autoload_analytics() {
            inner.bundle.load();
            inner.add_body_class(CLASS_ACCEPTED);
        }
        if local == Some(false) {
            inner.add_body_class(CLASS_DECLINED);
        }

        let weak: Weak<PageInner> = Arc::downgrade(&inner);
        let subscription = bus.subscribe(move |event| {
            if let Some(page) = weak.upgrade() {
                page.handle_event(event);
            }
        });

        info!(
            "Page: initialized (banner={}, analytics={})",
            inner.banner_visible(),
            inner.bundle.is_loaded()
        );
        Ok(Self {
            inner,
            subscription,
        })
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.inner.document
    }

    pub fn oracle(&self) -> &Arc<ConsentOracle> {
        &self.inner.oracle
    }

    pub fn loader(&self) -> &Arc<ScriptLoader> {
        &self.inner.loader
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn should_autoload_analytics(&self) -> bool {
        self.inner.should_autoload_analytics()
    }

    pub fn banner_visible(&self) -> bool {
        self.inner.banner_visible()
    }

    pub fn analytics_loaded(&self) -> bool {
        self.inner.bundle.is_loaded()
    }

    // ---------------------------------------------------------------
    // Scripts
    // ---------------------------------------------------------------

    /// Add a script to fire with the analytics bundle. If the bundle has
    /// already run, the script is loaded right away.
    pub fn register_script(&self, id: &str, url: &str) {
        self.inner.loader.register(id, url, Vec::new());
        if self.inner.bundle.is_loaded() {
            self.inner.loader.load_registered(id);
        }
    }

    pub fn remove_script(&self, id: &str) -> bool {
        self.inner.loader.remove(id)
    }

    // ---------------------------------------------------------------
    // Gates
    // ---------------------------------------------------------------

    /// Place a wrapped fragment on the page and evaluate it immediately.
    pub fn mount(&self, fragment: WrappedFragment) -> Arc<ContentGate> {
        let gate = Arc::new(ContentGate::new(fragment));
        gate.mount(&self.inner.document);
        self.inner.gates.write().push(gate.clone());
        gate.evaluate(&self.inner.oracle, &self.inner.document);
        gate
    }

    pub fn gate(&self, wrapper_id: &str) -> Option<Arc<ContentGate>> {
        self.inner
            .gates
            .read()
            .iter()
            .find(|g| g.wrapper_id() == wrapper_id)
            .cloned()
    }

    /// A button on a gate's overlay was pressed.
    pub fn click(&self, wrapper_id: &str, action: GateAction) -> Option<GateState> {
        let gate = self.gate(wrapper_id)?;
        match action {
            GateAction::AcceptContentType if !gate.content_type().is_empty() => {
                self.accept_content_type(gate.content_type());
            }
            _ => {
                self.accept_all(false);
            }
        }
        Some(gate.evaluate(&self.inner.oracle, &self.inner.document))
    }

    // ---------------------------------------------------------------
    // Visitor decisions and host signals
    // ---------------------------------------------------------------

    /// "Allow" on the banner. Scripts are injected before the banner hides.
    /// Returns `reload` so the host knows to reload the page.
    pub fn accept_all(&self, reload: bool) -> bool {
        self.inner.oracle.set_all(true);
        self.inner.recheck_analytics();
        self.inner.evaluate_gates(|_| true);
        self.inner.hide_banner();
        self.inner.document.remove_class(BODY_ID, CLASS_DECLINED);
        self.inner.add_body_class(CLASS_ACCEPTED);
        reload
    }

    /// "Decline" on the banner. Already revealed content stays revealed.
    pub fn decline_all(&self) {
        self.inner.oracle.set_all(false);
        self.inner.hide_banner();
    }

    pub fn accept_content_type(&self, content_type: &str) {
        self.inner.oracle.accept_content_type(content_type);
    }

    /// Forward a change announced by the host consent platform.
    pub fn external_consent_changed(&self, category: ConsentCategory, granted: bool) {
        self.inner
            .bus
            .publish(ConsentEvent::ExternalConsentChanged { category, granted });
    }

    /// Window `load`: re-check everything that may have become possible.
    pub fn window_loaded(&self) {
        self.inner.recheck_analytics();
        if self.inner.oracle.has_consent(ConsentCategory::Marketing)
            || self.inner.oracle.local_decision() == Some(true)
        {
            self.inner.bundle.activate_secondary();
        }
        self.inner.evaluate_gates(|_| true);
    }

    pub fn report(&self) -> PageReport {
        let inner = &self.inner;
        PageReport {
            records: ConsentCategory::all()
                .iter()
                .map(|c| inner.oracle.record(*c))
                .collect(),
            external_api: inner.oracle.uses_external_api(),
            autoload_analytics: inner.should_autoload_analytics(),
            banner_visible: inner.banner_visible(),
            body_classes: inner
                .document
                .node(BODY_ID)
                .map(|n| n.classes)
                .unwrap_or_default(),
            head_scripts: inner
                .document
                .head()
                .iter()
                .filter_map(|e| e.id().map(String::from))
                .collect(),
            gates: inner
                .gates
                .read()
                .iter()
                .map(|g| GateReport {
                    wrapper_id: g.wrapper_id().to_string(),
                    content_type: g.content_type().to_string(),
                    category: g.category(),
                    state: g.state(),
                })
                .collect(),
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.inner.bus.unsubscribe(self.subscription);
    }
}

impl PageInner {
    fn should_autoload_analytics(&self) -> bool {
        self.oracle.has_consent(ConsentCategory::Statistics)
    }

    fn banner_visible(&self) -> bool {
        !self.document.has_class(BANNER_ID, CLASS_HIDDEN)
    }

    fn hide_banner(&self) {
        self.document.add_class(BANNER_ID, CLASS_HIDDEN);
    }

    /// Add a body class; an actual change is the legacy re-check signal.
    fn add_body_class(&self, class: &str) {
        if self.document.add_class(BODY_ID, class) {
            self.bus.publish(ConsentEvent::HostClassChanged);
        }
    }

    fn recheck_analytics(&self) {
        if self.should_autoload_analytics() {
            self.bundle.load();
        }
    }

    fn evaluate_gates<F>(&self, relevant: F)
    where
        F: Fn(&ContentGate) -> bool,
    {
        let gates: Vec<Arc<ContentGate>> = self.gates.read().clone();
        for gate in gates {
            if relevant(gate.as_ref()) {
                gate.evaluate(&self.oracle, &self.document);
            }
        }
    }

    fn handle_event(&self, event: &ConsentEvent) {
        debug!("Page: handling {:?}", event);
        match event {
            ConsentEvent::GlobalCookiesAccepted => self.recheck_analytics(),
            ConsentEvent::ExternalConsentChanged {
                category: ConsentCategory::Statistics,
                granted: true,
            } => self.recheck_analytics(),
            ConsentEvent::ExternalConsentChanged { granted: false, category } => {
                warn!(
                    "Page: {} revoked; injected scripts and revealed content remain",
                    category
                );
            }
            _ => {}
        }
        self.evaluate_gates(|gate| gate.is_affected_by(event));
    }
}
