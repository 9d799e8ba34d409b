//! Consent oracle: one answer to "may category C run right now?".
//!
//! Three signal sources exist: the host consent platform, the site's own
//! cookies and the jurisdiction/bot heuristic. The chain is chosen once when
//! the oracle is built. With a usable host API only the API is consulted;
//! otherwise cookies are asked first and the heuristic fills in whatever
//! they leave unset.

use std::sync::Arc;

use consentry_core::{ConsentryConfig, CookieStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{self, HostConsentApi};
use crate::category::{sanitize_key, CategoryMapper, ConsentCategory};
use crate::events::{ConsentEvent, EventBus};
use crate::heuristic::VisitorProfile;

/// Cookie value recording acceptance of a single content type.
pub const CONTENT_ACCEPTED: &str = "accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    Allowed,
    Denied,
    Unset,
}

impl ConsentState {
    pub fn from_bool(granted: bool) -> Self {
        if granted {
            Self::Allowed
        } else {
            Self::Denied
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    ExternalApi,
    LocalCookie,
    Heuristic,
}

/// The decision for one category and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsentRecord {
    pub category: ConsentCategory,
    pub state: ConsentState,
    pub source: SourceKind,
}

impl ConsentRecord {
    pub fn allowed(&self) -> bool {
        self.state == ConsentState::Allowed
    }
}

/// One signal source in the resolution chain.
pub trait ConsentSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn state(&self, category: ConsentCategory) -> ConsentState;
}

/// Delegates to the host consent platform. Never memoizes.
pub struct ApiSource {
    api: Arc<dyn HostConsentApi>,
}

impl ConsentSource for ApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ExternalApi
    }

    fn state(&self, category: ConsentCategory) -> ConsentState {
        match self.api.has_consent(category) {
            Ok(granted) => ConsentState::from_bool(granted),
            Err(e) => {
                warn!("ApiSource: query for {} failed, treating as denied: {}", category, e);
                ConsentState::Denied
            }
        }
    }
}

/// The site's own blanket yes/no cookie.
pub struct CookieSource {
    cookies: Arc<CookieStore>,
    cookie_name: String,
}

impl CookieSource {
    /// Blanket decision, if the visitor made one.
    pub fn decision(&self) -> Option<bool> {
        match self.cookies.get(&self.cookie_name).as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }
}

impl ConsentSource for CookieSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalCookie
    }

    fn state(&self, _category: ConsentCategory) -> ConsentState {
        match self.decision() {
            Some(granted) => ConsentState::from_bool(granted),
            None => ConsentState::Unset,
        }
    }
}

/// Jurisdiction/bot default. Always decides.
pub struct HeuristicSource {
    visitor: VisitorProfile,
}

impl ConsentSource for HeuristicSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Heuristic
    }

    fn state(&self, _category: ConsentCategory) -> ConsentState {
        ConsentState::from_bool(self.visitor.default_grants())
    }
}

/// Resolves consent for the page and records new decisions.
pub struct ConsentOracle {
    api: Option<Arc<dyn HostConsentApi>>,
    chain: Vec<Box<dyn ConsentSource>>,
    cookie_source: CookieSource,
    config: ConsentryConfig,
    bus: Arc<EventBus>,
}

impl ConsentOracle {
    /// Build the oracle, selecting the source chain once.
    pub fn new(
        config: ConsentryConfig,
        cookies: Arc<CookieStore>,
        visitor: VisitorProfile,
        host_api: Option<Arc<dyn HostConsentApi>>,
        bus: Arc<EventBus>,
    ) -> Self {
        let api = host_api.and_then(|api| match api::detect(api.as_ref()) {
            Ok(()) => Some(api),
            Err(e) => {
                warn!("ConsentOracle: ignoring host consent API: {}", e);
                None
            }
        });

        let cookie_source = CookieSource {
            cookies: cookies.clone(),
            cookie_name: config.cookie_name.clone(),
        };
        let chain: Vec<Box<dyn ConsentSource>> = match &api {
            Some(api) => vec![Box::new(ApiSource { api: api.clone() })],
            None => vec![
                Box::new(CookieSource {
                    cookies,
                    cookie_name: config.cookie_name.clone(),
                }),
                Box::new(HeuristicSource { visitor }),
            ],
        };

        info!(
            "ConsentOracle initialized: sources={:?}",
            chain.iter().map(|s| s.kind()).collect::<Vec<_>>()
        );

        Self {
            api,
            chain,
            cookie_source,
            config,
            bus,
        }
    }

    pub fn uses_external_api(&self) -> bool {
        self.api.is_some()
    }

    pub fn config(&self) -> &ConsentryConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Decision for a category, with the source that made it.
    pub fn record(&self, category: ConsentCategory) -> ConsentRecord {
        let mut last = ConsentRecord {
            category,
            state: ConsentState::Unset,
            source: SourceKind::Heuristic,
        };
        for source in &self.chain {
            let state = source.state(category);
            last = ConsentRecord {
                category,
                state,
                source: source.kind(),
            };
            if state != ConsentState::Unset {
                break;
            }
        }
        last
    }

    pub fn has_consent(&self, category: ConsentCategory) -> bool {
        self.record(category).allowed()
    }

    /// Whether content of this type may be shown. A per-type acceptance
    /// cookie wins over the blanket decision for that type.
    pub fn content_allowed(&self, content_type: &str) -> bool {
        if self.api.is_none() && self.content_type_accepted(content_type) {
            return true;
        }
        self.has_consent(CategoryMapper::map(content_type))
    }

    /// Whether the visitor accepted exactly this content type locally.
    pub fn content_type_accepted(&self, content_type: &str) -> bool {
        let key = sanitize_key(content_type);
        if key.is_empty() {
            return false;
        }
        self.cookie_source
            .cookies
            .get(&self.config.content_cookie_name(&key))
            .as_deref()
            == Some(CONTENT_ACCEPTED)
    }

    /// The blanket cookie decision, ignoring API and heuristic.
    pub fn local_decision(&self) -> Option<bool> {
        self.cookie_source.decision()
    }

    // ---------------------------------------------------------------
    // Decisions
    // ---------------------------------------------------------------

    /// Record a decision for one category.
    ///
    /// With a host API this is fire-and-forget: the platform announces the
    /// change. Locally the blanket cookie is written and the matching event
    /// published after the write.
    pub fn set_consent(&self, category: ConsentCategory, granted: bool) {
        match &self.api {
            Some(api) => {
                if let Err(e) = api.set_consent(category, granted) {
                    warn!("ConsentOracle: host refused {}={}: {}", category, granted, e);
                }
            }
            None => self.write_blanket(granted),
        }
    }

    /// Accept or decline every category at once.
    pub fn set_all(&self, granted: bool) {
        match &self.api {
            Some(_) => {
                for category in ConsentCategory::all() {
                    self.set_consent(*category, granted);
                }
            }
            None => self.write_blanket(granted),
        }
    }

    /// Accept one content type.
    pub fn accept_content_type(&self, content_type: &str) {
        if self.api.is_some() {
            self.set_consent(CategoryMapper::map(content_type), true);
            return;
        }
        let key = sanitize_key(content_type);
        if key.is_empty() {
            warn!("ConsentOracle: content type {:?} has no usable key", content_type);
            return;
        }
        self.cookie_source.cookies.set(
            &self.config.content_cookie_name(&key),
            CONTENT_ACCEPTED,
            self.config.acceptance_save_duration_days,
        );
        info!("ConsentOracle: content type accepted: {}", key);
        self.bus
            .publish(ConsentEvent::ContentTypeAccepted { content_type: key });
    }

    fn write_blanket(&self, granted: bool) {
        let days = if granted {
            self.config.acceptance_save_duration_days
        } else {
            self.config.acceptance_decline_duration_days
        };
        self.cookie_source.cookies.set(
            &self.config.cookie_name,
            if granted { "true" } else { "false" },
            days,
        );
        info!("ConsentOracle: local consent {}", if granted { "granted" } else { "declined" });
        self.bus.publish(if granted {
            ConsentEvent::GlobalCookiesAccepted
        } else {
            ConsentEvent::GlobalCookiesDeclined
        });
    }
}
