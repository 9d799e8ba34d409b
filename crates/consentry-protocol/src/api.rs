//! Host consent platform surface (WP Consent API style).
//!
//! A host may advertise a consent API but only ship part of it. Detection
//! happens once at page start: anything short of the full query/set/listen
//! surface is treated as no API at all.

use std::collections::HashMap;
use std::sync::Arc;

use consentry_core::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;

use crate::category::ConsentCategory;
use crate::events::{ConsentEvent, EventBus};

/// Which host functions are actually present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostFunctions {
    pub has_consent: bool,
    pub set_consent: bool,
    pub listen: bool,
}

impl HostFunctions {
    pub const ALL: HostFunctions = HostFunctions {
        has_consent: true,
        set_consent: true,
        listen: true,
    };

    /// First missing function, by its host name.
    pub fn first_missing(&self) -> Option<&'static str> {
        if !self.has_consent {
            Some("wp_has_consent")
        } else if !self.set_consent {
            Some("wp_set_consent")
        } else if !self.listen {
            Some("wp_listen_for_consent_change")
        } else {
            None
        }
    }
}

/// An external consent platform.
pub trait HostConsentApi: Send + Sync {
    fn functions(&self) -> HostFunctions;

    /// Current decision for a category. `Ok(false)` when undecided.
    fn has_consent(&self, category: ConsentCategory) -> Result<bool>;

    /// Record a decision. The platform announces the change itself.
    fn set_consent(&self, category: ConsentCategory, granted: bool) -> Result<()>;
}

/// Verify the host API is complete enough to be authoritative.
pub fn detect(api: &dyn HostConsentApi) -> Result<()> {
    match api.functions().first_missing() {
        Some(name) => Err(Error::MissingHostApi(name.to_string())),
        None => Ok(()),
    }
}

/// In-process consent platform, used by tests and the CLI.
pub struct InMemoryConsentApi {
    functions: HostFunctions,
    decisions: RwLock<HashMap<ConsentCategory, bool>>,
    bus: Option<Arc<EventBus>>,
}

impl InMemoryConsentApi {
    pub fn new() -> Self {
        Self {
            functions: HostFunctions::ALL,
            decisions: RwLock::new(HashMap::new()),
            bus: None,
        }
    }

    /// Announce changes on this bus, like `wp_listen_for_consent_change`.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_functions(mut self, functions: HostFunctions) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_decision(self, category: ConsentCategory, granted: bool) -> Self {
        self.decisions.write().insert(category, granted);
        self
    }

    pub fn decision(&self, category: ConsentCategory) -> Option<bool> {
        self.decisions.read().get(&category).copied()
    }
}

impl Default for InMemoryConsentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl HostConsentApi for InMemoryConsentApi {
    fn functions(&self) -> HostFunctions {
        self.functions
    }

    fn has_consent(&self, category: ConsentCategory) -> Result<bool> {
        if !self.functions.has_consent {
            return Err(Error::MissingHostApi("wp_has_consent".into()));
        }
        Ok(self.decision(category).unwrap_or(false))
    }

    fn set_consent(&self, category: ConsentCategory, granted: bool) -> Result<()> {
        if !self.functions.set_consent {
            return Err(Error::MissingHostApi("wp_set_consent".into()));
        }
        let changed = self.decisions.write().insert(category, granted) != Some(granted);
        if changed {
            if let Some(bus) = &self.bus {
                bus.publish(ConsentEvent::ExternalConsentChanged { category, granted });
            }
        }
        Ok(())
    }
}
