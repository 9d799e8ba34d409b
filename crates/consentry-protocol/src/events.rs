//! Consent change notifications: a single in-process bus per page.
//!
//! Handlers may publish further events while they run (setting a cookie
//! from inside a handler, for example). Those events are queued and drained
//! by the outermost `publish` call, so dispatch never recurses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use crate::category::ConsentCategory;

/// Upper bound on events handled by one drain.
pub const MAX_EVENTS_PER_DRAIN: usize = 1024;

/// A consent transition or re-evaluation trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConsentEvent {
    /// The visitor accepted all cookies locally.
    GlobalCookiesAccepted,
    /// The visitor declined locally. Nothing re-hides on this.
    GlobalCookiesDeclined,
    /// The visitor accepted one content type.
    #[serde(rename_all = "camelCase")]
    ContentTypeAccepted { content_type: String },
    /// The host consent platform changed a category.
    ExternalConsentChanged {
        category: ConsentCategory,
        granted: bool,
    },
    /// Body class list changed; legacy trigger for a full re-check.
    HostClassChanged,
}

impl ConsentEvent {
    /// Name of the DOM custom event page scripts listen for.
    pub fn dom_name(&self) -> Option<&'static str> {
        match self {
            Self::GlobalCookiesAccepted => Some("wpcaCookiesAccepted"),
            Self::GlobalCookiesDeclined => Some("wpcaCookiesDeclined"),
            Self::ContentTypeAccepted { .. } => Some("wpcaContentTypeAccepted"),
            Self::ExternalConsentChanged { .. } => Some("wp_listen_for_consent_change"),
            Self::HostClassChanged => None,
        }
    }

    /// The `detail` payload of the DOM custom event.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            Self::ContentTypeAccepted { content_type } => {
                serde_json::json!({ "contentType": content_type })
            }
            Self::ExternalConsentChanged { category, granted } => {
                serde_json::json!({ "category": category, "granted": granted })
            }
            _ => serde_json::json!({}),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&ConsentEvent) + Send + Sync>;

/// Document-scoped publish/subscribe.
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Handler)>>,
    queue: Mutex<VecDeque<ConsentEvent>>,
    dispatching: AtomicBool,
    next_id: AtomicU64,
    delivered: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            delivered: AtomicU64::new(0),
        }
    }

    /// Register a handler; it receives every event published afterwards.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConsentEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total events handed to subscribers so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Publish an event. Synchronous: returns after every handler ran,
    /// unless a dispatch is already in progress, in which case the event is
    /// queued behind it.
    pub fn publish(&self, event: ConsentEvent) {
        self.queue.lock().push_back(event);
        if self.dispatching.swap(true, Ordering::AcqRel) {
            return;
        }
        let _dispatch = DispatchGuard(&self.dispatching);

        let mut handled = 0usize;
        loop {
            let Some(event) = self.queue.lock().pop_front() else {
                break;
            };
            if handled == MAX_EVENTS_PER_DRAIN {
                let dropped = self.queue.lock().len() + 1;
                self.queue.lock().clear();
                warn!("EventBus: drain limit reached, dropping {} events", dropped);
                break;
            }
            handled += 1;

            let handlers: Vec<Handler> = self
                .subscribers
                .read()
                .iter()
                .map(|(_, h)| h.clone())
                .collect();
            debug!("EventBus: {:?} -> {} subscribers", event, handlers.len());
            for handler in handlers {
                handler(&event);
            }
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Clears the dispatching flag even if a handler panics.
struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
