//! Consent protocol: categories, heuristic default, change events and the
//! consent oracle.
//!
//! The oracle unifies an optional host consent platform, the site's own
//! cookies and a jurisdiction/bot heuristic behind one query, and announces
//! every local decision on the page's [`EventBus`].

pub mod api;
pub mod category;
pub mod consent;
pub mod events;
pub mod heuristic;

pub use api::{HostConsentApi, HostFunctions, InMemoryConsentApi};
pub use category::{CategoryMapper, ConsentCategory};
pub use consent::{ConsentOracle, ConsentRecord, ConsentSource, ConsentState, SourceKind};
pub use events::{ConsentEvent, EventBus, SubscriptionId};
pub use heuristic::VisitorProfile;
