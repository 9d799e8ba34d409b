//! Consentry runtime: everything that acts on the page once consent is
//! known. Payload codec, fragment rendering, script loading, content gates
//! and the page context tying them to one document and event bus.

pub mod codec;
pub mod gate;
pub mod loader;
pub mod page;
pub mod render;

pub use gate::{ContentGate, GateAction, GateState};
pub use loader::{AnalyticsBundle, BundleReport, ScriptLoader, ScriptRegistration};
pub use page::{Page, PageReport};
pub use render::{FragmentAttributes, WrappedFragment};
