//! Consentry Core: errors, configuration, cookie store, page document.

pub mod config;
pub mod cookies;
pub mod document;
pub mod error;

pub use config::{ConsentryConfig, ScriptEntry};
pub use cookies::{Cookie, CookieStore};
pub use document::{Document, Element};
pub use error::{Error, Result};
