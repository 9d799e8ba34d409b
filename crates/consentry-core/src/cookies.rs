//! Cookie store: small name/value pairs with expiry, scoped to the
//! page's top-level domain.
//!
//! This is the only state that outlives a page view. Cookies are written
//! with `path=/` so a decision taken on one page applies site-wide.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound on cookie lifetime, roughly a century.
const MAX_COOKIE_DAYS: i64 = 36_500;

/// A single cookie. Session cookies (seeded from a header) have no expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    pub domain: String,
    pub path: String,
}

impl Cookie {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at > now).unwrap_or(true)
    }
}

/// Domain-scoped cookie jar with interior locking.
pub struct CookieStore {
    domain: String,
    cookies: RwLock<HashMap<String, Cookie>>,
}

impl CookieStore {
    /// Create an empty store for the given page host.
    pub fn for_host(host: &str) -> Self {
        Self {
            domain: top_level_domain(host),
            cookies: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a store from a `document.cookie`-style header (`a=b; c=d`).
    pub fn from_header(host: &str, header: &str) -> Result<Self> {
        let store = Self::for_host(host);
        {
            let mut cookies = store.cookies.write();
            for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| Error::Cookie(format!("missing '=' in {:?}", pair)))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::Cookie(format!("empty cookie name in {:?}", pair)));
                }
                cookies.insert(
                    name.to_string(),
                    Cookie {
                        name: name.to_string(),
                        value: decode_uri(value.trim()),
                        expires: None,
                        domain: store.domain.clone(),
                        path: "/".into(),
                    },
                );
            }
        }
        Ok(store)
    }

    /// Domain the cookies are scoped to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Current value of a cookie, `None` if absent or expired.
    pub fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .read()
            .get(name)
            .filter(|c| c.is_live(now))
            .map(|c| c.value.clone())
    }

    /// Write a cookie that expires `days` from now. `days <= 0` deletes it.
    pub fn set(&self, name: &str, value: &str, days: i64) -> Cookie {
        let cookie = Cookie {
            name: name.to_string(),
            value: value.to_string(),
            expires: Some(Utc::now() + Duration::days(days.clamp(-1, MAX_COOKIE_DAYS))),
            domain: self.domain.clone(),
            path: "/".into(),
        };
        debug!("CookieStore: set {}={} for {} days", name, value, days);
        self.cookies.write().insert(name.to_string(), cookie.clone());
        cookie
    }

    /// Full cookie record, including expired ones.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies.read().get(name).cloned()
    }

    /// Render the `Set-Cookie`-style string the browser would receive.
    pub fn set_cookie_string(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.read();
        let cookie = cookies.get(name)?;
        let mut out = format!("{}={}", cookie.name, cookie.value);
        if let Some(expires) = cookie.expires {
            out.push_str(&format!(
                ";expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        out.push_str(&format!(";path={}", cookie.path));
        Some(out)
    }

    /// Live cookies, sorted by name.
    pub fn list(&self) -> Vec<Cookie> {
        let now = Utc::now();
        let mut live: Vec<Cookie> = self
            .cookies
            .read()
            .values()
            .filter(|c| c.is_live(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        live
    }
}

/// Reduce a host to the domain cookies are scoped to.
fn top_level_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    if host.parse::<IpAddr>().is_ok() {
        return host;
    }
    let bare = host
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map(|(h, _)| h.to_string())
        .unwrap_or_else(|| host.clone());

    if bare.parse::<IpAddr>().is_ok() {
        return bare;
    }
    let labels: Vec<&str> = bare.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}

/// Percent-decode a cookie value. Invalid escapes are kept verbatim.
fn decode_uri(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
