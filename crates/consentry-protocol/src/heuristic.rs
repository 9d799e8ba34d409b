//! Jurisdiction and bot heuristic used when nobody has decided yet.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Time zones of EU/EEA members (plus Switzerland) where opt-in applies.
pub const EU_TIMEZONES: &[&str] = &[
    "Europe/Vienna",
    "Europe/Brussels",
    "Europe/Sofia",
    "Europe/Zagreb",
    "Asia/Famagusta",
    "Asia/Nicosia",
    "Europe/Prague",
    "Europe/Copenhagen",
    "Europe/Tallinn",
    "Europe/Helsinki",
    "Europe/Paris",
    "Europe/Berlin",
    "Europe/Zurich",
    "Europe/Bern",
    "Europe/Busingen",
    "Europe/Athens",
    "Europe/Budapest",
    "Europe/Dublin",
    "Europe/Rome",
    "Europe/Riga",
    "Europe/Vilnius",
    "Europe/Luxembourg",
    "Europe/Malta",
    "Europe/Amsterdam",
    "Europe/Warsaw",
    "Atlantic/Azores",
    "Atlantic/Madeira",
    "Europe/Lisbon",
    "Europe/Bucharest",
    "Europe/Bratislava",
    "Europe/Ljubljana",
    "Africa/Ceuta",
    "Atlantic/Canary",
    "Europe/Madrid",
    "Europe/Stockholm",
];

static BOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)bot|crawler|spider|crawling").unwrap());

/// What the page knows about the visitor without asking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorProfile {
    /// IANA zone resolved by the browser, e.g. `Europe/Berlin`.
    pub time_zone: String,
    pub user_agent: String,
}

impl VisitorProfile {
    pub fn new(time_zone: &str, user_agent: &str) -> Self {
        Self {
            time_zone: time_zone.to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    /// An unresolved zone counts as EU so the default stays on the safe side.
    pub fn in_eu(&self) -> bool {
        let zone = self.time_zone.trim();
        zone.is_empty() || EU_TIMEZONES.contains(&zone)
    }

    pub fn is_bot(&self) -> bool {
        BOT_RE.is_match(&self.user_agent)
    }

    /// Default decision: granted outside the EU and for crawlers.
    pub fn default_grants(&self) -> bool {
        !self.in_eu() || self.is_bot()
    }
}
