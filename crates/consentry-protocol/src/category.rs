//! Consent categories and the content-category mapping.

use serde::{Deserialize, Serialize};

/// The closed set of consent categories understood by consent platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentCategory {
    Statistics,
    Marketing,
    Functional,
    Preferences,
}

impl ConsentCategory {
    pub fn all() -> &'static [ConsentCategory] {
        &[
            Self::Statistics,
            Self::Marketing,
            Self::Functional,
            Self::Preferences,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Statistics => "statistics",
            Self::Marketing => "marketing",
            Self::Functional => "functional",
            Self::Preferences => "preferences",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "statistics" => Some(Self::Statistics),
            "marketing" => Some(Self::Marketing),
            "functional" => Some(Self::Functional),
            "preferences" => Some(Self::Preferences),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Content types offered to authors when wrapping third-party content.
pub const CONTENT_TYPES: &[&str] = &[
    "general",
    "analytics",
    "marketing",
    "social-media",
    "video",
    "maps",
    "custom",
];

/// Prefix for operator-defined content types.
pub const CUSTOM_PREFIX: &str = "custom:";

/// Maps free-form content-category ids onto consent categories.
///
/// Total: every string maps to something, unknown ids fall back to
/// [`ConsentCategory::Functional`].
pub struct CategoryMapper;

impl CategoryMapper {
    pub fn map(content_type: &str) -> ConsentCategory {
        let id = content_type.trim().to_lowercase();
        if id.starts_with(CUSTOM_PREFIX) {
            return ConsentCategory::Preferences;
        }
        match id.as_str() {
            "analytics" => ConsentCategory::Statistics,
            "marketing" | "social-media" | "video" => ConsentCategory::Marketing,
            "maps" | "general" => ConsentCategory::Functional,
            "custom" => ConsentCategory::Preferences,
            _ => ConsentCategory::Functional,
        }
    }
}

/// Reduce an identifier to lowercase `[a-z0-9_-]`, as the block renderer
/// does for operator-supplied identifiers.
pub fn sanitize_key(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_table() {
        assert_eq!(CategoryMapper::map("analytics"), ConsentCategory::Statistics);
        assert_eq!(CategoryMapper::map("marketing"), ConsentCategory::Marketing);
        assert_eq!(CategoryMapper::map("social-media"), ConsentCategory::Marketing);
        assert_eq!(CategoryMapper::map("video"), ConsentCategory::Marketing);
        assert_eq!(CategoryMapper::map("maps"), ConsentCategory::Functional);
        assert_eq!(CategoryMapper::map("general"), ConsentCategory::Functional);
        assert_eq!(CategoryMapper::map("custom"), ConsentCategory::Preferences);
    }

    #[test]
    fn test_mapping_is_total() {
        for id in ["", "podcast", "  Video ", "custom:newsletter", "ÜBER", "analytics2"] {
            let _ = CategoryMapper::map(id);
        }
        assert_eq!(CategoryMapper::map("podcast"), ConsentCategory::Functional);
        assert_eq!(CategoryMapper::map("  Video "), ConsentCategory::Marketing);
        assert_eq!(CategoryMapper::map("custom:newsletter"), ConsentCategory::Preferences);
    }

    #[test]
    fn test_every_editor_type_is_mapped() {
        for id in CONTENT_TYPES {
            assert!(ConsentCategory::all().contains(&CategoryMapper::map(id)));
        }
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("My Podcast!"), "mypodcast");
        assert_eq!(sanitize_key("news_letter-2"), "news_letter-2");
    }

    #[test]
    fn test_category_names_round_trip() {
        for category in ConsentCategory::all() {
            assert_eq!(ConsentCategory::from_name(category.name()), Some(*category));
        }
        assert_eq!(ConsentCategory::from_name("unknown"), None);
    }
}
