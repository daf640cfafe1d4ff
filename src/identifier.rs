//! Bundle identifiers
//!
//! A raw name such as `"Django REST Framework"` becomes the storage key
//! `django-rest-framework`: every maximal run of `[a-z0-9]` in the lowercased
//! input, joined with `-`.

use crate::error::StoreError;
use serde::Serialize;
use std::fmt;

/// Shortest identifier the store accepts
pub const MIN_ID_LEN: usize = 2;

/// Normalize a raw name into canonical identifier form.
///
/// Never fails. The result may be shorter than [`MIN_ID_LEN`]; callers that
/// need a storable identifier go through [`BundleId::from_raw`].
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// A canonical, storable bundle identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    /// Normalize a user-supplied name and check its length.
    pub fn from_raw(raw: &str) -> Result<Self, StoreError> {
        let id = normalize(raw);
        if id.len() < MIN_ID_LEN {
            return Err(StoreError::Validation(format!(
                "bundle name {:?} is too short after normalization",
                raw
            )));
        }
        Ok(Self(id))
    }

    /// Accept an identifier only if it is already canonical.
    ///
    /// Used for identifiers taken from request paths and directory listings,
    /// where anything non-canonical cannot name a stored bundle.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() >= MIN_ID_LEN && normalize(s) == s {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard directory name
    pub fn shard(&self) -> &str {
        // canonical ids are ASCII and at least MIN_ID_LEN long
        &self.0[..MIN_ID_LEN]
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BundleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Django REST Framework"), "django-rest-framework");
        assert_eq!(normalize("  foo__bar..baz  "), "foo-bar-baz");
        assert_eq!(normalize("Py3K"), "py3k");
        assert_eq!(normalize("---"), "");
        assert_eq!(normalize("Ünïcode Docs"), "n-code-docs");
    }

    #[test]
    fn test_short_names_rejected() {
        assert!(normalize("A").len() < MIN_ID_LEN);
        assert!(matches!(
            BundleId::from_raw("A"),
            Err(StoreError::Validation(_))
        ));
        assert!(BundleId::from_raw("!!").is_err());
        assert_eq!(BundleId::from_raw("Ab").unwrap().as_str(), "ab");
    }

    #[test]
    fn test_parse_requires_canonical() {
        assert!(BundleId::parse("requests").is_some());
        assert!(BundleId::parse("django-rest-framework").is_some());
        assert!(BundleId::parse("Requests").is_none());
        assert!(BundleId::parse("a").is_none());
        assert!(BundleId::parse("../etc").is_none());
        assert!(BundleId::parse("foo-").is_none());
        assert!(BundleId::parse("foo--bar").is_none());
    }

    #[test]
    fn test_shard() {
        let id = BundleId::from_raw("Requests").unwrap();
        assert_eq!(id.shard(), "re");
        assert_eq!(BundleId::parse("ab").unwrap().shard(), "ab");
    }
}
