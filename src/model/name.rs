//! Normalized package names.
//!
//! Normalization lowercases and collapses every run of `-`, `_` and `.` into
//! a single `-`. Distinct spellings may collide (`Foo_Bar` and `foo.bar`);
//! that is accepted.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::{Error, Result};

/// Longest name accepted from callers.
pub const MAX_NAME_LEN: usize = 214;

/// A normalized, case-insensitive package identifier.
///
/// Cloning is a refcount bump; shards hold hundreds of thousands of these.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(Arc<str>);

#[inline]
fn is_separator(ch: char) -> bool {
    matches!(ch, '-' | '_' | '.')
}

/// Lowercase and collapse separator runs. Idempotent.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator = false;
    for ch in raw.trim().chars() {
        if is_separator(ch) {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            in_separator = false;
            out.extend(ch.to_lowercase());
        }
    }
    out
}

impl PackageName {
    /// Validate and normalize a caller-supplied name.
    ///
    /// Rejects empty names, names over [`MAX_NAME_LEN`], characters outside
    /// ASCII alphanumerics and separators, and names that begin or end with
    /// a separator.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("package name is empty".into()));
        }
        if trimmed.len() > MAX_NAME_LEN {
            return Err(Error::InvalidInput(format!(
                "package name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_alphanumeric() && !is_separator(*c)) {
            return Err(Error::InvalidInput(format!(
                "package name '{trimmed}' contains invalid character {bad:?}"
            )));
        }
        let starts_ok = trimmed.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
        let ends_ok = trimmed.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
        if !starts_ok || !ends_ok {
            return Err(Error::InvalidInput(format!(
                "package name '{trimmed}' must start and end with a letter or digit"
            )));
        }
        Ok(Self(normalize(trimmed).into()))
    }

    /// Lenient normalization for names read from index records and data
    /// sources. Returns `None` only when nothing survives normalization.
    pub fn normalized(raw: &str) -> Option<Self> {
        let norm = normalize(raw);
        let meaningful = norm.chars().any(|c| !is_separator(c));
        meaningful.then(|| Self(norm.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name tokens split on the canonical separator.
    pub fn tokens(&self) -> SmallVec<[&str; 4]> {
        self.0.split('-').filter(|t| !t.is_empty()).collect()
    }

    /// First character of the normalized name, if any.
    pub fn first_char(&self) -> Option<char> {
        self.0.chars().next()
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PackageName::normalized(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unusable package name '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize("Foo__Bar.-baz"), "foo-bar-baz");
        assert_eq!(normalize("  Django  "), "django");
        assert_eq!(normalize("zope.interface"), "zope-interface");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["A_B", "a--b", "X.Y_Z", "plain"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_spellings_collide() {
        let a = PackageName::parse("Foo_Bar").unwrap();
        let b = PackageName::parse("foo.bar").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(matches!(PackageName::parse(""), Err(Error::InvalidInput(_))));
        assert!(matches!(PackageName::parse("   "), Err(Error::InvalidInput(_))));
        assert!(matches!(PackageName::parse("-leading"), Err(Error::InvalidInput(_))));
        assert!(matches!(PackageName::parse("has space"), Err(Error::InvalidInput(_))));
        assert!(matches!(PackageName::parse(&"a".repeat(300)), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_normalized_is_lenient() {
        assert_eq!(PackageName::normalized("-odd-").unwrap().as_str(), "-odd-");
        assert!(PackageName::normalized("--").is_none());
        assert!(PackageName::normalized("").is_none());
    }

    #[test]
    fn test_tokens() {
        let name = PackageName::parse("flask-sqlalchemy_utils").unwrap();
        assert_eq!(name.tokens().as_slice(), &["flask", "sqlalchemy", "utils"]);
    }

    #[test]
    fn test_serde_roundtrip_normalizes() {
        let name: PackageName = serde_json::from_str("\"Requests_OAuthlib\"").unwrap();
        assert_eq!(name.as_str(), "requests-oauthlib");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"requests-oauthlib\"");
    }
}
