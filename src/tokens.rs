//! Closed string-token enums and comma-separated tag sets.
//!
//! Every status, priority, role and type value travels as a lowercase token
//! on the command line and in the stored records. `token_enum!` keeps the
//! token table for each enum in one place.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoordinationError;

/// A token that is not one of the accepted values of an enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} {value:?} (expected one of: {expected})")]
pub struct ParseTokenError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

impl From<ParseTokenError> for CoordinationError {
    fn from(err: ParseTokenError) -> Self {
        CoordinationError::InvalidInput(err.to_string())
    }
}

macro_rules! token_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($label:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $token)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $token ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::tokens::ParseTokenError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase();
                $(
                    if wanted == $token {
                        return Ok($name::$variant);
                    }
                )+
                Err($crate::tokens::ParseTokenError {
                    kind: $label,
                    value: s.to_string(),
                    expected: [$($token),+].join(", "),
                })
            }
        }
    };
}

pub(crate) use token_enum;

/// Case-insensitive set of labels such as tags and capabilities.
///
/// Values are trimmed and lowercased on the way in. On disk the set is a
/// single comma-separated string, which is what external directory scanners
/// split on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list, dropping empty entries.
    pub fn parse(raw: &str) -> Self {
        raw.split(',').map(str::to_string).collect()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(&value.trim().to_lowercase())
    }

    pub fn insert(&mut self, value: &str) -> bool {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        self.0.insert(normalized)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for value in iter {
            set.insert(value.as_ref());
        }
        set
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        f.write_str(&joined)
    }
}

impl FromStr for TagSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TagSet::parse(s))
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|r| TagSet::parse(&r)).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    token_enum! {
        pub enum Flavor ("flavor") {
            Sweet => "sweet",
            Sour => "sour",
        }
    }

    #[test]
    fn test_token_enum_parses_case_insensitively() {
        assert_eq!(" SOUR ".parse::<Flavor>().unwrap(), Flavor::Sour);
        assert_eq!(Flavor::Sweet.to_string(), "sweet");
        let err = "bitter".parse::<Flavor>().unwrap_err();
        assert_eq!(err.expected, "sweet, sour");
    }

    #[test]
    fn test_tag_set_normalizes_and_dedupes() {
        let tags = TagSet::parse(" Frontend,react,,FRONTEND ");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("frontend"));
        assert!(tags.contains("React"));
        assert_eq!(tags.to_string(), "frontend,react");
    }

    #[test]
    fn test_tag_set_is_stored_as_comma_string() {
        let tags = TagSet::parse("python,rust");
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, "\"python,rust\"");
        let back: TagSet = serde_json::from_str("null").unwrap();
        assert!(back.is_empty());
    }
}
