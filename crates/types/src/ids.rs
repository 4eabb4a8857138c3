//! Newtype wrappers for question, local and global identifiers
//!
//! These keep fragment-scoped ids and document-scoped ids from being mixed
//! up while they flow through a merge session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::Arc;

/// An opaque identifier of a question fragment in the fragment store
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(Arc<str>);

impl QuestionId {
    /// Creates a new QuestionId from a string
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this question ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for QuestionId {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&str> for QuestionId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl AsRef<str> for QuestionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An identifier that is only meaningful inside one fragment
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Arc<str>);

impl LocalId {
    /// Creates a new LocalId from a string
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this local ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the local ID as a numeric definition id.
    pub fn as_number(&self) -> Option<u32> {
        self.0.trim().parse().ok()
    }
}

impl From<String> for LocalId {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&str> for LocalId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<u32> for LocalId {
    fn from(n: u32) -> Self {
        Self(n.to_string().into())
    }
}

impl AsRef<str> for LocalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A renumbered identifier, unique within its category in the output document
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalId(u32);

impl GlobalId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u32> for GlobalId {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl FromStr for GlobalId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_equality_and_display() {
        let a = QuestionId::new("Q-17");
        let b = QuestionId::from("Q-17");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Q-17");
    }

    #[test]
    fn local_id_numeric_view() {
        assert_eq!(LocalId::from("12").as_number(), Some(12));
        assert_eq!(LocalId::from(" 7 ").as_number(), Some(7));
        assert_eq!(LocalId::from("BIN0001").as_number(), None);
    }

    #[test]
    fn global_id_parses_and_advances() {
        let id: GlobalId = "41".parse().unwrap();
        assert_eq!(id.get(), 41);
        assert_eq!(id.next(), GlobalId::new(42));
        assert!("x".parse::<GlobalId>().is_err());
    }
}
