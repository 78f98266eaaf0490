//! Identifier types for Strata
//!
//! Instance GUIDs are caller-visible strings (re-identify accepts a GUID
//! chosen by the caller), so both identifiers wrap a `String`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique identifier of an entity or relationship
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Guid(String);

impl Guid {
    /// Generate a new random GUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the GUID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the GUID is empty or only whitespace
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Guid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Guid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.0)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a metadata collection (the "home" of an instance)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    /// Create a collection id from any string-like value
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generate a random collection id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self.0)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_creation() {
        let id1 = Guid::new();
        let id2 = Guid::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_blank());
    }

    #[test]
    fn test_guid_from_str() {
        let id = Guid::from("e1");
        assert_eq!(id.as_str(), "e1");
        assert_eq!(id.to_string(), "e1");
        assert!(Guid::from("  ").is_blank());
    }

    #[test]
    fn test_collection_id() {
        let a = CollectionId::new("local");
        let b: CollectionId = "local".into();
        assert_eq!(a, b);
        assert_ne!(a, CollectionId::generate());
    }
}
