//! Three-valued lookup result
//!
//! Distinguishes "found", "known only as a proxy" and "not known" so that
//! callers match on the outcome instead of catching errors.

use crate::error::{Error, Result};
use crate::instance::{Entity, EntityProxy, Instance, Record, Relationship};

/// Outcome of reading an entity-like record
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// A full record was found
    Found(T),
    /// Only a proxy is stored for this GUID
    ProxyOnly(EntityProxy),
    /// Nothing is stored for this GUID
    NotFound,
}

impl<T> Lookup<T> {
    /// Returns true for `Found`
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Returns true for `Found` or `ProxyOnly`
    pub fn is_known(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }

    /// The full record, if any
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Map the full record, keeping the other outcomes
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::ProxyOnly(proxy) => Lookup::ProxyOnly(proxy),
            Lookup::NotFound => Lookup::NotFound,
        }
    }

    /// Require a full record, turning the other outcomes into errors
    pub fn require(self, what: &str) -> Result<T> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::ProxyOnly(_) => Err(Error::ProxyOnly(what.to_string())),
            Lookup::NotFound => Err(Error::NotKnown(what.to_string())),
        }
    }
}

impl Lookup<Entity> {
    /// Classify an optional record read for an entity GUID
    pub fn from_record(record: Option<Record>) -> Self {
        match record {
            Some(Record::Entity(entity)) => Lookup::Found(entity),
            Some(Record::Proxy(proxy)) => Lookup::ProxyOnly(proxy),
            Some(Record::Relationship(_)) | None => Lookup::NotFound,
        }
    }

    /// The entity as a proxy, whichever form was found
    pub fn into_proxy<'a, I>(self, unique_properties: I) -> Option<EntityProxy>
    where
        I: IntoIterator<Item = &'a String>,
    {
        match self {
            Lookup::Found(entity) => Some(entity.to_proxy(unique_properties)),
            Lookup::ProxyOnly(proxy) => Some(proxy),
            Lookup::NotFound => None,
        }
    }

    /// Header status check that works for both full entities and proxies
    pub fn is_deleted(&self) -> bool {
        match self {
            Lookup::Found(entity) => entity.header().is_deleted(),
            Lookup::ProxyOnly(proxy) => proxy.header.is_deleted(),
            Lookup::NotFound => false,
        }
    }
}

impl Lookup<Relationship> {
    /// Classify an optional record read for a relationship GUID
    pub fn from_record(record: Option<Record>) -> Self {
        match record {
            Some(Record::Relationship(rel)) => Lookup::Found(rel),
            _ => Lookup::NotFound,
        }
    }
}
