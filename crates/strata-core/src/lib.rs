//! Strata Core Library
//!
//! This crate provides the instance model, error handling, the version and
//! status engine, and the search predicate model shared by every Strata crate.
//!
//! # Overview
//!
//! Strata manages the lifecycle of metadata instances (entities, their
//! classifications, and the relationships between them) held in a bitemporal
//! store. Every mutation writes a new revision; prior revisions stay readable
//! through point-in-time reads.
//!
//! # Modules
//!
//! - `instance` - Entities, proxies, relationships, classifications
//! - `error` - Error taxonomy and result alias
//! - `id` - Instance and collection identifiers
//! - `temporal` - Valid time, transaction time, revisions
//! - `version` - Version numbering and status transitions
//! - `validation` - Stateless parameter validation
//! - `search` - Predicate trees, sequencing and paging

pub mod error;
pub mod id;
pub mod instance;
pub mod lookup;
pub mod property;
pub mod search;
pub mod temporal;
pub mod validation;
pub mod version;

pub use error::{Error, Result};
pub use id::{CollectionId, Guid};
pub use instance::{
    Classification, ClassificationOrigin, Entity, EntityProxy, Instance, InstanceGraph,
    InstanceHeader, InstanceStatus, InstanceType, Provenance, Record, RecordKind, Relationship,
};
pub use lookup::Lookup;
pub use property::{Property, PropertyValue};
pub use search::{
    ClassificationCondition, InstanceQuery, MatchCriteria, Page, PropertyCondition,
    PropertyOperator, SearchClassifications, SearchProperties, Sequencing, SequencingOrder,
    TextPattern,
};
pub use temporal::{AsOf, HistoryOrder, HistoryWindow, Revision, TransactionTime, ValidTime};
