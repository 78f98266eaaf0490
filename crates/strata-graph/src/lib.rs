//! Strata Metadata Collection
//!
//! Provides the instance-lifecycle operations of a metadata collection built
//! on top of a bitemporal instance store.
//!
//! # Overview
//!
//! The collection provides:
//! - Lookups and point-in-time history of entities and relationships
//! - Create, update, delete, restore and purge for both instance kinds
//! - Classification maintenance, re-identify, re-type and re-home
//! - Property, classification and text search
//! - Neighborhood, linking and related-entity traversals
//! - Reference-copy reconciliation for instances owned elsewhere

pub mod collection;
pub mod config;
pub mod entity_ops;
mod mutation;
pub mod proxy;
pub mod reference;
pub mod relationship_ops;
pub mod search;
pub mod traversal;
pub mod typedef;

pub use collection::{EntitySummary, MetadataCollection};
pub use config::CollectionConfig;
pub use reference::ReferenceOutcome;
pub use search::FindOptions;
pub use traversal::NeighborhoodFilter;
pub use typedef::{TypeCatalog, TypeCategory, TypeDef};
