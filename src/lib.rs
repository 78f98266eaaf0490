//! Strata - instance-lifecycle manager for a federated, bitemporal metadata graph
//!
//! This is the main library crate that re-exports all Strata components.

pub use strata_core as core;
pub use strata_graph as graph;
pub use strata_storage as storage;

// Re-export commonly used types
pub use strata_core::{
    AsOf, Classification, ClassificationOrigin, CollectionId, Entity, EntityProxy, Error, Guid,
    HistoryOrder, HistoryWindow, InstanceGraph, InstanceHeader, InstanceStatus, InstanceType,
    MatchCriteria, Property, PropertyValue, Provenance, Relationship, Result, Sequencing,
    SequencingOrder, ValidTime,
};

pub use strata_graph::{
    CollectionConfig, EntitySummary, FindOptions, MetadataCollection, NeighborhoodFilter,
    ReferenceOutcome, TypeCatalog, TypeCategory, TypeDef,
};
pub use strata_storage::{InstanceStore, MemoryStore, StorageOptions};

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` when the variable is unset or invalid.
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .try_init()
        .is_ok()
}
