//! Metadata collection configuration

use serde::{Deserialize, Serialize};
use strata_core::{CollectionId, Error, Result};

/// Configuration for a metadata collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Identifier of the local collection; instances homed here are owned locally
    pub collection_id: CollectionId,

    /// Display name stamped on locally homed instances
    pub collection_name: String,

    /// Largest page a caller may request
    pub max_page_size: usize,

    /// Page size used when the caller passes 0
    pub default_page_size: usize,

    /// Hard cap on the depth of unbounded traversals (`None` = no cap)
    pub max_traversal_depth: Option<usize>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            collection_id: CollectionId::new("local"),
            collection_name: "local".to_string(),
            max_page_size: 1000,
            default_page_size: 100,
            max_traversal_depth: None,
        }
    }
}

impl CollectionConfig {
    /// Create a configuration for the named collection
    pub fn new<S: Into<String>>(collection_id: S, collection_name: S) -> Self {
        Self {
            collection_id: CollectionId::new(collection_id),
            collection_name: collection_name.into(),
            ..Default::default()
        }
    }

    /// Create configuration for tests: small pages, bounded traversals
    pub fn for_testing() -> Self {
        Self {
            collection_id: CollectionId::new("test-collection"),
            collection_name: "test".to_string(),
            max_page_size: 50,
            default_page_size: 20,
            max_traversal_depth: Some(32),
        }
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the largest page a caller may request
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Set the page size used when the caller passes 0
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Cap unbounded traversals at `depth` hops
    pub fn max_traversal_depth(mut self, depth: Option<usize>) -> Self {
        self.max_traversal_depth = depth;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.collection_id.as_str().trim().is_empty() {
            return Err(Error::InvalidParameter(
                "collection_id must not be blank".to_string(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(Error::InvalidParameter(
                "max_page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
