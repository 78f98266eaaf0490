//! Tuning for the persistent revision store
//!
//! The store keeps five column families with different access patterns.
//! Revisions take one write per statement and are read by prefix scan when
//! history is requested. The latest pointers and the meta record are read
//! by exact key on every lookup and commit. The adjacency and type indexes
//! are small and only prefix-scanned.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strata_core::{Error, Result};

const MB: usize = 1024 * 1024;

/// Column families of the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Every revision of every GUID, keyed by GUID then valid time
    Revisions,
    /// Valid time of the newest revision per GUID
    Latest,
    /// Relationship GUIDs per endpoint GUID
    Adjacency,
    /// GUIDs per type name, supertypes included
    TypeIndex,
    /// Commit clock and other store metadata
    Meta,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::Revisions,
        Family::Latest,
        Family::Adjacency,
        Family::TypeIndex,
        Family::Meta,
    ];

    /// Column family name on disk
    pub const fn name(self) -> &'static str {
        match self {
            Family::Revisions => "revisions",
            Family::Latest => "latest",
            Family::Adjacency => "adjacency",
            Family::TypeIndex => "type_index",
            Family::Meta => "meta",
        }
    }

    /// Read by exact key rather than by prefix scan
    pub fn is_point_lookup(self) -> bool {
        matches!(self, Family::Latest | Family::Meta)
    }
}

/// Options for opening the persistent store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Path to the database directory
    pub path: PathBuf,

    /// Whether to create the database if it doesn't exist
    pub create_if_missing: bool,

    /// Memtable size of the revisions family
    pub revision_write_buffer_size: usize,

    /// Memtable size of each of the other families
    pub index_write_buffer_size: usize,

    /// Memtables kept per family before a flush stalls writes
    pub max_write_buffer_number: i32,

    /// Background flush and compaction threads
    pub max_background_jobs: i32,

    /// Block cache shared by every family
    pub block_cache_size: usize,

    /// Bloom filter bits per key on the point-lookup families (`None` = off)
    pub bloom_bits_per_key: Option<f64>,

    /// Compress revision bodies
    pub compress_revisions: bool,

    /// Sync the write-ahead log before a commit is acknowledged
    pub sync_commits: bool,
}

impl StorageOptions {
    /// Create options for a store at the given path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Small buffers and unsynced commits for throwaway stores
    pub fn for_testing<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
            revision_write_buffer_size: 4 * MB,
            index_write_buffer_size: MB,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            block_cache_size: 8 * MB,
            bloom_bits_per_key: Some(10.0),
            compress_revisions: false,
            sync_commits: false,
        }
    }

    /// Large revision buffers, compressed history and synced commits
    pub fn for_production<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
            revision_write_buffer_size: 64 * MB,
            index_write_buffer_size: 16 * MB,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            block_cache_size: 512 * MB,
            bloom_bits_per_key: Some(10.0),
            compress_revisions: true,
            sync_commits: true,
        }
    }

    pub fn revision_write_buffer_size(mut self, size: usize) -> Self {
        self.revision_write_buffer_size = size;
        self
    }

    pub fn block_cache_size(mut self, size: usize) -> Self {
        self.block_cache_size = size;
        self
    }

    /// Set bloom filter bits per key, or turn the filters off with `None`
    pub fn bloom_filter(mut self, bits_per_key: Option<f64>) -> Self {
        self.bloom_bits_per_key = bits_per_key;
        self
    }

    pub fn compress_revisions(mut self, enabled: bool) -> Self {
        self.compress_revisions = enabled;
        self
    }

    pub fn sync_commits(mut self, sync: bool) -> Self {
        self.sync_commits = sync;
        self
    }

    /// Fail to open instead of creating a missing database
    pub fn require_existing(mut self) -> Self {
        self.create_if_missing = false;
        self
    }

    /// Memtable size for one family
    pub fn write_buffer_size_for(&self, family: Family) -> usize {
        match family {
            Family::Revisions => self.revision_write_buffer_size,
            _ => self.index_write_buffer_size,
        }
    }

    /// Bloom filter bits for one family; prefix-scanned families get none
    pub fn bloom_bits_for(&self, family: Family) -> Option<f64> {
        self.bloom_bits_per_key.filter(|_| family.is_point_lookup())
    }

    /// Whether one family's blocks are compressed
    pub fn compresses(&self, family: Family) -> bool {
        self.compress_revisions && family == Family::Revisions
    }

    /// Reject settings the store cannot open with
    pub fn validate(&self) -> Result<()> {
        if self.revision_write_buffer_size == 0 || self.index_write_buffer_size == 0 {
            return Err(Error::InvalidParameter(
                "write buffer sizes must be positive".to_string(),
            ));
        }
        if self.max_write_buffer_number < 1 || self.max_background_jobs < 1 {
            return Err(Error::InvalidParameter(
                "write buffer count and background jobs must be at least 1".to_string(),
            ));
        }
        if let Some(bits) = self.bloom_bits_per_key
            && !(bits > 0.0 && bits.is_finite())
        {
            return Err(Error::InvalidParameter(format!(
                "bloom filter bits per key must be positive, got {}",
                bits
            )));
        }
        Ok(())
    }
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./strata-data"),
            create_if_missing: true,
            revision_write_buffer_size: 32 * MB,
            index_write_buffer_size: 8 * MB,
            max_write_buffer_number: 3,
            max_background_jobs: 4,
            block_cache_size: 128 * MB,
            bloom_bits_per_key: Some(10.0),
            compress_revisions: true,
            sync_commits: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_names_are_distinct() {
        let mut names: Vec<&str> = Family::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Family::ALL.len());
    }

    #[test]
    fn test_presets_validate() {
        assert!(StorageOptions::default().validate().is_ok());
        assert!(StorageOptions::for_testing("/tmp/strata").validate().is_ok());

        let production = StorageOptions::for_production("/var/lib/strata");
        assert!(production.validate().is_ok());
        assert!(production.sync_commits);
        assert!(production.compresses(Family::Revisions));
    }

    #[test]
    fn test_per_family_tuning() {
        let opts = StorageOptions::for_testing("/tmp/strata");
        assert_eq!(opts.write_buffer_size_for(Family::Revisions), 4 * MB);
        assert_eq!(opts.write_buffer_size_for(Family::Adjacency), MB);

        assert_eq!(opts.bloom_bits_for(Family::Latest), Some(10.0));
        assert_eq!(opts.bloom_bits_for(Family::Meta), Some(10.0));
        assert_eq!(opts.bloom_bits_for(Family::Revisions), None);
        assert_eq!(opts.bloom_bits_for(Family::TypeIndex), None);

        let compressed = opts.compress_revisions(true);
        assert!(compressed.compresses(Family::Revisions));
        assert!(!compressed.compresses(Family::Latest));
    }

    #[test]
    fn test_builder_and_validation() {
        let opts = StorageOptions::new("/data")
            .revision_write_buffer_size(128 * MB)
            .sync_commits(true)
            .bloom_filter(None)
            .require_existing();
        assert_eq!(opts.revision_write_buffer_size, 128 * MB);
        assert!(opts.sync_commits);
        assert_eq!(opts.bloom_bits_for(Family::Latest), None);
        assert!(!opts.create_if_missing);
        assert!(opts.validate().is_ok());

        assert!(matches!(
            StorageOptions::new("/data").revision_write_buffer_size(0).validate(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(StorageOptions::new("/data").bloom_filter(Some(f64::NAN)).validate().is_err());
    }

    #[test]
    fn test_options_from_json_keep_defaults() {
        let opts: StorageOptions =
            serde_json::from_str(r#"{"path": "/srv/strata", "sync_commits": true}"#).unwrap();
        assert_eq!(opts.path, PathBuf::from("/srv/strata"));
        assert!(opts.sync_commits);
        assert_eq!(opts.block_cache_size, StorageOptions::default().block_cache_size);
    }
}
