//! Persistent bitemporal store using RocksDB

use crate::clock::CommitClock;
use crate::keys::{KeyBuilder, KeyDecoder};
use crate::options::{Family, StorageOptions};
use crate::transaction::Statement;
use crate::{CommitReceipt, Hop, InstanceStore};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch, WriteOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use strata_core::{
    AsOf, Error, Guid, HistoryWindow, InstanceQuery, Record, Result, Revision, TransactionTime,
};
use tracing::{debug, info};

/// Column family names
pub mod cf {
    use crate::options::Family;

    pub const REVISIONS: &str = Family::Revisions.name();
    pub const LATEST: &str = Family::Latest.name();
    pub const ADJACENCY: &str = Family::Adjacency.name();
    pub const TYPE_INDEX: &str = Family::TypeIndex.name();
    pub const META: &str = Family::Meta.name();
}

const CLOCK_KEY: &str = "commit_clock";

fn storage_error(e: rocksdb::Error) -> Error {
    Error::Repository(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Type names a record is filed under: its own and every supertype
fn type_names(record: &Record) -> impl Iterator<Item = &String> {
    let ty = &record.header().instance_type;
    std::iter::once(&ty.name).chain(ty.supertypes.iter())
}

/// RocksDB implementation of [`InstanceStore`]
pub struct RocksStore {
    db: Arc<DB>,
    options: StorageOptions,

    /// Serializes commits and hands out their valid times
    clock: Arc<Mutex<CommitClock>>,
}

impl RocksStore {
    /// Open or create a store
    pub fn open(options: StorageOptions) -> Result<Self> {
        info!("Opening instance store at {:?}", options.path);

        options.validate()?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(options.create_if_missing);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(options.max_background_jobs);

        let cache = rocksdb::Cache::new_lru_cache(options.block_cache_size);
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Family::ALL
            .iter()
            .map(|&family| {
                let mut cf_opts = Options::default();
                cf_opts.set_write_buffer_size(options.write_buffer_size_for(family));
                cf_opts.set_max_write_buffer_number(options.max_write_buffer_number);
                cf_opts.set_compression_type(if options.compresses(family) {
                    rocksdb::DBCompressionType::Lz4
                } else {
                    rocksdb::DBCompressionType::None
                });

                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_block_cache(&cache);
                if let Some(bits) = options.bloom_bits_for(family) {
                    block_opts.set_bloom_filter(bits, false);
                }
                cf_opts.set_block_based_table_factory(&block_opts);
                ColumnFamilyDescriptor::new(family.name(), cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, &options.path, cf_descriptors)
            .map_err(storage_error)?;

        let store = Self {
            db: Arc::new(db),
            options,
            clock: Arc::new(Mutex::new(CommitClock::new())),
        };

        if let Some(bytes) = store.get(cf::META, &KeyBuilder::meta(CLOCK_KEY))? {
            let (last_micros, next_tx): (i64, u64) = decode(&bytes)?;
            store.with_clock(|clock| *clock = CommitClock::resume(last_micros, next_tx))?;
        }

        info!("Instance store opened successfully");
        Ok(store)
    }

    /// Get a reference to a column family
    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Repository(format!("Column family not found: {}", name)))
    }

    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        self.db.get_cf(cf, key).map_err(storage_error)
    }

    fn with_clock<T>(&self, f: impl FnOnce(&mut CommitClock) -> T) -> Result<T> {
        let mut clock = self
            .clock
            .lock()
            .map_err(|_| Error::Repository("commit lock poisoned".to_string()))?;
        Ok(f(&mut clock))
    }

    /// Collect every key under a prefix
    fn scan_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let mut keys = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, _) = item.map_err(storage_error)?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Decode every revision of a GUID, oldest first
    fn revisions(&self, guid: &Guid) -> Result<Vec<Revision<Record>>> {
        let prefix = KeyBuilder::revision_prefix(guid);
        let cf = self.cf(cf::REVISIONS)?;
        let mut revisions = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, &prefix) {
            let (key, value) = item.map_err(storage_error)?;
            if !key.starts_with(&prefix) {
                break;
            }
            revisions.push(decode(&value)?);
        }
        Ok(revisions)
    }

    fn latest(&self, guid: &Guid) -> Result<Option<Revision<Record>>> {
        self.get(cf::LATEST, &KeyBuilder::latest(guid))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn visible(&self, guid: &Guid, as_of: AsOf) -> Result<Option<Record>> {
        if as_of.is_now() {
            return Ok(self.latest(guid)?.map(Revision::into_inner));
        }
        Ok(self
            .revisions(guid)?
            .into_iter()
            .rev()
            .find(|rev| as_of.sees(rev))
            .map(Revision::into_inner))
    }

    /// GUIDs that may satisfy a query, narrowed by the indexes where possible
    fn candidates(&self, query: &InstanceQuery) -> Result<BTreeSet<Guid>> {
        let (cf_name, prefix) = if let Some(endpoint) = &query.endpoint {
            (cf::ADJACENCY, KeyBuilder::adjacency_prefix(endpoint))
        } else if let Some(type_name) = &query.type_name {
            (cf::TYPE_INDEX, KeyBuilder::type_index_prefix(type_name))
        } else {
            (cf::LATEST, vec![crate::keys::prefix::LATEST])
        };

        let mut guids = BTreeSet::new();
        for key in self.scan_keys(cf_name, &prefix)? {
            let mut decoder = KeyDecoder::new(&key);
            decoder.read_u8();
            if cf_name != cf::LATEST {
                decoder.read_string();
            }
            if let Some(guid) = decoder.read_guid() {
                guids.insert(guid);
            }
        }
        Ok(guids)
    }

    /// Stage the removal of every revision and index entry of a GUID
    fn stage_evict(
        &self,
        batch: &mut WriteBatch,
        guid: &Guid,
        revisions: &[Revision<Record>],
    ) -> Result<()> {
        for rev in revisions {
            batch.delete_cf(
                self.cf(cf::REVISIONS)?,
                KeyBuilder::revision(guid, rev.valid_time.as_micros()),
            );
            for name in type_names(&rev.data) {
                batch.delete_cf(self.cf(cf::TYPE_INDEX)?, KeyBuilder::type_index(name, guid));
            }
            if let Some((one, two)) = rev.data.endpoints() {
                for end in [one, two] {
                    batch.delete_cf(self.cf(cf::ADJACENCY)?, KeyBuilder::adjacency(end, guid));
                }
            }
        }
        batch.delete_cf(self.cf(cf::LATEST)?, KeyBuilder::latest(guid));
        Ok(())
    }

    /// Flush all in-memory data to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_error)?;
        info!("Instance store flushed");
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> String {
        self.db
            .property_value("rocksdb.stats")
            .unwrap_or_default()
            .unwrap_or_default()
    }
}

impl Clone for RocksStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            options: self.options.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl InstanceStore for RocksStore {
    fn read(&self, guid: &Guid, as_of: AsOf) -> Result<Option<Record>> {
        self.visible(guid, as_of)
    }

    fn history(&self, guid: &Guid, window: &HistoryWindow) -> Result<Vec<Revision<Record>>> {
        Ok(self
            .revisions(guid)?
            .into_iter()
            .filter(|r| r.overlaps(window))
            .collect())
    }

    fn submit(&self, statements: Vec<Statement>) -> Result<CommitReceipt> {
        let mut clock = self
            .clock
            .lock()
            .map_err(|_| Error::Repository("commit lock poisoned".to_string()))?;

        // Record per GUID as the statements so far would leave it
        let mut pending: HashMap<Guid, Option<Record>> = HashMap::new();
        for statement in &statements {
            let guid = statement.guid();
            let current = match pending.get(guid) {
                Some(staged) => staged.clone(),
                None => self.latest(guid)?.map(Revision::into_inner),
            };
            match statement {
                Statement::Put { record, guard } => {
                    guard.check(guid, current.as_ref())?;
                    pending.insert(guid.clone(), Some(record.clone()));
                }
                Statement::Evict { .. } => {
                    pending.insert(guid.clone(), None);
                }
            }
        }

        let (tx_id, valid_time) = clock.tick();
        let transaction_time = TransactionTime::now();
        let count = statements.len();

        let mut batch = WriteBatch::default();
        let mut written: HashMap<Guid, Option<Revision<Record>>> = HashMap::new();
        for statement in statements {
            match statement {
                Statement::Put { record, .. } => {
                    let guid = record.guid().clone();
                    let prior = match written.get(&guid) {
                        Some(staged) => staged.clone(),
                        None => self.latest(&guid)?,
                    };
                    if let Some(mut prior) = prior {
                        if prior.valid_time != valid_time {
                            prior.valid_until = Some(valid_time);
                            batch.put_cf(
                                self.cf(cf::REVISIONS)?,
                                KeyBuilder::revision(&guid, prior.valid_time.as_micros()),
                                encode(&prior)?,
                            );
                        }
                    }

                    for name in type_names(&record) {
                        batch.put_cf(self.cf(cf::TYPE_INDEX)?, KeyBuilder::type_index(name, &guid), []);
                    }
                    if let Some((one, two)) = record.endpoints() {
                        for end in [one, two] {
                            batch.put_cf(self.cf(cf::ADJACENCY)?, KeyBuilder::adjacency(end, &guid), []);
                        }
                    }

                    let revision = Revision::new(record, valid_time, transaction_time);
                    let bytes = encode(&revision)?;
                    batch.put_cf(
                        self.cf(cf::REVISIONS)?,
                        KeyBuilder::revision(&guid, valid_time.as_micros()),
                        &bytes,
                    );
                    batch.put_cf(self.cf(cf::LATEST)?, KeyBuilder::latest(&guid), &bytes);
                    written.insert(guid, Some(revision));
                }
                Statement::Evict { guid } => {
                    let mut revisions = self.revisions(&guid)?;
                    if let Some(Some(staged)) = written.get(&guid) {
                        revisions.push(staged.clone());
                    }
                    self.stage_evict(&mut batch, &guid, &revisions)?;
                    written.insert(guid, None);
                }
            }
        }

        let (last_micros, next_tx) = (clock.last_micros(), clock.next_tx());
        batch.put_cf(
            self.cf(cf::META)?,
            KeyBuilder::meta(CLOCK_KEY),
            encode(&(last_micros, next_tx))?,
        );

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.options.sync_commits);
        self.db.write_opt(batch, &write_opts).map_err(storage_error)?;

        debug!(
            "Committed transaction {} ({} statements) at {:?}",
            tx_id, count, valid_time
        );
        Ok(CommitReceipt {
            tx_id,
            valid_time,
            transaction_time,
            statements: count,
        })
    }

    fn query(&self, query: &InstanceQuery, as_of: AsOf) -> Result<Vec<Record>> {
        let mut visible = Vec::new();
        for guid in self.candidates(query)? {
            if let Some(record) = self.visible(&guid, as_of)? {
                visible.push(record);
            }
        }
        Ok(query.apply(visible))
    }

    fn traverse(&self, node: &Guid, as_of: AsOf) -> Result<Vec<Hop>> {
        let mut hops = Vec::new();
        for key in self.scan_keys(cf::ADJACENCY, &KeyBuilder::adjacency_prefix(node))? {
            let mut decoder = KeyDecoder::new(&key);
            decoder.read_u8();
            decoder.read_string();
            let Some(rel_guid) = decoder.read_guid() else {
                continue;
            };
            let Some(Record::Relationship(rel)) = self.visible(&rel_guid, as_of)? else {
                continue;
            };
            let Some(other) = rel.other_end(node) else {
                continue;
            };
            let neighbor = self.visible(&other.header.guid, as_of)?;
            hops.push(Hop {
                relationship: rel,
                neighbor,
            });
        }
        Ok(hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;
    use strata_core::{
        CollectionId, Entity, EntityProxy, Instance, InstanceHeader, InstanceType, Property,
        Relationship,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let options = StorageOptions::for_testing(temp_dir.path());
        let store = RocksStore::open(options).unwrap();
        (store, temp_dir)
    }

    fn header(guid: &str, type_name: &str) -> InstanceHeader {
        InstanceHeader::new(
            Guid::from(guid),
            InstanceType::with_supertypes(type_name, vec!["Referenceable".to_string()]),
            CollectionId::new("local"),
            "tester",
        )
    }

    fn entity(guid: &str) -> Entity {
        Entity::new(header(guid, "Asset"))
    }

    fn bump(e: &Entity) -> Entity {
        let mut h = e.header.clone();
        h.version += 1;
        e.clone().with_header(h)
    }

    #[test]
    fn test_open_store() {
        let (store, _dir) = create_test_store();
        assert!(store.read(&Guid::from("none"), AsOf::now()).unwrap().is_none());
    }

    #[test]
    fn test_put_read_and_history() {
        let (store, _dir) = create_test_store();
        let e1 = entity("e1");

        let mut tx = TransactionBuilder::new();
        tx.create(e1.clone());
        let first = tx.submit(&store).unwrap();

        let mut tx = TransactionBuilder::new();
        tx.replace(1, bump(&e1).with_properties(Property::with("name", "x")));
        tx.submit(&store).unwrap();

        let now = store.read(&Guid::from("e1"), AsOf::now()).unwrap();
        assert_eq!(now.map(|r| r.header().version), Some(2));
        let then = store.read(&Guid::from("e1"), AsOf::at(first.valid_time)).unwrap();
        assert_eq!(then.map(|r| r.header().version), Some(1));

        let history = store.history(&Guid::from("e1"), &HistoryWindow::all()).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].is_current());
    }

    #[test]
    fn test_guard_conflict_leaves_store_untouched() {
        let (store, _dir) = create_test_store();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("e1"));
        tx.submit(&store).unwrap();

        let mut tx = TransactionBuilder::new();
        tx.create(entity("e2")).create(entity("e1"));
        assert!(tx.submit(&store).unwrap_err().is_retryable());
        assert!(store.read(&Guid::from("e2"), AsOf::now()).unwrap().is_none());
    }

    #[test]
    fn test_query_uses_type_index() {
        let (store, _dir) = create_test_store();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("e1"))
            .create(Entity::new(header("p1", "Process")));
        tx.submit(&store).unwrap();

        let mut query = InstanceQuery::entities();
        query.type_name = Some("Asset".to_string());
        assert_eq!(store.query(&query, AsOf::now()).unwrap().len(), 1);

        query.type_name = Some("Referenceable".to_string());
        assert_eq!(store.query(&query, AsOf::now()).unwrap().len(), 2);

        assert_eq!(store.query(&InstanceQuery::entities(), AsOf::now()).unwrap().len(), 2);
    }

    #[test]
    fn test_traverse_and_evict() {
        let (store, _dir) = create_test_store();
        let rel = Relationship::new(
            header("r1", "Link"),
            EntityProxy::new(header("a", "Asset")),
            EntityProxy::new(header("b", "Asset")),
        );
        let mut tx = TransactionBuilder::new();
        tx.create(entity("a")).create(entity("b")).create(rel);
        tx.submit(&store).unwrap();

        let hops = store.traverse(&Guid::from("a"), AsOf::now()).unwrap();
        assert_eq!(hops.len(), 1);
        assert!(matches!(hops[0].neighbor, Some(Record::Entity(_))));

        let mut tx = TransactionBuilder::new();
        tx.evict(Guid::from("r1"));
        tx.submit(&store).unwrap();
        assert!(store.traverse(&Guid::from("a"), AsOf::now()).unwrap().is_empty());
        assert!(store.history(&Guid::from("r1"), &HistoryWindow::all()).unwrap().is_empty());
    }

    #[test]
    fn test_clock_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let last = {
            let store = RocksStore::open(StorageOptions::for_testing(temp_dir.path())).unwrap();
            let mut tx = TransactionBuilder::new();
            tx.create(entity("e1"));
            tx.submit(&store).unwrap()
        };

        let store = RocksStore::open(StorageOptions::for_testing(temp_dir.path())).unwrap();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("e2"));
        let next = tx.submit(&store).unwrap();
        assert!(next.valid_time > last.valid_time);
        assert_eq!(next.tx_id, last.tx_id + 1);
        assert!(store.read(&Guid::from("e1"), AsOf::now()).unwrap().is_some());
    }

    #[test]
    fn test_production_tuning_round_trips_history() {
        let temp_dir = TempDir::new().unwrap();
        let options = StorageOptions::for_production(temp_dir.path()).block_cache_size(8 << 20);
        let e1 = entity("e1");
        {
            let store = RocksStore::open(options.clone()).unwrap();
            let mut tx = TransactionBuilder::new();
            tx.create(e1.clone());
            tx.submit(&store).unwrap();
            let mut tx = TransactionBuilder::new();
            tx.replace(1, bump(&e1));
            tx.submit(&store).unwrap();
        }

        let store = RocksStore::open(options.require_existing()).unwrap();
        let history = store.history(&Guid::from("e1"), &HistoryWindow::all()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].data.header().version, 2);
    }

    #[test]
    fn test_open_rejects_invalid_options() {
        let temp_dir = TempDir::new().unwrap();
        let options = StorageOptions::for_testing(temp_dir.path()).bloom_filter(Some(0.0));
        assert!(matches!(RocksStore::open(options), Err(Error::InvalidParameter(_))));

        let missing = StorageOptions::for_testing(temp_dir.path().join("absent")).require_existing();
        assert!(RocksStore::open(missing).is_err());
    }
}
