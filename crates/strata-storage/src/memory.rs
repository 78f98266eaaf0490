//! In-memory bitemporal store
//!
//! Keeps every revision of every record in process memory. Commits are
//! serialized by a write lock; reads share a read lock.

use crate::clock::CommitClock;
use crate::transaction::Statement;
use crate::{CommitReceipt, Hop, InstanceStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use strata_core::{
    AsOf, Error, Guid, HistoryWindow, InstanceQuery, Record, Result, Revision, TransactionTime,
    ValidTime,
};
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryState {
    /// Revisions per GUID, oldest first
    revisions: BTreeMap<Guid, Vec<Revision<Record>>>,

    /// Entity GUID to every relationship GUID that has referenced it
    adjacency: BTreeMap<Guid, BTreeSet<Guid>>,

    clock: CommitClock,
}

impl MemoryState {
    fn visible(&self, guid: &Guid, as_of: AsOf) -> Option<&Record> {
        self.revisions
            .get(guid)?
            .iter()
            .rev()
            .find(|rev| as_of.sees(*rev))
            .map(|rev| &rev.data)
    }

    fn latest(&self, guid: &Guid) -> Option<&Record> {
        self.visible(guid, AsOf::now())
    }

    fn index_endpoints(&mut self, record: &Record) {
        if let Some((one, two)) = record.endpoints() {
            for end in [one, two] {
                self.adjacency
                    .entry(end.clone())
                    .or_default()
                    .insert(record.guid().clone());
            }
        }
    }

    fn apply(&mut self, statement: Statement, valid_time: ValidTime, transaction_time: TransactionTime) {
        match statement {
            Statement::Put { record, .. } => {
                self.index_endpoints(&record);
                let revisions = self.revisions.entry(record.guid().clone()).or_default();
                // A second write to the same GUID in one transaction replaces the first
                if revisions.last().is_some_and(|r| r.valid_time == valid_time) {
                    revisions.pop();
                }
                if let Some(last) = revisions.last_mut() {
                    last.valid_until = Some(valid_time);
                }
                revisions.push(Revision::new(record, valid_time, transaction_time));
            }
            Statement::Evict { guid } => {
                if let Some(revisions) = self.revisions.remove(&guid) {
                    for rev in &revisions {
                        if let Some((one, two)) = rev.data.endpoints() {
                            for end in [one, two] {
                                if let Some(rels) = self.adjacency.get_mut(end) {
                                    rels.remove(&guid);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// In-process implementation of [`InstanceStore`]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| Error::Repository("store lock poisoned".to_string()))
    }

    /// Number of GUIDs with at least one revision
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_state()?.revisions.len())
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of revisions stored for a GUID
    pub fn revision_count(&self, guid: &Guid) -> Result<usize> {
        Ok(self
            .read_state()?
            .revisions
            .get(guid)
            .map_or(0, Vec::len))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl InstanceStore for MemoryStore {
    fn read(&self, guid: &Guid, as_of: AsOf) -> Result<Option<Record>> {
        Ok(self.read_state()?.visible(guid, as_of).cloned())
    }

    fn history(&self, guid: &Guid, window: &HistoryWindow) -> Result<Vec<Revision<Record>>> {
        let state = self.read_state()?;
        Ok(state
            .revisions
            .get(guid)
            .map(|revs| revs.iter().filter(|r| r.overlaps(window)).cloned().collect())
            .unwrap_or_default())
    }

    fn submit(&self, statements: Vec<Statement>) -> Result<CommitReceipt> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Repository("store lock poisoned".to_string()))?;

        // Check every guard against the state each statement would see
        let mut staged: BTreeMap<Guid, Option<Record>> = BTreeMap::new();
        for statement in &statements {
            let guid = statement.guid();
            let current = match staged.get(guid) {
                Some(staged) => staged.clone(),
                None => state.latest(guid).cloned(),
            };
            match statement {
                Statement::Put { record, guard } => {
                    guard.check(guid, current.as_ref())?;
                    staged.insert(guid.clone(), Some(record.clone()));
                }
                Statement::Evict { .. } => {
                    staged.insert(guid.clone(), None);
                }
            }
        }

        let (tx_id, valid_time) = state.clock.tick();
        let transaction_time = TransactionTime::now();
        let count = statements.len();
        for statement in statements {
            state.apply(statement, valid_time, transaction_time);
        }

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
        let state = self.read_state()?;
        let visible: Vec<Record> = state
            .revisions
            .keys()
            .filter_map(|guid| state.visible(guid, as_of).cloned())
            .collect();
        Ok(query.apply(visible))
    }

    fn traverse(&self, node: &Guid, as_of: AsOf) -> Result<Vec<Hop>> {
        let state = self.read_state()?;
        let Some(rel_guids) = state.adjacency.get(node) else {
            return Ok(Vec::new());
        };

        let mut hops = Vec::new();
        for rel_guid in rel_guids {
            let Some(Record::Relationship(rel)) = state.visible(rel_guid, as_of) else {
                continue;
            };
            let Some(other) = rel.other_end(node) else {
                continue;
            };
            hops.push(Hop {
                neighbor: state.visible(&other.header.guid, as_of).cloned(),
                relationship: rel.clone(),
            });
        }
        Ok(hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Guard, TransactionBuilder};
    use strata_core::{
        CollectionId, Entity, EntityProxy, Instance, InstanceHeader, InstanceType, Property,
        Relationship,
    };

    fn header(guid: &str, type_name: &str) -> InstanceHeader {
        InstanceHeader::new(
            Guid::from(guid),
            InstanceType::new(type_name),
            CollectionId::new("local"),
            "tester",
        )
    }

    fn entity(guid: &str) -> Entity {
        Entity::new(header(guid, "Asset"))
    }

    fn relationship(guid: &str, one: &str, two: &str) -> Relationship {
        Relationship::new(
            header(guid, "Link"),
            EntityProxy::new(header(one, "Asset")),
            EntityProxy::new(header(two, "Asset")),
        )
    }

    fn bump(e: &Entity, props: Property) -> Entity {
        let mut h = e.header.clone();
        h.version += 1;
        e.clone().with_header(h).with_properties(props)
    }

    #[test]
    fn test_put_and_read() {
        let store = MemoryStore::new();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("e1"));
        let receipt = tx.submit(&store).unwrap();

        assert_eq!(receipt.statements, 1);
        let read = store.read(&Guid::from("e1"), AsOf::now()).unwrap();
        assert!(matches!(read, Some(Record::Entity(_))));
        assert!(store.read(&Guid::from("nope"), AsOf::now()).unwrap().is_none());
    }

    #[test]
    fn test_point_in_time_reads() {
        let store = MemoryStore::new();
        let e1 = entity("e1");
        let mut tx = TransactionBuilder::new();
        tx.create(e1.clone());
        let first = tx.submit(&store).unwrap();

        let e1v2 = bump(&e1, Property::with("name", "second"));
        let mut tx = TransactionBuilder::new();
        tx.replace(1, e1v2);
        let second = tx.submit(&store).unwrap();
        assert!(second.valid_time > first.valid_time);

        let at_first = store.read(&Guid::from("e1"), AsOf::at(first.valid_time)).unwrap();
        assert_eq!(at_first.map(|r| r.header().version), Some(1));

        let now = store.read(&Guid::from("e1"), AsOf::now()).unwrap();
        assert_eq!(now.map(|r| r.header().version), Some(2));

        let before = ValidTime::from_micros(first.valid_time.as_micros() - 1);
        assert!(store.read(&Guid::from("e1"), AsOf::at(before)).unwrap().is_none());
    }

    #[test]
    fn test_history_oldest_first() {
        let store = MemoryStore::new();
        let e1 = entity("e1");
        let mut tx = TransactionBuilder::new();
        tx.create(e1.clone());
        tx.submit(&store).unwrap();
        let mut tx = TransactionBuilder::new();
        tx.replace(1, bump(&e1, Property::new()));
        tx.submit(&store).unwrap();

        let history = store.history(&Guid::from("e1"), &HistoryWindow::all()).unwrap();
        let versions: Vec<u64> = history.iter().map(|r| r.data.header().version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert!(!history[0].is_current());
        assert!(history[1].is_current());
    }

    #[test]
    fn test_stale_version_rejected() {
        let store = MemoryStore::new();
        let e1 = entity("e1");
        let mut tx = TransactionBuilder::new();
        tx.create(e1.clone());
        tx.submit(&store).unwrap();

        let mut tx = TransactionBuilder::new();
        tx.replace(1, bump(&e1, Property::new()));
        tx.submit(&store).unwrap();

        // A writer that still believes version 1 is current loses
        let mut tx = TransactionBuilder::new();
        tx.replace(1, bump(&e1, Property::with("late", true)));
        let err = tx.submit(&store).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.revision_count(&Guid::from("e1")).unwrap(), 2);
    }

    #[test]
    fn test_guards_see_earlier_statements() {
        let store = MemoryStore::new();
        let e1 = entity("e1");
        let mut tx = TransactionBuilder::new();
        tx.create(e1.clone()).replace(1, bump(&e1, Property::new()));
        tx.submit(&store).unwrap();

        // Both writes share one valid time, so only the last survives
        assert_eq!(store.revision_count(&Guid::from("e1")).unwrap(), 1);
        let read = store.read(&Guid::from("e1"), AsOf::now()).unwrap();
        assert_eq!(read.map(|r| r.header().version), Some(2));
    }

    #[test]
    fn test_proxy_never_overwrites_entity() {
        let store = MemoryStore::new();
        let e1 = entity("e1");
        let mut tx = TransactionBuilder::new();
        tx.create(e1.clone());
        tx.submit(&store).unwrap();

        let mut tx = TransactionBuilder::new();
        tx.put_proxy(e1.to_proxy(&Vec::new()));
        assert!(tx.submit(&store).is_err());

        let mut tx = TransactionBuilder::new();
        tx.put_proxy(entity("e2").to_proxy(&Vec::new()));
        tx.submit(&store).unwrap();
        assert!(matches!(
            store.read(&Guid::from("e2"), AsOf::now()).unwrap(),
            Some(Record::Proxy(_))
        ));
    }

    #[test]
    fn test_evict_removes_history_and_adjacency() {
        let store = MemoryStore::new();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("a"))
            .create(entity("b"))
            .create(relationship("r1", "a", "b"));
        tx.submit(&store).unwrap();
        assert_eq!(store.traverse(&Guid::from("a"), AsOf::now()).unwrap().len(), 1);

        let mut tx = TransactionBuilder::new();
        tx.evict(Guid::from("r1"));
        tx.submit(&store).unwrap();

        assert!(store.history(&Guid::from("r1"), &HistoryWindow::all()).unwrap().is_empty());
        assert!(store.traverse(&Guid::from("a"), AsOf::now()).unwrap().is_empty());
    }

    #[test]
    fn test_traverse_returns_neighbors() {
        let store = MemoryStore::new();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("a"))
            .put(EntityProxy::new(header("b", "Asset")), Guard::NoFullEntity)
            .create(relationship("r1", "a", "b"))
            .create(relationship("r2", "c", "a"));
        tx.submit(&store).unwrap();

        let hops = store.traverse(&Guid::from("a"), AsOf::now()).unwrap();
        assert_eq!(hops.len(), 2);
        assert!(matches!(hops[0].neighbor, Some(Record::Proxy(_))));
        assert!(hops[1].neighbor.is_none());

        let hops = store.traverse(&Guid::from("b"), AsOf::now()).unwrap();
        assert!(matches!(hops[0].neighbor, Some(Record::Entity(_))));
    }

    #[test]
    fn test_query_filters_visible_records() {
        let store = MemoryStore::new();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("a"))
            .create(entity("b").with_properties(Property::with("name", "orders")))
            .create(relationship("r1", "a", "b"));
        let first = tx.submit(&store).unwrap();

        let mut tx = TransactionBuilder::new();
        tx.create(entity("c"));
        tx.submit(&store).unwrap();

        let all_now = store.query(&InstanceQuery::entities(), AsOf::now()).unwrap();
        assert_eq!(all_now.len(), 3);
        let earlier = store
            .query(&InstanceQuery::entities(), AsOf::at(first.valid_time))
            .unwrap();
        assert_eq!(earlier.len(), 2);
        let rels = store.query(&InstanceQuery::relationships(), AsOf::now()).unwrap();
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        let mut tx = TransactionBuilder::new();
        tx.create(entity("a"));
        tx.submit(&store).unwrap();
        assert_eq!(other.len().unwrap(), 1);
        assert!(!other.is_empty().unwrap());
    }
}
