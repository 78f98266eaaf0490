//! Transaction composition for multi-record mutations
//!
//! Every mutation of the collection reaches the store through a [`Composer`],
//! which turns it into one guarded transaction. Guards carry the versions the
//! mutation was computed from, so a concurrent writer that got there first
//! makes the whole transaction fail with a retryable repository error.

use strata_core::{Entity, EntityProxy, Guid, Instance, Record, Relationship, Result};
use strata_storage::{CommitReceipt, InstanceStore, TransactionBuilder};
use tracing::{debug, info};

/// A relationship rewritten as part of a larger mutation
#[derive(Debug, Clone)]
pub(crate) struct Rewrite {
    /// Version the rewrite was computed from
    pub prior_version: u64,
    pub next: Relationship,
}

/// Builds and submits the transaction of one collection operation
pub(crate) struct Composer<'a> {
    store: &'a dyn InstanceStore,
    collection: &'a str,
}

impl<'a> Composer<'a> {
    pub fn new(store: &'a dyn InstanceStore, collection: &'a str) -> Self {
        Self { store, collection }
    }

    fn commit(&self, tx: TransactionBuilder, action: &str, guid: &Guid) -> Result<CommitReceipt> {
        let statements = tx.len();
        let receipt = tx.submit(self.store)?;
        debug!(
            "{} {} in collection {} ({} statements, tx {})",
            action, guid, self.collection, statements, receipt.tx_id
        );
        Ok(receipt)
    }

    /// Write a brand new instance
    pub fn create<T>(&self, instance: T) -> Result<T>
    where
        T: Instance + Into<Record>,
    {
        let mut tx = TransactionBuilder::new();
        tx.create(instance.clone());
        self.commit(tx, "Created", instance.guid())?;
        Ok(instance)
    }

    /// Write the next revision of an instance read at `prior.version()`
    pub fn replace<T>(&self, prior: &T, next: T) -> Result<T>
    where
        T: Instance + Into<Record>,
    {
        let mut tx = TransactionBuilder::new();
        tx.replace(prior.version(), next.clone());
        self.commit(tx, "Updated", next.guid())?;
        Ok(next)
    }

    /// Write a proxy unless a full entity is already stored
    pub fn put_proxy(&self, proxy: EntityProxy) -> Result<()> {
        let guid = proxy.header.guid.clone();
        let mut tx = TransactionBuilder::new();
        tx.put_proxy(proxy);
        self.commit(tx, "Stored proxy", &guid)?;
        Ok(())
    }

    /// Overwrite whatever is stored under the GUID with a reference copy
    pub fn overwrite<T>(&self, instance: T) -> Result<T>
    where
        T: Instance + Into<Record>,
    {
        let mut tx = TransactionBuilder::new();
        tx.overwrite(instance.clone());
        self.commit(tx, "Saved reference copy", instance.guid())?;
        Ok(instance)
    }

    /// Retire an entity GUID and recreate it under a new GUID, rewriting
    /// every relationship that pointed at the old one
    pub fn re_identify_entity(
        &self,
        prior: &Entity,
        retired: Entity,
        renamed: Entity,
        rewrites: Vec<Rewrite>,
    ) -> Result<Entity> {
        let mut tx = TransactionBuilder::new();
        for rewrite in rewrites {
            tx.replace(rewrite.prior_version, rewrite.next);
        }
        tx.replace(prior.version(), retired);
        tx.create(renamed.clone());
        self.commit(tx, "Re-identified", prior.guid())?;
        info!(
            "Entity {} re-identified as {} in collection {}",
            prior.guid(),
            renamed.guid(),
            self.collection
        );
        Ok(renamed)
    }

    /// Retire a relationship GUID and recreate it under a new GUID
    pub fn re_identify_relationship(
        &self,
        prior: &Relationship,
        retired: Relationship,
        renamed: Relationship,
    ) -> Result<Relationship> {
        let mut tx = TransactionBuilder::new();
        tx.replace(prior.version(), retired);
        tx.create(renamed.clone());
        self.commit(tx, "Re-identified", prior.guid())?;
        info!(
            "Relationship {} re-identified as {} in collection {}",
            prior.guid(),
            renamed.guid(),
            self.collection
        );
        Ok(renamed)
    }

    /// Evict every revision of a GUID along with the relationships that
    /// still reference it
    pub fn purge(&self, guid: &Guid, cascade: Vec<Guid>) -> Result<()> {
        let mut tx = TransactionBuilder::new();
        let cascaded = cascade.len();
        for rel in cascade {
            tx.evict(rel);
        }
        tx.evict(guid.clone());
        self.commit(tx, "Purged", guid)?;
        info!(
            "Purged {} and {} relationships from collection {}",
            guid, cascaded, self.collection
        );
        Ok(())
    }

    /// Save a relationship reference copy, creating proxies for the endpoints
    /// that are not stored as full entities
    pub fn save_relationship_copy(
        &self,
        relationship: Relationship,
        missing_endpoints: Vec<EntityProxy>,
    ) -> Result<Relationship> {
        let mut tx = TransactionBuilder::new();
        for proxy in missing_endpoints {
            tx.put_proxy(proxy);
        }
        tx.overwrite(relationship.clone());
        self.commit(tx, "Saved reference copy", relationship.guid())?;
        Ok(relationship)
    }
}
