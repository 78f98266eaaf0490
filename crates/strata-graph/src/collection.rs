//! Metadata collection: the entry point for every instance operation

use crate::config::CollectionConfig;
use crate::mutation::Composer;
use crate::search::FindOptions;
use crate::typedef::TypeCatalog;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use strata_core::validation::{
    effective_page_size, validate_as_of, validate_can_update, validate_guid,
    validate_history_window, validate_user_id,
};
use strata_core::version::ensure_not_deleted;
use strata_core::{
    AsOf, Classification, CollectionId, Entity, EntityProxy, Error, Guid, HistoryOrder,
    HistoryWindow, InstanceHeader, InstanceQuery, Lookup, Page, Record, Relationship,
    Result,
};
use strata_storage::{InstanceStore, MemoryStore};
use tracing::info;

/// Header and classifications of an entity, available for proxies too
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySummary {
    pub header: InstanceHeader,
    pub classifications: Vec<Classification>,
    /// True when only a proxy is stored
    pub is_proxy: bool,
}

impl From<Entity> for EntitySummary {
    fn from(entity: Entity) -> Self {
        Self {
            header: entity.header,
            classifications: entity.classifications.into_values().collect(),
            is_proxy: false,
        }
    }
}

impl From<EntityProxy> for EntitySummary {
    fn from(proxy: EntityProxy) -> Self {
        Self {
            header: proxy.header,
            classifications: Vec::new(),
            is_proxy: true,
        }
    }
}

/// A metadata collection over a bitemporal instance store
pub struct MetadataCollection {
    config: CollectionConfig,

    /// Instance store
    store: Arc<dyn InstanceStore>,

    /// Type definitions used for structural validation
    catalog: Arc<RwLock<TypeCatalog>>,
}

impl MetadataCollection {
    /// Create a collection over an existing store
    pub fn new(
        config: CollectionConfig,
        store: Arc<dyn InstanceStore>,
        catalog: TypeCatalog,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Opened metadata collection {} ({})",
            config.collection_name, config.collection_id
        );
        Ok(Self {
            config,
            store,
            catalog: Arc::new(RwLock::new(catalog)),
        })
    }

    /// Create a collection over a fresh in-memory store
    pub fn in_memory(config: CollectionConfig, catalog: TypeCatalog) -> Result<Self> {
        Self::new(config, Arc::new(MemoryStore::new()), catalog)
    }

    /// Open a collection over a RocksDB store
    #[cfg(feature = "rocksdb")]
    pub fn open(
        config: CollectionConfig,
        options: strata_storage::StorageOptions,
        catalog: TypeCatalog,
    ) -> Result<Self> {
        let store = strata_storage::RocksStore::open(options)?;
        Self::new(config, Arc::new(store), catalog)
    }

    /// Get the collection configuration
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Identifier of the local collection
    pub fn id(&self) -> &CollectionId {
        &self.config.collection_id
    }

    /// Name of the local collection
    pub fn name(&self) -> &str {
        &self.config.collection_name
    }

    /// Get a reference to the type catalog
    pub fn catalog(&self) -> &Arc<RwLock<TypeCatalog>> {
        &self.catalog
    }

    /// Get a reference to the instance store
    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.store
    }

    // ========== Shared Helpers ==========

    pub(crate) fn types(&self) -> Result<RwLockReadGuard<'_, TypeCatalog>> {
        self.catalog
            .read()
            .map_err(|_| Error::Repository("type catalog lock poisoned".to_string()))
    }

    pub(crate) fn composer(&self) -> Composer<'_> {
        Composer::new(self.store.as_ref(), &self.config.collection_name)
    }

    pub(crate) fn page_size(&self, requested: usize) -> Result<usize> {
        effective_page_size(
            requested,
            self.config.default_page_size,
            self.config.max_page_size,
        )
    }

    pub(crate) fn read_entity(&self, guid: &Guid, as_of: AsOf) -> Result<Lookup<Entity>> {
        Ok(Lookup::<Entity>::from_record(self.store.read(guid, as_of)?))
    }

    pub(crate) fn read_relationship(
        &self,
        guid: &Guid,
        as_of: AsOf,
    ) -> Result<Lookup<Relationship>> {
        Ok(Lookup::<Relationship>::from_record(
            self.store.read(guid, as_of)?,
        ))
    }

    /// Current full entity that the caller may mutate
    pub(crate) fn entity_for_update(&self, user: &str, guid: &Guid) -> Result<Entity> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        let entity = self.read_entity(guid, AsOf::now())?.require(guid.as_str())?;
        ensure_not_deleted(&entity.header)?;
        validate_can_update(&entity.header, self.id())?;
        Ok(entity)
    }

    /// Current relationship that the caller may mutate
    pub(crate) fn relationship_for_update(&self, user: &str, guid: &Guid) -> Result<Relationship> {
        validate_user_id(user)?;
        validate_guid(guid, "relationshipGUID")?;
        let rel = self
            .read_relationship(guid, AsOf::now())?
            .require(guid.as_str())?;
        ensure_not_deleted(&rel.header)?;
        validate_can_update(&rel.header, self.id())?;
        Ok(rel)
    }

    /// Every relationship currently stored with `guid` as an endpoint
    pub(crate) fn relationships_referencing(&self, guid: &Guid) -> Result<Vec<Relationship>> {
        Ok(self
            .store
            .traverse(guid, AsOf::now())?
            .into_iter()
            .map(|hop| hop.relationship)
            .collect())
    }

    /// Content of the revision before the current one
    pub(crate) fn previous_revision<T>(
        &self,
        guid: &Guid,
        extract: fn(Record) -> Option<T>,
    ) -> Result<T> {
        let mut revisions: Vec<T> = self
            .store
            .history(guid, &HistoryWindow::all())?
            .into_iter()
            .filter_map(|rev| extract(rev.data))
            .collect();
        if revisions.len() < 2 {
            return Err(Error::InvalidState(format!(
                "{} has no previous version to restore",
                guid
            )));
        }
        revisions.truncate(revisions.len() - 1);
        revisions
            .pop()
            .ok_or_else(|| Error::NotKnown(guid.to_string()))
    }

    fn history<T>(
        &self,
        guid: &Guid,
        window: &HistoryWindow,
        from_element: usize,
        page_size: usize,
        order: HistoryOrder,
        extract: fn(Record) -> Option<T>,
    ) -> Result<Option<Vec<T>>> {
        validate_history_window(window)?;
        let page = Page::new(from_element, self.page_size(page_size)?);

        let mut items: Vec<T> = self
            .store
            .history(guid, window)?
            .into_iter()
            .filter_map(|rev| extract(rev.data))
            .collect();
        if items.is_empty() {
            if self.store.history(guid, &HistoryWindow::all())?.is_empty() {
                return Err(Error::NotKnown(guid.to_string()));
            }
            return Ok(None);
        }
        if order == HistoryOrder::Backwards {
            items.reverse();
        }
        let items = page.apply(items);
        Ok((!items.is_empty()).then_some(items))
    }

    // ========== Entity Lookups ==========

    /// Return the entity if it is stored in full, whatever its status
    pub fn is_entity_known(&self, user: &str, guid: &Guid) -> Result<Option<Entity>> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        let found = self.read_entity(guid, AsOf::now())?;
        if let Lookup::ProxyOnly(_) = found {
            info!("Entity {} is only a proxy in {}", guid, self.name());
        }
        Ok(found.found())
    }

    /// Summary of a live entity; proxies are accepted
    pub fn get_entity_summary(&self, user: &str, guid: &Guid) -> Result<EntitySummary> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        let summary = match self.read_entity(guid, AsOf::now())? {
            Lookup::Found(entity) => EntitySummary::from(entity),
            Lookup::ProxyOnly(proxy) => EntitySummary::from(proxy),
            Lookup::NotFound => return Err(Error::NotKnown(guid.to_string())),
        };
        if summary.header.is_deleted() {
            return Err(Error::NotKnown(guid.to_string()));
        }
        Ok(summary)
    }

    /// Full detail of a live entity as of a point in time
    pub fn get_entity_detail(&self, user: &str, guid: &Guid, as_of: AsOf) -> Result<Entity> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        validate_as_of(&as_of)?;
        let entity = self.read_entity(guid, as_of)?.require(guid.as_str())?;
        if entity.header.is_deleted() {
            return Err(Error::NotKnown(guid.to_string()));
        }
        Ok(entity)
    }

    /// Every full revision of an entity in effect during `window`
    pub fn get_entity_detail_history(
        &self,
        user: &str,
        guid: &Guid,
        window: &HistoryWindow,
        from_element: usize,
        page_size: usize,
        order: HistoryOrder,
    ) -> Result<Option<Vec<Entity>>> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        self.history(guid, window, from_element, page_size, order, Record::into_entity)
    }

    /// Classifications of an entity that are homed in this collection
    pub fn get_home_classifications(
        &self,
        user: &str,
        guid: &Guid,
    ) -> Result<Option<Vec<Classification>>> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        let classifications: Vec<Classification> = match self.read_entity(guid, AsOf::now())? {
            Lookup::Found(entity) => entity
                .classifications
                .into_values()
                .filter(|c| &c.home == self.id())
                .collect(),
            Lookup::ProxyOnly(_) => Vec::new(),
            Lookup::NotFound => return Err(Error::NotKnown(guid.to_string())),
        };
        Ok((!classifications.is_empty()).then_some(classifications))
    }

    // ========== Relationship Lookups ==========

    /// Return the relationship if it is stored, whatever its status
    pub fn is_relationship_known(&self, user: &str, guid: &Guid) -> Result<Option<Relationship>> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        Ok(self.read_relationship(guid, AsOf::now())?.found())
    }

    /// A live relationship as of a point in time
    pub fn get_relationship(&self, user: &str, guid: &Guid, as_of: AsOf) -> Result<Relationship> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        validate_as_of(&as_of)?;
        let rel = self.read_relationship(guid, as_of)?.require(guid.as_str())?;
        if rel.header.is_deleted() {
            return Err(Error::NotKnown(guid.to_string()));
        }
        Ok(rel)
    }

    /// Every revision of a relationship in effect during `window`
    pub fn get_relationship_history(
        &self,
        user: &str,
        guid: &Guid,
        window: &HistoryWindow,
        from_element: usize,
        page_size: usize,
        order: HistoryOrder,
    ) -> Result<Option<Vec<Relationship>>> {
        validate_user_id(user)?;
        validate_guid(guid, "guid")?;
        self.history(
            guid,
            window,
            from_element,
            page_size,
            order,
            Record::into_relationship,
        )
    }

    /// Relationships that have a live entity as an endpoint
    pub fn get_relationships_for_entity(
        &self,
        user: &str,
        guid: &Guid,
        options: &FindOptions,
    ) -> Result<Option<Vec<Relationship>>> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        validate_as_of(&options.as_of)?;

        let deleted = match self.read_entity(guid, options.as_of)? {
            Lookup::Found(entity) => entity.header.is_deleted(),
            Lookup::ProxyOnly(proxy) => proxy.header.is_deleted(),
            Lookup::NotFound => return Err(Error::NotKnown(guid.to_string())),
        };
        if deleted {
            return Err(Error::NotKnown(guid.to_string()));
        }

        let mut query: InstanceQuery = self.build_query(InstanceQuery::relationships(), options)?;
        query.endpoint = Some(guid.clone());
        let found: Vec<Relationship> = self
            .store
            .query(&query, options.as_of)?
            .into_iter()
            .filter_map(Record::into_relationship)
            .collect();
        Ok((!found.is_empty()).then_some(found))
    }
}

impl Clone for MetadataCollection {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
        }
    }
}
