//! Reference-copy reconciliation
//!
//! Reference copies mirror instances owned by other collections. They are
//! written as-is with overwrite semantics and can be purged whatever their
//! status, but never replace an instance the local collection owns.

use crate::collection::MetadataCollection;
use crate::typedef::TypeCategory;
use strata_core::validation::{validate_guid, validate_name, validate_reference_copy, validate_user_id};
use strata_core::version;
use strata_core::{
    AsOf, Classification, CollectionId, Entity, Error, Guid, Instance, InstanceHeader, Lookup,
    Relationship, Result,
};
use tracing::debug;

/// Result of a classification reference-copy operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceOutcome {
    /// The copy was written or removed
    Applied,
    /// Nothing to do: the entity is gone or already converged
    Unchanged,
}

impl MetadataCollection {
    fn reject_local_owner(&self, stored: Option<&InstanceHeader>, guid: &Guid) -> Result<()> {
        match stored {
            Some(header) if header.is_homed_in(self.id()) => Err(Error::Conflict(format!(
                "{} is homed in the local collection {}, reference copy rejected",
                guid,
                self.id()
            ))),
            _ => Ok(()),
        }
    }

    fn check_purge_target(
        &self,
        header: &InstanceHeader,
        type_name: &str,
        home: &CollectionId,
    ) -> Result<()> {
        self.reject_local_owner(Some(header), &header.guid)?;
        if !header.is_homed_in(home) {
            return Err(Error::Conflict(format!(
                "{} is homed in {}, not {}",
                header.guid, header.home, home
            )));
        }
        if header.instance_type.name != type_name {
            return Err(Error::TypeMismatch {
                expected: type_name.to_string(),
                found: header.instance_type.name.clone(),
            });
        }
        Ok(())
    }

    // ========== Entities ==========

    /// Store the copy of an entity owned by another collection
    pub fn save_entity_reference_copy(&self, user: &str, entity: Entity) -> Result<()> {
        validate_user_id(user)?;
        validate_reference_copy(&entity.header, self.id())?;
        self.types()?.require(entity.type_name(), TypeCategory::Entity)?;

        let stored = self.read_entity(&entity.header.guid, AsOf::now())?.found();
        self.reject_local_owner(stored.as_ref().map(|e| &e.header), &entity.header.guid)?;
        self.composer().overwrite(entity)?;
        Ok(())
    }

    /// Remove the copy of a remote entity along with the relationships that
    /// reference it
    pub fn purge_entity_reference_copy(
        &self,
        user: &str,
        guid: &Guid,
        type_name: &str,
        home: &CollectionId,
    ) -> Result<()> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        validate_name(type_name, "typeDefName")?;

        let header = match self.read_entity(guid, AsOf::now())? {
            Lookup::Found(entity) => entity.header,
            Lookup::ProxyOnly(proxy) => proxy.header,
            Lookup::NotFound => return Err(Error::NotKnown(guid.to_string())),
        };
        self.check_purge_target(&header, type_name, home)?;

        let cascade = self
            .relationships_referencing(guid)?
            .into_iter()
            .map(|rel| rel.header.guid)
            .collect();
        self.composer().purge(guid, cascade)
    }

    // ========== Relationships ==========

    /// Store the copy of a remote relationship, adding proxies for endpoints
    /// not stored locally
    pub fn save_relationship_reference_copy(
        &self,
        user: &str,
        relationship: Relationship,
    ) -> Result<()> {
        validate_user_id(user)?;
        validate_reference_copy(&relationship.header, self.id())?;
        validate_guid(relationship.end_one(), "entityOneProxy.guid")?;
        validate_guid(relationship.end_two(), "entityTwoProxy.guid")?;
        self.types()?
            .require(relationship.type_name(), TypeCategory::Relationship)?;

        let stored = self
            .read_relationship(&relationship.header.guid, AsOf::now())?
            .found();
        self.reject_local_owner(stored.as_ref().map(|r| &r.header), &relationship.header.guid)?;

        let mut missing = Vec::new();
        for proxy in [&relationship.entity_one_proxy, &relationship.entity_two_proxy] {
            if self.read_entity(&proxy.header.guid, AsOf::now())?.is_found() {
                debug!(
                    "Endpoint {} is stored in full, no proxy needed",
                    proxy.header.guid
                );
                continue;
            }
            if !missing.contains(proxy) {
                missing.push(proxy.clone());
            }
        }
        self.composer().save_relationship_copy(relationship, missing)?;
        Ok(())
    }

    /// Remove the copy of a remote relationship
    pub fn purge_relationship_reference_copy(
        &self,
        user: &str,
        guid: &Guid,
        type_name: &str,
        home: &CollectionId,
    ) -> Result<()> {
        validate_user_id(user)?;
        validate_guid(guid, "relationshipGUID")?;
        validate_name(type_name, "typeDefName")?;

        let rel = self
            .read_relationship(guid, AsOf::now())?
            .found()
            .ok_or_else(|| Error::NotKnown(guid.to_string()))?;
        self.check_purge_target(&rel.header, type_name, home)?;
        self.composer().purge(guid, Vec::new())
    }

    // ========== Classifications ==========

    /// Entity a remote classification applies to: the stored full entity or,
    /// when nothing is stored, the incoming remote entity
    fn classification_target(&self, incoming: Entity) -> Result<Option<Entity>> {
        match self.read_entity(&incoming.header.guid, AsOf::now())? {
            Lookup::Found(stored) => Ok(Some(stored)),
            _ if !incoming.header.is_homed_in(self.id()) => Ok(Some(incoming)),
            _ => Ok(None),
        }
    }

    /// Write a classified entity back the way its owner dictates
    fn write_classified(&self, current: &Entity, next: Entity, user: &str) -> Result<()> {
        if current.header.is_homed_in(self.id()) {
            let next = version::update(current, next, user)?;
            self.composer().replace(current, next)?;
        } else {
            self.composer().overwrite(next)?;
        }
        Ok(())
    }

    /// Merge a classification owned by another collection into an entity
    pub fn save_classification_reference_copy(
        &self,
        user: &str,
        entity: Entity,
        classification: Classification,
    ) -> Result<ReferenceOutcome> {
        validate_user_id(user)?;
        validate_guid(&entity.header.guid, "entity.guid")?;
        validate_name(&classification.name, "classification.name")?;
        if classification.home == *self.id() {
            return Err(Error::InvalidParameter(format!(
                "classification {} is homed in the local collection",
                classification.name
            )));
        }

        let guid = entity.header.guid.clone();
        let Some(current) = self.classification_target(entity)? else {
            debug!("Entity {} is not known, classification copy ignored", guid);
            return Ok(ReferenceOutcome::Unchanged);
        };
        if current.header.is_deleted() {
            debug!("Entity {} is deleted, classification copy ignored", guid);
            return Ok(ReferenceOutcome::Unchanged);
        }
        {
            let types = self.types()?;
            types.validate_classification(&classification.name, current.type_name())?;
            types.validate_properties(&classification.name, &classification.properties)?;
        }
        if current.classification(&classification.name) == Some(&classification) {
            return Ok(ReferenceOutcome::Unchanged);
        }

        let next = current.clone().with_classification(classification);
        self.write_classified(&current, next, user)?;
        Ok(ReferenceOutcome::Applied)
    }

    /// Remove a classification owned by another collection from an entity
    pub fn purge_classification_reference_copy(
        &self,
        user: &str,
        entity: Entity,
        classification: Classification,
    ) -> Result<ReferenceOutcome> {
        validate_user_id(user)?;
        validate_guid(&entity.header.guid, "entity.guid")?;
        validate_name(&classification.name, "classification.name")?;

        let guid = entity.header.guid;
        let current = match self.read_entity(&guid, AsOf::now())?.found() {
            Some(current) if current.is_classified_as(&classification.name) => current,
            _ => {
                debug!(
                    "Entity {} does not carry {}, nothing to purge",
                    guid, classification.name
                );
                return Ok(ReferenceOutcome::Unchanged);
            }
        };
        if current.header.is_deleted() {
            return Ok(ReferenceOutcome::Unchanged);
        }

        let next = current.clone().without_classification(&classification.name);
        self.write_classified(&current, next, user)?;
        Ok(ReferenceOutcome::Applied)
    }
}
