//! Entity lifecycle operations

use crate::collection::MetadataCollection;
use crate::mutation::Rewrite;
use crate::typedef::TypeCategory;
use strata_core::validation::{
    validate_can_update, validate_guid, validate_name, validate_new_home, validate_user_id,
};
use strata_core::version;
use strata_core::{
    AsOf, Classification, ClassificationOrigin, CollectionId, Entity, EntityProxy, Error, Guid,
    Instance, InstanceHeader, InstanceStatus, InstanceType, Property, Provenance, Result,
};
use tracing::{debug, info};

impl MetadataCollection {
    /// Check a new entity against its type and build its type reference
    fn check_new_entity(
        &self,
        type_name: &str,
        properties: &Property,
        classifications: &[Classification],
        status: InstanceStatus,
    ) -> Result<InstanceType> {
        validate_name(type_name, "entityTypeName")?;
        if status.is_deleted() {
            return Err(Error::InvalidParameter(
                "an entity cannot be created as DELETED".to_string(),
            ));
        }
        let types = self.types()?;
        let instance_type = types.instance_type(type_name, TypeCategory::Entity)?;
        types.validate_properties(type_name, properties)?;
        types.validate_status(type_name, status)?;
        for classification in classifications {
            types.validate_classification(&classification.name, type_name)?;
            types.validate_properties(&classification.name, &classification.properties)?;
        }
        Ok(instance_type)
    }

    fn build_entity(
        &self,
        header: InstanceHeader,
        properties: Property,
        classifications: Vec<Classification>,
    ) -> Entity {
        classifications
            .into_iter()
            .fold(Entity::new(header).with_properties(properties), |entity, c| {
                entity.with_classification(c)
            })
    }

    /// Current, live, full entity; ownership is not checked
    fn live_entity(&self, user: &str, guid: &Guid) -> Result<Entity> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        let entity = self.read_entity(guid, AsOf::now())?.require(guid.as_str())?;
        version::ensure_not_deleted(&entity.header)?;
        Ok(entity)
    }

    // ========== Create ==========

    /// Create a new entity homed in this collection
    pub fn add_entity(
        &self,
        user: &str,
        type_name: &str,
        properties: Property,
        classifications: Vec<Classification>,
        initial_status: Option<InstanceStatus>,
    ) -> Result<Entity> {
        validate_user_id(user)?;
        let status = initial_status.unwrap_or(InstanceStatus::Active);
        let instance_type = self.check_new_entity(type_name, &properties, &classifications, status)?;

        let header = InstanceHeader {
            home_name: Some(self.name().to_string()),
            status,
            ..InstanceHeader::new(Guid::new(), instance_type, self.id().clone(), user)
        };
        let entity = self.build_entity(header, properties, classifications);
        self.composer().create(entity)
    }

    /// Create a new entity owned by an external source and mirrored here
    #[allow(clippy::too_many_arguments)]
    pub fn add_external_entity(
        &self,
        user: &str,
        type_name: &str,
        external_source: &CollectionId,
        external_source_name: &str,
        properties: Property,
        classifications: Vec<Classification>,
        initial_status: Option<InstanceStatus>,
    ) -> Result<Entity> {
        validate_user_id(user)?;
        validate_name(external_source.as_str(), "externalSourceGUID")?;
        let status = initial_status.unwrap_or(InstanceStatus::Active);
        let instance_type = self.check_new_entity(type_name, &properties, &classifications, status)?;

        let header = InstanceHeader {
            home_name: Some(external_source_name.to_string()),
            provenance: Provenance::ExternalSource,
            replicated_by: Some(self.id().clone()),
            status,
            ..InstanceHeader::new(Guid::new(), instance_type, external_source.clone(), user)
        };
        let entity = self.build_entity(header, properties, classifications);
        self.composer().create(entity)
    }

    /// Store a proxy for an entity; a stored full entity is left untouched
    pub fn add_entity_proxy(&self, user: &str, proxy: EntityProxy) -> Result<()> {
        validate_user_id(user)?;
        validate_guid(&proxy.header.guid, "entityProxy.guid")?;
        self.types()?.require(proxy.type_name(), TypeCategory::Entity)?;

        if self.read_entity(&proxy.header.guid, AsOf::now())?.is_found() {
            debug!(
                "Entity {} is already stored in full, proxy not written",
                proxy.header.guid
            );
            return Ok(());
        }
        self.composer().put_proxy(proxy)
    }

    // ========== Update ==========

    /// Move an entity to another non-deleted status
    pub fn update_entity_status(
        &self,
        user: &str,
        guid: &Guid,
        status: InstanceStatus,
    ) -> Result<Entity> {
        if status.is_deleted() {
            return Err(Error::InvalidParameter(
                "use delete_entity to delete an entity".to_string(),
            ));
        }
        let current = self.entity_for_update(user, guid)?;
        self.types()?.validate_status(current.type_name(), status)?;
        let next = version::change_status(&current, status, user)?;
        self.composer().replace(&current, next)
    }

    /// Replace the properties of an entity
    pub fn update_entity_properties(
        &self,
        user: &str,
        guid: &Guid,
        properties: Property,
    ) -> Result<Entity> {
        let current = self.entity_for_update(user, guid)?;
        self.types()?
            .validate_properties(current.type_name(), &properties)?;
        let next = version::update(&current, current.clone().with_properties(properties), user)?;
        self.composer().replace(&current, next)
    }

    /// Bring back the content of the previous version as a new version
    pub fn undo_entity_update(&self, user: &str, guid: &Guid) -> Result<Entity> {
        let current = self.entity_for_update(user, guid)?;
        let previous = self.previous_revision(guid, strata_core::Record::into_entity)?;
        version::ensure_not_deleted(&previous.header)?;
        let next = version::increment_version(&current, previous, user)?;
        self.composer().replace(&current, next)
    }

    // ========== Delete, Restore, Purge ==========

    /// Soft-delete an entity
    pub fn delete_entity(&self, user: &str, guid: &Guid) -> Result<Entity> {
        let current = self.entity_for_update(user, guid)?;
        let next = version::soft_delete(&current, user)?;
        self.composer().replace(&current, next)
    }

    /// Restore a soft-deleted entity to the status it held before deletion
    pub fn restore_entity(&self, user: &str, guid: &Guid) -> Result<Entity> {
        validate_user_id(user)?;
        validate_guid(guid, "deletedEntityGUID")?;
        let current = self.read_entity(guid, AsOf::now())?.require(guid.as_str())?;
        validate_can_update(&current.header, self.id())?;
        let next = version::restore(&current, user)?;
        self.composer().replace(&current, next)
    }

    /// Remove a soft-deleted entity and every relationship still referencing it
    pub fn purge_entity(&self, user: &str, guid: &Guid) -> Result<()> {
        validate_user_id(user)?;
        validate_guid(guid, "deletedEntityGUID")?;
        let current = self.read_entity(guid, AsOf::now())?.require(guid.as_str())?;
        version::ensure_deleted(&current.header)?;
        validate_can_update(&current.header, self.id())?;

        let cascade = self
            .relationships_referencing(guid)?
            .into_iter()
            .map(|rel| rel.header.guid)
            .collect();
        self.composer().purge(guid, cascade)
    }

    // ========== Classifications ==========

    /// Attach a locally homed, assigned classification
    pub fn classify_entity(
        &self,
        user: &str,
        guid: &Guid,
        classification_name: &str,
        properties: Property,
    ) -> Result<Entity> {
        self.classify_entity_from(
            user,
            guid,
            classification_name,
            None,
            ClassificationOrigin::Assigned,
            properties,
        )
    }

    /// Attach a classification, optionally owned by an external source
    pub fn classify_entity_from(
        &self,
        user: &str,
        guid: &Guid,
        classification_name: &str,
        external_source: Option<&CollectionId>,
        origin: ClassificationOrigin,
        properties: Property,
    ) -> Result<Entity> {
        validate_name(classification_name, "classificationName")?;
        let current = self.live_entity(user, guid)?;
        {
            let types = self.types()?;
            types.validate_classification(classification_name, current.type_name())?;
            types.validate_properties(classification_name, &properties)?;
        }
        if current.is_classified_as(classification_name) {
            return Err(Error::Classification(format!(
                "{} is already classified as {}",
                guid, classification_name
            )));
        }

        let classification = match external_source {
            None => Classification::new(classification_name, self.id().clone(), user),
            Some(source) => Classification {
                provenance: Provenance::ExternalSource,
                replicated_by: Some(self.id().clone()),
                ..Classification::new(classification_name, source.clone(), user)
            },
        }
        .with_origin(origin)
        .with_properties(properties);

        let next = version::update(
            &current,
            current.clone().with_classification(classification),
            user,
        )?;
        self.composer().replace(&current, next)
    }

    /// Remove a classification from an entity
    pub fn declassify_entity(
        &self,
        user: &str,
        guid: &Guid,
        classification_name: &str,
    ) -> Result<Entity> {
        validate_name(classification_name, "classificationName")?;
        let current = self.live_entity(user, guid)?;
        if !current.is_classified_as(classification_name) {
            return Err(Error::Classification(format!(
                "{} is not classified as {}",
                guid, classification_name
            )));
        }
        let next = version::update(
            &current,
            current.clone().without_classification(classification_name),
            user,
        )?;
        self.composer().replace(&current, next)
    }

    /// Replace the properties of an attached classification
    pub fn update_entity_classification(
        &self,
        user: &str,
        guid: &Guid,
        classification_name: &str,
        properties: Property,
    ) -> Result<Entity> {
        validate_name(classification_name, "classificationName")?;
        let current = self.live_entity(user, guid)?;
        let existing = current.classification(classification_name).ok_or_else(|| {
            Error::Classification(format!(
                "{} is not classified as {}",
                guid, classification_name
            ))
        })?;
        self.types()?
            .validate_properties(classification_name, &properties)?;

        let updated = existing.updated(properties, user);
        let next = version::update(&current, current.clone().with_classification(updated), user)?;
        self.composer().replace(&current, next)
    }

    // ========== Re-identify, Re-type, Re-home ==========

    /// Move an entity to a new GUID, rewriting every relationship that
    /// references it, in one transaction
    pub fn re_identify_entity(&self, user: &str, guid: &Guid, new_guid: &Guid) -> Result<Entity> {
        validate_guid(new_guid, "newEntityGUID")?;
        if new_guid == guid {
            return Err(Error::InvalidParameter(format!(
                "newEntityGUID must differ from {}",
                guid
            )));
        }
        let current = self.entity_for_update(user, guid)?;

        let retired = version::soft_delete(&current, user)?;
        let renamed = version::rekey(
            version::increment_version(&current, current.clone(), user)?,
            new_guid.clone(),
        );
        let unique = self.types()?.unique_properties(current.type_name());
        let endpoint = renamed.to_proxy(&unique);

        let rewrites = self
            .relationships_referencing(guid)?
            .into_iter()
            .map(|rel| {
                let prior_version = rel.version();
                let rewritten = rel.clone().with_endpoint_rewritten(guid, &endpoint);
                Ok(Rewrite {
                    prior_version,
                    next: version::increment_version(&rel, rewritten, user)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.composer()
            .re_identify_entity(&current, retired, renamed, rewrites)
    }

    /// Change the type of an entity, re-checking its properties, status and
    /// classifications against the new type
    pub fn re_type_entity(
        &self,
        user: &str,
        guid: &Guid,
        current_type: &str,
        new_type: &str,
    ) -> Result<Entity> {
        validate_name(current_type, "currentTypeName")?;
        validate_name(new_type, "newTypeName")?;
        let current = self.entity_for_update(user, guid)?;
        if current.type_name() != current_type {
            return Err(Error::TypeMismatch {
                expected: current_type.to_string(),
                found: current.type_name().to_string(),
            });
        }

        let instance_type = {
            let types = self.types()?;
            let instance_type = types.instance_type(new_type, TypeCategory::Entity)?;
            types.validate_properties(new_type, &current.properties)?;
            types.validate_status(new_type, current.status())?;
            for name in current.classifications.keys() {
                types.validate_classification(name, new_type)?;
            }
            instance_type
        };

        let header = InstanceHeader {
            instance_type,
            ..current.header.clone()
        };
        let next = version::update(&current, current.clone().with_header(header), user)?;
        info!(
            "Entity {} re-typed from {} to {} in collection {}",
            guid,
            current_type,
            new_type,
            self.name()
        );
        self.composer().replace(&current, next)
    }

    /// Transfer ownership of an entity to a new home collection
    pub fn re_home_entity(
        &self,
        user: &str,
        guid: &Guid,
        current_home: &CollectionId,
        new_home: &CollectionId,
        new_home_name: &str,
    ) -> Result<Entity> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        validate_name(new_home.as_str(), "newHomeMetadataCollectionId")?;
        let current = self.read_entity(guid, AsOf::now())?.require(guid.as_str())?;
        version::ensure_not_deleted(&current.header)?;
        if &current.header.home != current_home {
            return Err(Error::InvalidParameter(format!(
                "{} is homed in {}, not {}",
                guid, current.header.home, current_home
            )));
        }
        validate_new_home(&current.header, new_home)?;

        let header = InstanceHeader {
            home: new_home.clone(),
            home_name: Some(new_home_name.to_string()),
            provenance: Provenance::Local,
            replicated_by: None,
            ..current.header.clone()
        };
        let next = version::update(&current, current.clone().with_header(header), user)?;
        info!("Entity {} re-homed from {} to {}", guid, current_home, new_home);
        self.composer().replace(&current, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::collection;
    use std::sync::Arc;

    fn asset(coll: &MetadataCollection) -> Entity {
        coll.add_entity("ann", "Asset", Property::with("name", "orders"), vec![], None)
            .unwrap()
    }

    #[test]
    fn test_add_entity() {
        let coll = collection();
        let e = asset(&coll);
        assert_eq!(e.header.version, 1);
        assert_eq!(e.header.status, InstanceStatus::Active);
        assert_eq!(e.header.home, *coll.id());
        assert_eq!(e.header.home_name.as_deref(), Some("test"));
        assert!(e.header.instance_type.is_a("Referenceable"));
    }

    #[test]
    fn test_add_entity_validation() {
        let coll = collection();
        assert!(matches!(
            coll.add_entity("ann", "Missing", Property::new(), vec![], None),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            coll.add_entity("ann", "Lineage", Property::new(), vec![], None),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            coll.add_entity("ann", "Asset", Property::with("colour", "red"), vec![], None),
            Err(Error::PropertyError(_))
        ));
        assert!(matches!(
            coll.add_entity("ann", "Glossary", Property::new(), vec![], Some(InstanceStatus::Deprecated)),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(
            coll.add_entity("ann", "Asset", Property::new(), vec![], Some(InstanceStatus::Deleted)),
            Err(Error::InvalidParameter(_))
        ));
        let wrong = Classification::new("Confidential", coll.id().clone(), "ann");
        assert!(matches!(
            coll.add_entity("ann", "Process", Property::new(), vec![wrong], None),
            Err(Error::Classification(_))
        ));
    }

    #[test]
    fn test_add_entity_with_classifications_and_status() {
        let coll = collection();
        let c = Classification::new("Certified", coll.id().clone(), "ann")
            .with_properties(Property::with("by", "qa"));
        let e = coll
            .add_entity("ann", "Glossary", Property::new(), vec![c], Some(InstanceStatus::Draft))
            .unwrap();
        assert_eq!(e.header.status, InstanceStatus::Draft);
        assert!(e.is_classified_as("Certified"));
    }

    #[test]
    fn test_external_entity_is_mirrored() {
        let coll = collection();
        let source = CollectionId::new("erp");
        let e = coll
            .add_external_entity("ann", "Asset", &source, "ERP", Property::new(), vec![], None)
            .unwrap();
        assert_eq!(e.header.home, source);
        assert_eq!(e.header.provenance, Provenance::ExternalSource);
        assert_eq!(e.header.replicated_by.as_ref(), Some(coll.id()));

        // Mirrored instances may be maintained locally
        let updated = coll
            .update_entity_properties("ann", &e.header.guid, Property::with("name", "x"))
            .unwrap();
        assert_eq!(updated.header.version, 2);
    }

    #[test]
    fn test_reference_copy_cannot_be_updated_locally() {
        let coll = collection();
        let ty = coll
            .catalog()
            .read()
            .unwrap()
            .instance_type("Asset", TypeCategory::Entity)
            .unwrap();
        let copy = Entity::new(InstanceHeader::new(
            Guid::from("remote-e"),
            ty,
            CollectionId::new("remote"),
            "bob",
        ));
        coll.save_entity_reference_copy("ann", copy).unwrap();
        assert!(matches!(
            coll.update_entity_properties("ann", &Guid::from("remote-e"), Property::new()),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_proxy_never_downgrades_full_entity() {
        let coll = collection();
        let e = asset(&coll);
        coll.add_entity_proxy("ann", e.to_proxy(&Vec::new())).unwrap();
        let stored = coll.get_entity_detail("ann", &e.header.guid, AsOf::now()).unwrap();
        assert_eq!(stored, e);
    }

    #[test]
    fn test_classify_delete_restore_scenario() {
        let coll = collection();
        let e1 = coll
            .add_entity("ann", "Asset", Property::new(), vec![], None)
            .unwrap();
        let guid = e1.header.guid.clone();
        assert_eq!(e1.header.version, 1);

        let classified = coll
            .classify_entity("ann", &guid, "Confidential", Property::with("level", 2i64))
            .unwrap();
        assert_eq!(classified.header.version, 2);
        assert_eq!(classified.classifications.len(), 1);

        let deleted = coll.delete_entity("ann", &guid).unwrap();
        assert_eq!(deleted.header.version, 3);
        assert_eq!(deleted.header.status, InstanceStatus::Deleted);
        assert_eq!(deleted.header.status_on_delete, Some(InstanceStatus::Active));

        let restored = coll.restore_entity("ann", &guid).unwrap();
        assert_eq!(restored.header.version, 4);
        assert_eq!(restored.header.status, InstanceStatus::Active);
        assert!(restored.header.status_on_delete.is_none());
        assert!(restored.is_classified_as("Confidential"));
    }

    #[test]
    fn test_status_updates() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();

        let e = coll
            .update_entity_status("ann", &guid, InstanceStatus::Deprecated)
            .unwrap();
        assert_eq!(e.header.status, InstanceStatus::Deprecated);
        assert!(matches!(
            coll.update_entity_status("ann", &guid, InstanceStatus::Deleted),
            Err(Error::InvalidParameter(_))
        ));

        let g = coll
            .add_entity("ann", "Glossary", Property::new(), vec![], None)
            .unwrap();
        assert!(matches!(
            coll.update_entity_status("ann", &g.header.guid, InstanceStatus::Approved),
            Err(Error::TypeError(_))
        ));
    }

    #[test]
    fn test_mutations_on_deleted_entity_rejected() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();
        coll.delete_entity("ann", &guid).unwrap();

        assert!(matches!(coll.delete_entity("ann", &guid), Err(Error::AlreadyDeleted(_))));
        assert!(matches!(
            coll.update_entity_properties("ann", &guid, Property::new()),
            Err(Error::AlreadyDeleted(_))
        ));
        assert!(matches!(
            coll.classify_entity("ann", &guid, "Certified", Property::new()),
            Err(Error::AlreadyDeleted(_))
        ));
        assert!(matches!(
            coll.re_identify_entity("ann", &guid, &Guid::from("new")),
            Err(Error::AlreadyDeleted(_))
        ));
        assert!(matches!(coll.undo_entity_update("ann", &guid), Err(Error::AlreadyDeleted(_))));
    }

    #[test]
    fn test_restore_requires_deleted() {
        let coll = collection();
        let e = asset(&coll);
        assert!(matches!(
            coll.restore_entity("ann", &e.header.guid),
            Err(Error::NotDeleted(_))
        ));
    }

    #[test]
    fn test_undo_entity_update() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();
        assert!(matches!(coll.undo_entity_update("ann", &guid), Err(Error::InvalidState(_))));

        coll.update_entity_properties("ann", &guid, Property::with("name", "changed"))
            .unwrap();
        let undone = coll.undo_entity_update("ann", &guid).unwrap();
        assert_eq!(undone.header.version, 3);
        assert_eq!(undone.properties, Property::with("name", "orders"));
    }

    #[test]
    fn test_purge_active_entity_rejected() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();
        assert!(matches!(coll.purge_entity("ann", &guid), Err(Error::NotDeleted(_))));
        assert_eq!(coll.get_entity_detail("ann", &guid, AsOf::now()).unwrap(), e);
    }

    #[test]
    fn test_purge_cascades_to_relationships() {
        let coll = collection();
        let a = asset(&coll);
        let p = coll
            .add_entity("ann", "Process", Property::new(), vec![], None)
            .unwrap();
        let rel = coll
            .add_relationship("ann", "Lineage", Property::new(), &a.header.guid, &p.header.guid, None)
            .unwrap();

        coll.delete_entity("ann", &a.header.guid).unwrap();
        coll.purge_entity("ann", &a.header.guid).unwrap();

        assert!(coll.is_entity_known("ann", &a.header.guid).unwrap().is_none());
        assert!(coll.is_relationship_known("ann", &rel.header.guid).unwrap().is_none());
        assert!(coll.is_entity_known("ann", &p.header.guid).unwrap().is_some());
    }

    #[test]
    fn test_classification_maintenance() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();

        assert!(matches!(
            coll.declassify_entity("ann", &guid, "Confidential"),
            Err(Error::Classification(_))
        ));
        assert!(matches!(
            coll.update_entity_classification("ann", &guid, "Confidential", Property::new()),
            Err(Error::Classification(_))
        ));
        assert!(matches!(
            coll.classify_entity("ann", &guid, "Unknown", Property::new()),
            Err(Error::Classification(_))
        ));
        assert!(matches!(
            coll.classify_entity("ann", &guid, "Confidential", Property::with("colour", "red")),
            Err(Error::PropertyError(_))
        ));

        coll.classify_entity("ann", &guid, "Confidential", Property::with("level", 1i64))
            .unwrap();
        assert!(matches!(
            coll.classify_entity("ann", &guid, "Confidential", Property::new()),
            Err(Error::Classification(_))
        ));

        let updated = coll
            .update_entity_classification("ann", &guid, "Confidential", Property::with("level", 5i64))
            .unwrap();
        let c = updated.classification("Confidential").unwrap();
        assert_eq!(c.properties, Property::with("level", 5i64));
        assert_eq!(c.updated_by.as_deref(), Some("ann"));

        let declassified = coll.declassify_entity("ann", &guid, "Confidential").unwrap();
        assert!(declassified.classifications.is_empty());
        assert_eq!(declassified.header.version, 4);
    }

    #[test]
    fn test_external_classification() {
        let coll = collection();
        let e = asset(&coll);
        let source = CollectionId::new("dq");
        let origin = ClassificationOrigin::Propagated {
            origin_guid: Guid::from("upstream"),
        };
        let classified = coll
            .classify_entity_from("ann", &e.header.guid, "Certified", Some(&source), origin.clone(), Property::new())
            .unwrap();
        let c = classified.classification("Certified").unwrap();
        assert_eq!(c.home, source);
        assert_eq!(c.provenance, Provenance::ExternalSource);
        assert_eq!(c.replicated_by.as_ref(), Some(coll.id()));
        assert_eq!(c.origin, origin);
        assert!(coll.get_home_classifications("ann", &e.header.guid).unwrap().is_none());
    }

    #[test]
    fn test_re_identify_scenario() {
        let coll = collection();
        let e1 = asset(&coll);
        let e2 = coll
            .add_entity("ann", "Process", Property::new(), vec![], None)
            .unwrap();
        let r = coll
            .add_relationship("ann", "Lineage", Property::new(), &e1.header.guid, &e2.header.guid, None)
            .unwrap();
        assert_eq!(r.header.version, 1);

        let new_guid = Guid::from("e1-prime");
        let renamed = coll.re_identify_entity("ann", &e1.header.guid, &new_guid).unwrap();
        assert_eq!(renamed.header.guid, new_guid);
        assert_eq!(renamed.header.version, 2);
        assert_eq!(renamed.header.re_identified_from.as_ref(), Some(&e1.header.guid));

        let old = coll.is_entity_known("ann", &e1.header.guid).unwrap().unwrap();
        assert_eq!(old.header.status, InstanceStatus::Deleted);
        assert_eq!(old.header.status_on_delete, Some(InstanceStatus::Active));

        let r = coll.get_relationship("ann", &r.header.guid, AsOf::now()).unwrap();
        assert_eq!(r.header.version, 2);
        assert_eq!(r.end_one(), &new_guid);
        assert_eq!(r.end_two(), &e2.header.guid);
    }

    #[test]
    fn test_re_identify_to_taken_guid_changes_nothing() {
        let coll = collection();
        let a = asset(&coll);
        let b = asset(&coll);
        assert!(coll
            .re_identify_entity("ann", &a.header.guid, &b.header.guid)
            .unwrap_err()
            .is_retryable());
        assert_eq!(coll.get_entity_detail("ann", &a.header.guid, AsOf::now()).unwrap(), a);
        assert!(matches!(
            coll.re_identify_entity("ann", &a.header.guid, &a.header.guid),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_re_type_entity() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();
        coll.classify_entity("ann", &guid, "Confidential", Property::new())
            .unwrap();

        assert!(matches!(
            coll.re_type_entity("ann", &guid, "Process", "Table"),
            Err(Error::TypeMismatch { .. })
        ));
        // Confidential only applies to assets
        assert!(matches!(
            coll.re_type_entity("ann", &guid, "Asset", "Process"),
            Err(Error::Classification(_))
        ));

        let table = coll.re_type_entity("ann", &guid, "Asset", "Table").unwrap();
        assert_eq!(table.type_name(), "Table");
        assert!(table.header.instance_type.is_a("Asset"));
        assert_eq!(table.header.version, 3);
    }

    #[test]
    fn test_re_home_entity() {
        let coll = collection();
        let e = asset(&coll);
        let guid = e.header.guid.clone();
        let remote = CollectionId::new("remote");

        assert!(matches!(
            coll.re_home_entity("ann", &guid, coll.id(), coll.id(), "test"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            coll.re_home_entity("ann", &guid, &remote, &CollectionId::new("x"), "x"),
            Err(Error::InvalidParameter(_))
        ));

        let moved = coll.re_home_entity("ann", &guid, coll.id(), &remote, "Remote").unwrap();
        assert_eq!(moved.header.home, remote);
        assert_eq!(moved.header.home_name.as_deref(), Some("Remote"));
        assert_eq!(moved.header.provenance, Provenance::Local);
        assert_eq!(moved.header.version, 2);

        // No longer owned here
        assert!(coll.update_entity_properties("ann", &guid, Property::new()).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_never_lose_versions() {
        let coll = Arc::new(collection());
        let guid = asset(&coll).header.guid.clone();

        let mut handles = Vec::new();
        for i in 0..16i64 {
            let coll = Arc::clone(&coll);
            let guid = guid.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                coll.update_entity_properties("ann", &guid, Property::with("name", format!("n{}", i)))
            }));
        }

        let mut accepted = 0u64;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert!(e.is_retryable()),
            }
        }
        let stored = coll.get_entity_detail("ann", &guid, AsOf::now()).unwrap();
        assert!(accepted >= 1);
        assert_eq!(stored.header.version, 1 + accepted);
    }
}
