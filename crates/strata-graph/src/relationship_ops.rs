//! Relationship lifecycle operations

use crate::collection::MetadataCollection;
use crate::typedef::TypeCategory;
use strata_core::validation::{
    validate_can_update, validate_guid, validate_name, validate_new_home, validate_user_id,
};
use strata_core::version;
use strata_core::{
    AsOf, CollectionId, Error, Guid, Instance, InstanceHeader, InstanceStatus, Property,
    Provenance, Record, Relationship, Result,
};
use tracing::info;

impl MetadataCollection {
    #[allow(clippy::too_many_arguments)]
    fn new_relationship(
        &self,
        user: &str,
        type_name: &str,
        home: CollectionId,
        properties: Property,
        end_one: &Guid,
        end_two: &Guid,
        initial_status: Option<InstanceStatus>,
    ) -> Result<Relationship> {
        validate_user_id(user)?;
        validate_name(type_name, "relationshipTypeName")?;
        let status = initial_status.unwrap_or(InstanceStatus::Active);
        if status.is_deleted() {
            return Err(Error::InvalidParameter(
                "a relationship cannot be created as DELETED".to_string(),
            ));
        }
        let instance_type = {
            let types = self.types()?;
            let instance_type = types.instance_type(type_name, TypeCategory::Relationship)?;
            types.validate_properties(type_name, &properties)?;
            types.validate_status(type_name, status)?;
            instance_type
        };

        let one = self.resolve_endpoint(end_one, "entityOneGUID")?;
        let two = self.resolve_endpoint(end_two, "entityTwoGUID")?;
        self.types()?
            .validate_relationship_ends(type_name, one.type_name(), two.type_name())?;

        let header = InstanceHeader {
            status,
            ..InstanceHeader::new(Guid::new(), instance_type, home, user)
        };
        Ok(Relationship::new(header, one, two).with_properties(properties))
    }

    // ========== Create ==========

    /// Create a relationship homed in this collection between two live entities
    pub fn add_relationship(
        &self,
        user: &str,
        type_name: &str,
        properties: Property,
        end_one: &Guid,
        end_two: &Guid,
        initial_status: Option<InstanceStatus>,
    ) -> Result<Relationship> {
        let mut rel = self.new_relationship(
            user,
            type_name,
            self.id().clone(),
            properties,
            end_one,
            end_two,
            initial_status,
        )?;
        rel.header.home_name = Some(self.name().to_string());
        self.composer().create(rel)
    }

    /// Create a relationship owned by an external source and mirrored here
    #[allow(clippy::too_many_arguments)]
    pub fn add_external_relationship(
        &self,
        user: &str,
        type_name: &str,
        external_source: &CollectionId,
        external_source_name: &str,
        properties: Property,
        end_one: &Guid,
        end_two: &Guid,
        initial_status: Option<InstanceStatus>,
    ) -> Result<Relationship> {
        validate_name(external_source.as_str(), "externalSourceGUID")?;
        let mut rel = self.new_relationship(
            user,
            type_name,
            external_source.clone(),
            properties,
            end_one,
            end_two,
            initial_status,
        )?;
        rel.header.home_name = Some(external_source_name.to_string());
        rel.header.provenance = Provenance::ExternalSource;
        rel.header.replicated_by = Some(self.id().clone());
        self.composer().create(rel)
    }

    // ========== Update ==========

    /// Move a relationship to another non-deleted status
    pub fn update_relationship_status(
        &self,
        user: &str,
        guid: &Guid,
        status: InstanceStatus,
    ) -> Result<Relationship> {
        if status.is_deleted() {
            return Err(Error::InvalidParameter(
                "use delete_relationship to delete a relationship".to_string(),
            ));
        }
        let current = self.relationship_for_update(user, guid)?;
        self.types()?.validate_status(current.type_name(), status)?;
        let next = version::change_status(&current, status, user)?;
        self.composer().replace(&current, next)
    }

    /// Replace the properties of a relationship
    pub fn update_relationship_properties(
        &self,
        user: &str,
        guid: &Guid,
        properties: Property,
    ) -> Result<Relationship> {
        let current = self.relationship_for_update(user, guid)?;
        self.types()?
            .validate_properties(current.type_name(), &properties)?;
        let next = version::update(&current, current.clone().with_properties(properties), user)?;
        self.composer().replace(&current, next)
    }

    /// Bring back the content of the previous version as a new version
    pub fn undo_relationship_update(&self, user: &str, guid: &Guid) -> Result<Relationship> {
        let current = self.relationship_for_update(user, guid)?;
        let previous = self.previous_revision(guid, Record::into_relationship)?;
        version::ensure_not_deleted(&previous.header)?;
        let next = version::increment_version(&current, previous, user)?;
        self.composer().replace(&current, next)
    }

    // ========== Delete, Restore, Purge ==========

    /// Soft-delete a relationship
    pub fn delete_relationship(&self, user: &str, guid: &Guid) -> Result<Relationship> {
        let current = self.relationship_for_update(user, guid)?;
        let next = version::soft_delete(&current, user)?;
        self.composer().replace(&current, next)
    }

    /// Restore a soft-deleted relationship to the status it held before deletion
    pub fn restore_relationship(&self, user: &str, guid: &Guid) -> Result<Relationship> {
        validate_user_id(user)?;
        validate_guid(guid, "deletedRelationshipGUID")?;
        let current = self
            .read_relationship(guid, AsOf::now())?
            .require(guid.as_str())?;
        validate_can_update(&current.header, self.id())?;
        let next = version::restore(&current, user)?;
        self.composer().replace(&current, next)
    }

    /// Remove every revision of a soft-deleted relationship
    pub fn purge_relationship(&self, user: &str, guid: &Guid) -> Result<()> {
        validate_user_id(user)?;
        validate_guid(guid, "deletedRelationshipGUID")?;
        let current = self
            .read_relationship(guid, AsOf::now())?
            .require(guid.as_str())?;
        version::ensure_deleted(&current.header)?;
        validate_can_update(&current.header, self.id())?;
        self.composer().purge(guid, Vec::new())
    }

    // ========== Re-identify, Re-type, Re-home ==========

    /// Move a relationship to a new GUID in one transaction
    pub fn re_identify_relationship(
        &self,
        user: &str,
        guid: &Guid,
        new_guid: &Guid,
    ) -> Result<Relationship> {
        validate_guid(new_guid, "newRelationshipGUID")?;
        if new_guid == guid {
            return Err(Error::InvalidParameter(format!(
                "newRelationshipGUID must differ from {}",
                guid
            )));
        }
        let current = self.relationship_for_update(user, guid)?;
        let retired = version::soft_delete(&current, user)?;
        let renamed = version::rekey(
            version::increment_version(&current, current.clone(), user)?,
            new_guid.clone(),
        );
        self.composer()
            .re_identify_relationship(&current, retired, renamed)
    }

    /// Change the type of a relationship, re-checking its properties, status
    /// and endpoint types against the new type
    pub fn re_type_relationship(
        &self,
        user: &str,
        guid: &Guid,
        current_type: &str,
        new_type: &str,
    ) -> Result<Relationship> {
        validate_name(current_type, "currentTypeName")?;
        validate_name(new_type, "newTypeName")?;
        let current = self.relationship_for_update(user, guid)?;
        if current.type_name() != current_type {
            return Err(Error::TypeMismatch {
                expected: current_type.to_string(),
                found: current.type_name().to_string(),
            });
        }

        let instance_type = {
            let types = self.types()?;
            let instance_type = types.instance_type(new_type, TypeCategory::Relationship)?;
            types.validate_properties(new_type, &current.properties)?;
            types.validate_status(new_type, current.status())?;
            types.validate_relationship_ends(
                new_type,
                current.entity_one_proxy.type_name(),
                current.entity_two_proxy.type_name(),
            )?;
            instance_type
        };

        let header = InstanceHeader {
            instance_type,
            ..current.header.clone()
        };
        let next = version::update(&current, current.clone().with_header(header), user)?;
        info!(
            "Relationship {} re-typed from {} to {} in collection {}",
            guid,
            current_type,
            new_type,
            self.name()
        );
        self.composer().replace(&current, next)
    }

    /// Transfer ownership of a relationship to a new home collection
    pub fn re_home_relationship(
        &self,
        user: &str,
        guid: &Guid,
        current_home: &CollectionId,
        new_home: &CollectionId,
        new_home_name: &str,
    ) -> Result<Relationship> {
        validate_user_id(user)?;
        validate_guid(guid, "relationshipGUID")?;
        validate_name(new_home.as_str(), "newHomeMetadataCollectionId")?;
        let current = self
            .read_relationship(guid, AsOf::now())?
            .require(guid.as_str())?;
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
        info!(
            "Relationship {} re-homed from {} to {}",
            guid, current_home, new_home
        );
        self.composer().replace(&current, next)
    }
}
