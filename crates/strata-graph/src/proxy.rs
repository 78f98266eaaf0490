//! Proxy resolution for relationship endpoints

use crate::collection::MetadataCollection;
use strata_core::validation::{validate_guid, validate_user_id};
use strata_core::{AsOf, EntityProxy, Error, Guid, Instance, Lookup, Result};

impl MetadataCollection {
    /// Resolve an entity GUID to a proxy.
    ///
    /// A stored proxy is returned as is; a full entity is projected onto its
    /// unique properties.
    pub fn resolve_proxy(&self, user: &str, guid: &Guid) -> Result<EntityProxy> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        self.proxy_at(guid, AsOf::now())?
            .ok_or_else(|| Error::NotKnown(guid.to_string()))
    }

    pub(crate) fn proxy_at(&self, guid: &Guid, as_of: AsOf) -> Result<Option<EntityProxy>> {
        let found = self.read_entity(guid, as_of)?;
        let unique = match &found {
            Lookup::Found(entity) => self.types()?.unique_properties(entity.type_name()),
            _ => Vec::new(),
        };
        Ok(found.into_proxy(&unique))
    }

    /// Proxy for a live endpoint of a new relationship
    pub(crate) fn resolve_endpoint(&self, guid: &Guid, parameter: &str) -> Result<EntityProxy> {
        validate_guid(guid, parameter)?;
        let proxy = self
            .proxy_at(guid, AsOf::now())?
            .ok_or_else(|| Error::NotKnown(guid.to_string()))?;
        if proxy.header.is_deleted() {
            return Err(Error::AlreadyDeleted(guid.to_string()));
        }
        Ok(proxy)
    }
}
