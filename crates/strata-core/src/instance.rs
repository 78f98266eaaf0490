//! Instance model for Strata
//!
//! Defines entities, entity proxies, relationships and classifications, plus
//! the header every versioned instance carries.
//!
//! Values are never mutated in place once read: a new revision is built from
//! the prior value through the consuming `with_*` constructors.

use crate::id::{CollectionId, Guid};
use crate::property::Property;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Draft,
    Prepared,
    Proposed,
    Approved,
    Rejected,
    Active,
    Deprecated,
    Other,
    Deleted,
}

impl InstanceStatus {
    /// Every status that is not `Deleted`
    pub const LIVE: [InstanceStatus; 8] = [
        InstanceStatus::Draft,
        InstanceStatus::Prepared,
        InstanceStatus::Proposed,
        InstanceStatus::Approved,
        InstanceStatus::Rejected,
        InstanceStatus::Active,
        InstanceStatus::Deprecated,
        InstanceStatus::Other,
    ];

    /// Returns true for the soft-deleted status
    pub fn is_deleted(self) -> bool {
        self == InstanceStatus::Deleted
    }

    /// Upper-case name of the status
    pub fn name(self) -> &'static str {
        match self {
            InstanceStatus::Draft => "DRAFT",
            InstanceStatus::Prepared => "PREPARED",
            InstanceStatus::Proposed => "PROPOSED",
            InstanceStatus::Approved => "APPROVED",
            InstanceStatus::Rejected => "REJECTED",
            InstanceStatus::Active => "ACTIVE",
            InstanceStatus::Deprecated => "DEPRECATED",
            InstanceStatus::Other => "OTHER",
            InstanceStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an instance originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Owned by a collection in the local cohort
    Local,
    /// Owned by a system outside the cohort and mirrored here
    ExternalSource,
}

/// Type reference carried by every instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceType {
    /// Name of the type
    pub name: String,

    /// Names of every supertype, nearest first
    pub supertypes: Vec<String>,
}

impl InstanceType {
    /// Create a type reference with no supertypes
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
        }
    }

    /// Create a type reference with its supertype chain
    pub fn with_supertypes<S: Into<String>>(name: S, supertypes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            supertypes,
        }
    }

    /// Check if this type is `name` or a subtype of it
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.supertypes.iter().any(|s| s == name)
    }
}

/// Identity, ownership, versioning and audit fields shared by every instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHeader {
    pub guid: Guid,
    pub instance_type: InstanceType,

    /// Collection that owns this instance
    pub home: CollectionId,
    pub home_name: Option<String>,
    pub provenance: Provenance,

    /// Collection that mirrors an externally owned instance
    pub replicated_by: Option<CollectionId>,

    pub version: u64,
    pub status: InstanceStatus,

    /// Status held immediately before a soft delete
    pub status_on_delete: Option<InstanceStatus>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,

    /// Previous GUID, set only by the re-identify that produced this instance
    pub re_identified_from: Option<Guid>,
}

impl InstanceHeader {
    /// Create a header for a brand new, locally owned, active instance
    pub fn new(guid: Guid, instance_type: InstanceType, home: CollectionId, user: &str) -> Self {
        Self {
            guid,
            instance_type,
            home,
            home_name: None,
            provenance: Provenance::Local,
            replicated_by: None,
            version: 1,
            status: InstanceStatus::Active,
            status_on_delete: None,
            created_by: user.to_string(),
            created_at: Utc::now(),
            updated_by: None,
            updated_at: None,
            re_identified_from: None,
        }
    }

    /// Returns true if the instance is soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }

    /// Returns true if `collection` owns this instance
    pub fn is_homed_in(&self, collection: &CollectionId) -> bool {
        &self.home == collection
    }

    /// Timestamp of the latest change
    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// Common access to the header and properties of an instance
pub trait Instance: Clone {
    /// The instance header
    fn header(&self) -> &InstanceHeader;

    /// Build a new value carrying `header`
    fn with_header(self, header: InstanceHeader) -> Self;

    /// Free-form properties
    fn properties(&self) -> &Property;

    /// Build a new value carrying `properties`
    fn with_properties(self, properties: Property) -> Self;

    fn guid(&self) -> &Guid {
        &self.header().guid
    }

    fn version(&self) -> u64 {
        self.header().version
    }

    fn status(&self) -> InstanceStatus {
        self.header().status
    }

    fn type_name(&self) -> &str {
        &self.header().instance_type.name
    }
}

/// Origin of a classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationOrigin {
    /// Assigned directly to the entity
    Assigned,
    /// Propagated from another instance
    Propagated { origin_guid: Guid },
}

/// A named classification attached to exactly one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    pub origin: ClassificationOrigin,
    pub home: CollectionId,
    pub provenance: Provenance,
    pub replicated_by: Option<CollectionId>,
    pub properties: Property,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Classification {
    /// Create a locally owned, assigned classification
    pub fn new<S: Into<String>>(name: S, home: CollectionId, user: &str) -> Self {
        Self {
            name: name.into(),
            origin: ClassificationOrigin::Assigned,
            home,
            provenance: Provenance::Local,
            replicated_by: None,
            properties: Property::new(),
            created_by: user.to_string(),
            created_at: Utc::now(),
            updated_by: None,
            updated_at: None,
        }
    }

    /// Builder: set the properties
    pub fn with_properties(mut self, properties: Property) -> Self {
        self.properties = properties;
        self
    }

    /// Builder: set the origin
    pub fn with_origin(mut self, origin: ClassificationOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Build the next state of this classification with new properties
    pub fn updated(&self, properties: Property, user: &str) -> Self {
        Self {
            properties,
            updated_by: Some(user.to_string()),
            updated_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}

/// A typed vertex in the metadata graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub header: InstanceHeader,
    pub properties: Property,

    /// Classifications keyed by name (at most one per name)
    pub classifications: BTreeMap<String, Classification>,
}

impl Entity {
    /// Create an entity with no properties or classifications
    pub fn new(header: InstanceHeader) -> Self {
        Self {
            header,
            properties: Property::new(),
            classifications: BTreeMap::new(),
        }
    }

    /// Look up a classification by name
    pub fn classification(&self, name: &str) -> Option<&Classification> {
        self.classifications.get(name)
    }

    /// Returns true if a classification with this name is attached
    pub fn is_classified_as(&self, name: &str) -> bool {
        self.classifications.contains_key(name)
    }

    /// Build a new value with `classification` attached (replacing any of the same name)
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classifications
            .insert(classification.name.clone(), classification);
        self
    }

    /// Build a new value with the named classification removed
    pub fn without_classification(mut self, name: &str) -> Self {
        self.classifications.remove(name);
        self
    }

    /// Project this entity to a proxy keeping only the named properties
    pub fn to_proxy<'a, I>(&self, unique_properties: I) -> EntityProxy
    where
        I: IntoIterator<Item = &'a String>,
    {
        EntityProxy {
            header: self.header.clone(),
            unique_properties: self.properties.project(unique_properties),
        }
    }
}

impl Instance for Entity {
    fn header(&self) -> &InstanceHeader {
        &self.header
    }

    fn with_header(self, header: InstanceHeader) -> Self {
        Self { header, ..self }
    }

    fn properties(&self) -> &Property {
        &self.properties
    }

    fn with_properties(self, properties: Property) -> Self {
        Self { properties, ..self }
    }
}

/// Reduced projection of an entity used for relationship endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProxy {
    pub header: InstanceHeader,

    /// Key properties identifying the entity
    pub unique_properties: Property,
}

impl EntityProxy {
    /// Create a proxy from a header alone
    pub fn new(header: InstanceHeader) -> Self {
        Self {
            header,
            unique_properties: Property::new(),
        }
    }

    /// Expand into a placeholder entity carrying only the key properties
    pub fn into_entity(self) -> Entity {
        Entity {
            header: self.header,
            properties: self.unique_properties,
            classifications: BTreeMap::new(),
        }
    }
}

impl Instance for EntityProxy {
    fn header(&self) -> &InstanceHeader {
        &self.header
    }

    fn with_header(self, header: InstanceHeader) -> Self {
        Self { header, ..self }
    }

    fn properties(&self) -> &Property {
        &self.unique_properties
    }

    fn with_properties(self, unique_properties: Property) -> Self {
        Self {
            unique_properties,
            ..self
        }
    }
}

/// A typed, directed connection between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub header: InstanceHeader,
    pub properties: Property,
    pub entity_one_proxy: EntityProxy,
    pub entity_two_proxy: EntityProxy,
}

impl Relationship {
    /// Create a relationship between two endpoints
    pub fn new(header: InstanceHeader, one: EntityProxy, two: EntityProxy) -> Self {
        Self {
            header,
            properties: Property::new(),
            entity_one_proxy: one,
            entity_two_proxy: two,
        }
    }

    /// GUID of endpoint one
    pub fn end_one(&self) -> &Guid {
        &self.entity_one_proxy.header.guid
    }

    /// GUID of endpoint two
    pub fn end_two(&self) -> &Guid {
        &self.entity_two_proxy.header.guid
    }

    /// Check if either endpoint references `guid`
    pub fn references(&self, guid: &Guid) -> bool {
        self.end_one() == guid || self.end_two() == guid
    }

    /// Get the endpoint at the other end from `guid`
    pub fn other_end(&self, guid: &Guid) -> Option<&EntityProxy> {
        if self.end_one() == guid {
            Some(&self.entity_two_proxy)
        } else if self.end_two() == guid {
            Some(&self.entity_one_proxy)
        } else {
            None
        }
    }

    /// Build a new value with every endpoint referencing `old` replaced by `proxy`
    pub fn with_endpoint_rewritten(self, old: &Guid, proxy: &EntityProxy) -> Self {
        let entity_one_proxy = if self.end_one() == old {
            proxy.clone()
        } else {
            self.entity_one_proxy
        };
        let entity_two_proxy = if self.entity_two_proxy.header.guid == *old {
            proxy.clone()
        } else {
            self.entity_two_proxy
        };
        Self {
            entity_one_proxy,
            entity_two_proxy,
            ..self
        }
    }
}

impl Instance for Relationship {
    fn header(&self) -> &InstanceHeader {
        &self.header
    }

    fn with_header(self, header: InstanceHeader) -> Self {
        Self { header, ..self }
    }

    fn properties(&self) -> &Property {
        &self.properties
    }

    fn with_properties(self, properties: Property) -> Self {
        Self { properties, ..self }
    }
}

/// Kind of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Entity,
    Proxy,
    Relationship,
}

/// One persisted record keyed by GUID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Entity(Entity),
    Proxy(EntityProxy),
    Relationship(Relationship),
}

impl Record {
    /// Header regardless of record kind
    pub fn header(&self) -> &InstanceHeader {
        match self {
            Record::Entity(e) => &e.header,
            Record::Proxy(p) => &p.header,
            Record::Relationship(r) => &r.header,
        }
    }

    /// GUID of the record
    pub fn guid(&self) -> &Guid {
        &self.header().guid
    }

    /// Kind of the record
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Entity(_) => RecordKind::Entity,
            Record::Proxy(_) => RecordKind::Proxy,
            Record::Relationship(_) => RecordKind::Relationship,
        }
    }

    /// Properties regardless of record kind
    pub fn properties(&self) -> &Property {
        match self {
            Record::Entity(e) => &e.properties,
            Record::Proxy(p) => &p.unique_properties,
            Record::Relationship(r) => &r.properties,
        }
    }

    /// Returns true for records that stand for an entity (full or proxy)
    pub fn is_entity_like(&self) -> bool {
        matches!(self, Record::Entity(_) | Record::Proxy(_))
    }

    /// Endpoint GUIDs when the record is a relationship
    pub fn endpoints(&self) -> Option<(&Guid, &Guid)> {
        match self {
            Record::Relationship(r) => Some((r.end_one(), r.end_two())),
            _ => None,
        }
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Record::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_relationship(self) -> Option<Relationship> {
        match self {
            Record::Relationship(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Entity> for Record {
    fn from(entity: Entity) -> Self {
        Record::Entity(entity)
    }
}

impl From<EntityProxy> for Record {
    fn from(proxy: EntityProxy) -> Self {
        Record::Proxy(proxy)
    }
}

impl From<Relationship> for Record {
    fn from(rel: Relationship) -> Self {
        Record::Relationship(rel)
    }
}

/// A set of entities and the relationships connecting them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl InstanceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph holding a single entity and no relationships
    pub fn from_entity(entity: Entity) -> Self {
        Self {
            entities: vec![entity],
            relationships: Vec::new(),
        }
    }

    /// Check if the graph holds nothing
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// GUIDs of the entities, in graph order
    pub fn entity_guids(&self) -> Vec<&Guid> {
        self.entities.iter().map(|e| &e.header.guid).collect()
    }

    /// GUIDs of the relationships, in graph order
    pub fn relationship_guids(&self) -> Vec<&Guid> {
        self.relationships.iter().map(|r| &r.header.guid).collect()
    }

    /// Sort both sides by GUID
    pub fn sorted(mut self) -> Self {
        self.entities.sort_by(|a, b| a.header.guid.cmp(&b.header.guid));
        self.relationships
            .sort_by(|a, b| a.header.guid.cmp(&b.header.guid));
        self
    }
}
