//! Graph traversal: neighborhoods, linking paths and related entities
//!
//! Every traversal reads the store at one point in time. Proxies are walked
//! through but never returned, and results are ordered by GUID.

use crate::collection::MetadataCollection;
use crate::typedef::TypeCategory;
use strata_core::validation::{validate_as_of, validate_depth, validate_guid, validate_user_id};
use strata_core::{
    AsOf, Entity, Error, Guid, InstanceGraph, InstanceHeader, InstanceStatus, Lookup, Page, Record,
    Relationship, Result, Sequencing,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Filters applied to the entities and relationships a traversal returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborhoodFilter {
    /// Accepted entity types and their subtypes (empty = all)
    pub entity_types: Vec<String>,

    /// Accepted relationship types and their subtypes (empty = all)
    pub relationship_types: Vec<String>,

    /// Accepted statuses (empty = every status except DELETED)
    pub statuses: Vec<InstanceStatus>,

    /// Entities must carry at least one of these (empty = no restriction)
    pub classifications: Vec<String>,

    pub as_of: AsOf,
}

impl NeighborhoodFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_types(mut self, names: &[&str]) -> Self {
        self.entity_types = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn relationship_types(mut self, names: &[&str]) -> Self {
        self.relationship_types = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn statuses(mut self, statuses: &[InstanceStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn classifications(mut self, names: &[&str]) -> Self {
        self.classifications = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn as_of(mut self, as_of: AsOf) -> Self {
        self.as_of = as_of;
        self
    }

    fn status_accepted(&self, header: &InstanceHeader) -> bool {
        if self.statuses.is_empty() {
            !header.is_deleted()
        } else {
            self.statuses.contains(&header.status)
        }
    }

    fn type_accepted(names: &[String], header: &InstanceHeader) -> bool {
        names.is_empty() || names.iter().any(|n| header.instance_type.is_a(n))
    }

    fn accepts_relationship(&self, rel: &Relationship) -> bool {
        self.status_accepted(&rel.header)
            && Self::type_accepted(&self.relationship_types, &rel.header)
    }

    fn accepts_entity(&self, entity: &Entity) -> bool {
        self.status_accepted(&entity.header)
            && Self::type_accepted(&self.entity_types, &entity.header)
            && (self.classifications.is_empty()
                || self
                    .classifications
                    .iter()
                    .any(|c| entity.is_classified_as(c)))
    }

    /// Proxies only carry a header, so only their status is checked
    fn accepts_proxy(&self, header: &InstanceHeader) -> bool {
        self.status_accepted(header)
    }
}

/// A node reached by a traversal
enum Node {
    Full(Entity),
    Proxy,
}

/// Breadth-first walker over the relationships visible at one point in time
struct Walker<'a> {
    collection: &'a MetadataCollection,
    filter: &'a NeighborhoodFilter,
}

impl<'a> Walker<'a> {
    /// Accepted relationships leaving `guid` with the accepted node at their far end
    fn step(&self, guid: &Guid) -> Result<Vec<(Relationship, Guid, Node)>> {
        let mut out = Vec::new();
        for hop in self.collection.store().traverse(guid, self.filter.as_of)? {
            if !self.filter.accepts_relationship(&hop.relationship) {
                continue;
            }
            let Some(other) = hop.relationship.other_end(guid).map(|p| p.header.guid.clone())
            else {
                continue;
            };
            let node = match hop.neighbor {
                Some(Record::Entity(entity)) if self.filter.accepts_entity(&entity) => {
                    Node::Full(entity)
                }
                Some(Record::Proxy(proxy)) if self.filter.accepts_proxy(&proxy.header) => {
                    Node::Proxy
                }
                _ => continue,
            };
            out.push((hop.relationship, other, node));
        }
        Ok(out)
    }

    /// Levels reached from `start`, up to `max_depth` hops
    fn distances(&self, start: &Guid, max_depth: usize) -> Result<HashMap<Guid, usize>> {
        let mut dist = HashMap::from([(start.clone(), 0)]);
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(guid) = queue.pop_front() {
            let level = dist[&guid];
            if level >= max_depth {
                continue;
            }
            for (_, other, _) in self.step(&guid)? {
                if !dist.contains_key(&other) {
                    dist.insert(other.clone(), level + 1);
                    queue.push_back(other);
                }
            }
        }
        Ok(dist)
    }
}

impl MetadataCollection {
    /// Start node of a traversal: a full entity that is not deleted
    fn traversal_start(&self, guid: &Guid, as_of: AsOf) -> Result<Entity> {
        let entity = match self.read_entity(guid, as_of)? {
            Lookup::Found(entity) => entity,
            Lookup::ProxyOnly(_) => return Err(Error::ProxyOnly(guid.to_string())),
            Lookup::NotFound => return Err(Error::NotKnown(guid.to_string())),
        };
        if entity.header.is_deleted() {
            return Err(Error::AlreadyDeleted(guid.to_string()));
        }
        Ok(entity)
    }

    fn check_filter(&self, filter: &NeighborhoodFilter) -> Result<()> {
        validate_as_of(&filter.as_of)?;
        let types = self.types()?;
        for name in &filter.entity_types {
            types.require(name, TypeCategory::Entity)?;
        }
        for name in &filter.relationship_types {
            types.require(name, TypeCategory::Relationship)?;
        }
        for name in &filter.classifications {
            types.require(name, TypeCategory::Classification)?;
        }
        Ok(())
    }

    fn max_depth(&self, depth: i32) -> usize {
        match usize::try_from(depth) {
            Ok(bounded) => bounded,
            Err(_) => self.config().max_traversal_depth.unwrap_or(usize::MAX),
        }
    }

    /// Entities and relationships within `depth` hops of an entity
    ///
    /// `depth` 0 returns only the start entity and -1 walks until nothing
    /// new is reachable. The start entity is always part of the result.
    pub fn get_entity_neighborhood(
        &self,
        user: &str,
        guid: &Guid,
        filter: &NeighborhoodFilter,
        depth: i32,
    ) -> Result<InstanceGraph> {
        validate_user_id(user)?;
        validate_guid(guid, "entityGUID")?;
        validate_depth(depth)?;
        self.check_filter(filter)?;
        let start = self.traversal_start(guid, filter.as_of)?;
        let max_depth = self.max_depth(depth);

        let walker = Walker { collection: self, filter };
        let mut level: HashMap<Guid, usize> = HashMap::from([(guid.clone(), 0)]);
        let mut entities = BTreeMap::from([(guid.clone(), start)]);
        let mut relationships = BTreeMap::new();
        let mut queue = VecDeque::from([guid.clone()]);

        while let Some(current) = queue.pop_front() {
            let current_level = level[&current];
            if current_level >= max_depth {
                continue;
            }
            for (rel, other, node) in walker.step(&current)? {
                relationships.entry(rel.header.guid.clone()).or_insert(rel);
                if level.contains_key(&other) {
                    continue;
                }
                level.insert(other.clone(), current_level + 1);
                if let Node::Full(entity) = node {
                    entities.insert(other.clone(), entity);
                }
                queue.push_back(other);
            }
        }

        debug!(
            "Neighborhood of {} at depth {}: {} entities, {} relationships",
            guid,
            depth,
            entities.len(),
            relationships.len()
        );
        Ok(InstanceGraph {
            entities: entities.into_values().collect(),
            relationships: relationships.into_values().collect(),
        })
    }

    /// Entities and relationships on the shortest paths between two entities
    ///
    /// Returns `None` when no path connects them.
    pub fn get_linking_entities(
        &self,
        user: &str,
        start: &Guid,
        end: &Guid,
        statuses: &[InstanceStatus],
        as_of: AsOf,
    ) -> Result<Option<InstanceGraph>> {
        validate_user_id(user)?;
        validate_guid(start, "startEntityGUID")?;
        validate_guid(end, "endEntityGUID")?;
        validate_as_of(&as_of)?;

        let start_entity = self.traversal_start(start, as_of)?;
        if start == end {
            return Ok(Some(InstanceGraph::from_entity(start_entity)));
        }
        let end_entity = self.traversal_start(end, as_of)?;

        let filter = NeighborhoodFilter::new().statuses(statuses).as_of(as_of);
        let walker = Walker { collection: self, filter: &filter };
        let from_start = walker.distances(start, usize::MAX)?;
        let Some(&length) = from_start.get(end) else {
            debug!("No path links {} and {}", start, end);
            return Ok(None);
        };
        let from_end = walker.distances(end, length)?;

        let on_path = |guid: &Guid| match (from_start.get(guid), from_end.get(guid)) {
            (Some(s), Some(e)) => s + e == length,
            _ => false,
        };

        let mut entities = BTreeMap::from([
            (start.clone(), start_entity),
            (end.clone(), end_entity),
        ]);
        let mut relationships = BTreeMap::new();
        for (guid, &s) in &from_start {
            if !on_path(guid) || guid == end {
                continue;
            }
            for (rel, other, node) in walker.step(guid)? {
                let advances = from_end.get(&other).is_some_and(|e| s + 1 + e == length);
                if !advances {
                    continue;
                }
                relationships.entry(rel.header.guid.clone()).or_insert(rel);
                if let Node::Full(entity) = node {
                    entities.entry(other).or_insert(entity);
                }
            }
        }

        Ok(Some(InstanceGraph {
            entities: entities.into_values().collect(),
            relationships: relationships.into_values().collect(),
        }))
    }

    /// Every entity reachable from `start`, sequenced and paged
    pub fn get_related_entities(
        &self,
        user: &str,
        start: &Guid,
        filter: &NeighborhoodFilter,
        sequencing: &Sequencing,
        from_element: usize,
        page_size: usize,
    ) -> Result<Option<Vec<Entity>>> {
        sequencing.validate()?;
        let page = Page::new(from_element, self.page_size(page_size)?);
        let mut entities = self
            .get_entity_neighborhood(user, start, filter, -1)?
            .entities;
        sequencing.sort(&mut entities, |e| (&e.header, &e.properties));
        let entities = page.apply(entities);
        Ok((!entities.is_empty()).then_some(entities))
    }
}
