//! Property, classification and text search
//!
//! Every search compiles to one `InstanceQuery` evaluated by the store
//! against the records visible at the requested time. An empty result is
//! reported as `None`.

use crate::collection::MetadataCollection;
use crate::typedef::TypeCategory;
use strata_core::validation::{validate_as_of, validate_name, validate_user_id};
use strata_core::{
    AsOf, ClassificationCondition, Entity, InstanceQuery, InstanceStatus, MatchCriteria, Page,
    Property, PropertyCondition, Record, RecordKind, Relationship, Result, SearchClassifications,
    SearchProperties, Sequencing, TextPattern,
};

/// Type, status, time, sequencing and paging limits shared by every search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Restrict to this type and its subtypes
    pub type_name: Option<String>,

    /// Restrict to any of these types and their subtypes
    pub subtype_names: Vec<String>,

    /// Accepted statuses (empty = every status except DELETED)
    pub statuses: Vec<InstanceStatus>,

    pub as_of: AsOf,
    pub sequencing: Sequencing,

    /// Offset of the first result to return
    pub from_element: usize,

    /// Results per page (0 = the configured default)
    pub page_size: usize,
}

impl FindOptions {
    /// Create options with no restrictions
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict results to a type and its subtypes
    pub fn of_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    /// Restrict results to any of the given types
    pub fn with_subtypes(mut self, names: &[&str]) -> Self {
        self.subtype_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Restrict results to the given statuses
    pub fn with_statuses(mut self, statuses: &[InstanceStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Search the state as of a point in time
    pub fn as_of(mut self, as_of: AsOf) -> Self {
        self.as_of = as_of;
        self
    }

    /// Order the results
    pub fn sequenced_by(mut self, sequencing: Sequencing) -> Self {
        self.sequencing = sequencing;
        self
    }

    /// Return one page of the results
    pub fn page(mut self, from_element: usize, page_size: usize) -> Self {
        self.from_element = from_element;
        self.page_size = page_size;
        self
    }
}

fn equality(properties: &Property, criteria: MatchCriteria) -> Option<SearchProperties> {
    if properties.is_empty() {
        return None;
    }
    let conditions = properties
        .iter()
        .map(|(name, value)| PropertyCondition::equals(name.clone(), value.clone()))
        .collect();
    Some(SearchProperties::new(conditions, criteria))
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

impl MetadataCollection {
    /// Apply the shared options to a query, checking them first
    pub(crate) fn build_query(
        &self,
        mut query: InstanceQuery,
        options: &FindOptions,
    ) -> Result<InstanceQuery> {
        validate_as_of(&options.as_of)?;
        let category = match query.kind {
            RecordKind::Relationship => TypeCategory::Relationship,
            RecordKind::Entity | RecordKind::Proxy => TypeCategory::Entity,
        };
        {
            let types = self.types()?;
            for name in options.type_name.iter().chain(&options.subtype_names) {
                types.require(name, category)?;
            }
        }

        query.type_name = options.type_name.clone();
        query.subtype_names = options.subtype_names.clone();
        query.statuses = options.statuses.clone();
        query.sequencing = options.sequencing.clone();
        query.page = Page::new(options.from_element, self.page_size(options.page_size)?);
        query.validate()?;
        Ok(query)
    }

    fn run_entity_query(&self, query: InstanceQuery, options: &FindOptions) -> Result<Option<Vec<Entity>>> {
        let query = self.build_query(query, options)?;
        let found = self
            .store()
            .query(&query, options.as_of)?
            .into_iter()
            .filter_map(Record::into_entity)
            .collect();
        Ok(non_empty(found))
    }

    fn run_relationship_query(
        &self,
        query: InstanceQuery,
        options: &FindOptions,
    ) -> Result<Option<Vec<Relationship>>> {
        let query = self.build_query(query, options)?;
        let found = self
            .store()
            .query(&query, options.as_of)?
            .into_iter()
            .filter_map(Record::into_relationship)
            .collect();
        Ok(non_empty(found))
    }

    // ========== Entity Search ==========

    /// Entities matching a property predicate and classification conditions
    pub fn find_entities(
        &self,
        user: &str,
        properties: Option<SearchProperties>,
        classifications: Option<SearchClassifications>,
        options: &FindOptions,
    ) -> Result<Option<Vec<Entity>>> {
        validate_user_id(user)?;
        let mut query = InstanceQuery::entities();
        query.properties = properties;
        query.classifications = classifications;
        self.run_entity_query(query, options)
    }

    /// Entities whose properties equal the given values
    pub fn find_entities_by_property(
        &self,
        user: &str,
        properties: &Property,
        criteria: MatchCriteria,
        options: &FindOptions,
    ) -> Result<Option<Vec<Entity>>> {
        validate_user_id(user)?;
        let mut query = InstanceQuery::entities();
        query.properties = equality(properties, criteria);
        self.run_entity_query(query, options)
    }

    /// Entities carrying a classification whose properties equal the given values
    pub fn find_entities_by_classification(
        &self,
        user: &str,
        classification_name: &str,
        properties: &Property,
        criteria: MatchCriteria,
        options: &FindOptions,
    ) -> Result<Option<Vec<Entity>>> {
        validate_user_id(user)?;
        validate_name(classification_name, "classificationName")?;
        self.types()?
            .require(classification_name, TypeCategory::Classification)?;

        let mut condition = ClassificationCondition::new(classification_name);
        if let Some(props) = equality(properties, criteria) {
            condition = condition.with_properties(props);
        }
        let mut query = InstanceQuery::entities();
        query.classifications = Some(SearchClassifications::new(
            vec![condition],
            MatchCriteria::All,
        ));
        self.run_entity_query(query, options)
    }

    /// Entities with any string property matching a regular expression
    pub fn find_entities_by_property_value(
        &self,
        user: &str,
        search_criteria: &str,
        options: &FindOptions,
    ) -> Result<Option<Vec<Entity>>> {
        validate_user_id(user)?;
        let mut query = InstanceQuery::entities();
        query.text = Some(TextPattern::new(search_criteria)?);
        self.run_entity_query(query, options)
    }

    // ========== Relationship Search ==========

    /// Relationships matching a property predicate
    pub fn find_relationships(
        &self,
        user: &str,
        properties: Option<SearchProperties>,
        options: &FindOptions,
    ) -> Result<Option<Vec<Relationship>>> {
        validate_user_id(user)?;
        let mut query = InstanceQuery::relationships();
        query.properties = properties;
        self.run_relationship_query(query, options)
    }

    /// Relationships whose properties equal the given values
    pub fn find_relationships_by_property(
        &self,
        user: &str,
        properties: &Property,
        criteria: MatchCriteria,
        options: &FindOptions,
    ) -> Result<Option<Vec<Relationship>>> {
        validate_user_id(user)?;
        let mut query = InstanceQuery::relationships();
        query.properties = equality(properties, criteria);
        self.run_relationship_query(query, options)
    }

    /// Relationships with any string property matching a regular expression
    pub fn find_relationships_by_property_value(
        &self,
        user: &str,
        search_criteria: &str,
        options: &FindOptions,
    ) -> Result<Option<Vec<Relationship>>> {
        validate_user_id(user)?;
        let mut query = InstanceQuery::relationships();
        query.text = Some(TextPattern::new(search_criteria)?);
        self.run_relationship_query(query, options)
    }
}
