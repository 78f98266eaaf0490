//! Search predicate model
//!
//! Property, classification and text predicates over instances, together
//! with sequencing and paging. Stores evaluate an `InstanceQuery` against the
//! records visible at the requested time.

use crate::error::{Error, Result};
use crate::id::Guid;
use crate::instance::{Entity, InstanceHeader, InstanceStatus, Record, RecordKind};
use crate::property::{Property, PropertyValue};
use regex_lite::Regex;
use std::cmp::Ordering;

/// How a list of conditions combines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchCriteria {
    /// Every condition must hold
    #[default]
    All,
    /// At least one condition must hold
    Any,
    /// No condition may hold
    None,
}

impl MatchCriteria {
    fn combine<I: IntoIterator<Item = bool>>(self, results: I) -> bool {
        let mut results = results.into_iter();
        match self {
            MatchCriteria::All => results.all(|r| r),
            MatchCriteria::Any => results.any(|r| r),
            MatchCriteria::None => !results.any(|r| r),
        }
    }
}

/// Comparison applied by a property condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Value must be an array; matches when the property equals any element
    In,
    IsNull,
    NotNull,
}

/// A compiled regular expression matched against string values
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    regex: Regex,
}

impl TextPattern {
    /// Compile a pattern, rejecting invalid expressions
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            Error::InvalidParameter(format!("invalid search pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// A pattern that matches `text` literally and completely
    pub fn exact(text: &str) -> Result<Self> {
        Self::new(&format!("^{}$", regex_lite::escape(text)))
    }

    /// The pattern as supplied
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check a single string
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Check whether any string value of `properties` matches
    pub fn matches_any(&self, properties: &Property) -> bool {
        properties.strings().into_iter().any(|s| self.is_match(s))
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One condition in a property predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyCondition {
    Compare {
        property: String,
        operator: PropertyOperator,
        value: PropertyValue,
    },
    /// Regular-expression match against a string property
    Like {
        property: String,
        pattern: TextPattern,
    },
    Nested(SearchProperties),
}

impl PropertyCondition {
    pub fn equals<S: Into<String>, V: Into<PropertyValue>>(property: S, value: V) -> Self {
        Self::compare(property, PropertyOperator::Eq, value)
    }

    pub fn compare<S: Into<String>, V: Into<PropertyValue>>(
        property: S,
        operator: PropertyOperator,
        value: V,
    ) -> Self {
        PropertyCondition::Compare {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn like<S: Into<String>>(property: S, pattern: &str) -> Result<Self> {
        Ok(PropertyCondition::Like {
            property: property.into(),
            pattern: TextPattern::new(pattern)?,
        })
    }

    /// Evaluate against a property collection; a missing property is null
    pub fn matches(&self, properties: &Property) -> bool {
        match self {
            PropertyCondition::Compare {
                property,
                operator,
                value,
            } => {
                let actual = properties.get(property).unwrap_or(&PropertyValue::Null);
                compare_values(actual, *operator, value)
            }
            PropertyCondition::Like { property, pattern } => properties
                .get(property)
                .and_then(PropertyValue::as_str)
                .is_some_and(|s| pattern.is_match(s)),
            PropertyCondition::Nested(nested) => nested.matches(properties),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            PropertyCondition::Compare {
                property,
                operator: PropertyOperator::In,
                value,
            } if value.as_array().is_none() => Err(Error::InvalidParameter(format!(
                "IN condition on {} needs an array value",
                property
            ))),
            PropertyCondition::Compare { property, .. } | PropertyCondition::Like { property, .. }
                if property.trim().is_empty() =>
            {
                Err(Error::InvalidParameter(
                    "property condition without a property name".to_string(),
                ))
            }
            PropertyCondition::Nested(nested) => nested.validate(),
            _ => Ok(()),
        }
    }
}

fn compare_values(actual: &PropertyValue, operator: PropertyOperator, expected: &PropertyValue) -> bool {
    let ordering = || {
        if actual.is_null() || expected.is_null() {
            None
        } else {
            actual.compare(expected)
        }
    };
    match operator {
        PropertyOperator::Eq => values_equal(actual, expected),
        PropertyOperator::Neq => !values_equal(actual, expected),
        PropertyOperator::Lt => ordering() == Some(Ordering::Less),
        PropertyOperator::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        PropertyOperator::Gt => ordering() == Some(Ordering::Greater),
        PropertyOperator::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        PropertyOperator::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
        PropertyOperator::IsNull => actual.is_null(),
        PropertyOperator::NotNull => !actual.is_null(),
    }
}

fn values_equal(a: &PropertyValue, b: &PropertyValue) -> bool {
    match a.compare(b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// A property predicate: conditions combined by a match criteria
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchProperties {
    pub conditions: Vec<PropertyCondition>,
    pub match_criteria: MatchCriteria,
}

impl SearchProperties {
    pub fn new(conditions: Vec<PropertyCondition>, match_criteria: MatchCriteria) -> Self {
        Self {
            conditions,
            match_criteria,
        }
    }

    /// Exact equality on every given property
    pub fn all_equal(properties: &Property) -> Self {
        let conditions = properties
            .iter()
            .map(|(k, v)| PropertyCondition::equals(k.clone(), v.clone()))
            .collect();
        Self::new(conditions, MatchCriteria::All)
    }

    /// Evaluate the predicate
    pub fn matches(&self, properties: &Property) -> bool {
        self.match_criteria
            .combine(self.conditions.iter().map(|c| c.matches(properties)))
    }

    /// Check structural validity of every condition
    pub fn validate(&self) -> Result<()> {
        self.conditions.iter().try_for_each(PropertyCondition::validate)
    }
}

/// A condition on one named classification of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationCondition {
    pub name: String,
    pub properties: Option<SearchProperties>,
}

impl ClassificationCondition {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            properties: None,
        }
    }

    pub fn with_properties(mut self, properties: SearchProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Holds when the entity carries the classification and its properties match
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.classification(&self.name).is_some_and(|c| {
            self.properties
                .as_ref()
                .is_none_or(|p| p.matches(&c.properties))
        })
    }
}

/// Classification conditions combined by a match criteria
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchClassifications {
    pub conditions: Vec<ClassificationCondition>,
    pub match_criteria: MatchCriteria,
}

impl SearchClassifications {
    pub fn new(conditions: Vec<ClassificationCondition>, match_criteria: MatchCriteria) -> Self {
        Self {
            conditions,
            match_criteria,
        }
    }

    /// Require every named classification to be present
    pub fn all_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names.into_iter().map(ClassificationCondition::new).collect(),
            MatchCriteria::All,
        )
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.match_criteria
            .combine(self.conditions.iter().map(|c| c.matches(entity)))
    }

    pub fn validate(&self) -> Result<()> {
        for condition in &self.conditions {
            if condition.name.trim().is_empty() {
                return Err(Error::InvalidParameter(
                    "classification condition without a name".to_string(),
                ));
            }
            if let Some(props) = &condition.properties {
                props.validate()?;
            }
        }
        Ok(())
    }
}

/// Ordering applied to search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SequencingOrder {
    /// Store-native order
    #[default]
    Any,
    Guid,
    CreationDateRecent,
    CreationDateOldest,
    LastUpdateRecent,
    LastUpdateOldest,
    PropertyAscending,
    PropertyDescending,
}

/// Sequencing order plus the property it sorts by, where relevant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequencing {
    pub order: SequencingOrder,
    pub property: Option<String>,
}

impl Sequencing {
    pub fn new(order: SequencingOrder) -> Self {
        Self {
            order,
            property: None,
        }
    }

    pub fn by_property<S: Into<String>>(property: S, ascending: bool) -> Self {
        Self {
            order: if ascending {
                SequencingOrder::PropertyAscending
            } else {
                SequencingOrder::PropertyDescending
            },
            property: Some(property.into()),
        }
    }

    /// Property orders need a property name
    pub fn validate(&self) -> Result<()> {
        let needs_property = matches!(
            self.order,
            SequencingOrder::PropertyAscending | SequencingOrder::PropertyDescending
        );
        if needs_property && self.property.as_deref().is_none_or(|p| p.trim().is_empty()) {
            return Err(Error::InvalidParameter(
                "sequencingProperty is required for property ordering".to_string(),
            ));
        }
        Ok(())
    }

    /// Sort headers-with-properties in place
    pub fn sort<T, F>(&self, items: &mut [T], view: F)
    where
        F: Fn(&T) -> (&InstanceHeader, &Property),
    {
        let by_guid = |a: &T, b: &T| view(a).0.guid.cmp(&view(b).0.guid);
        match self.order {
            SequencingOrder::Any => {}
            SequencingOrder::Guid => items.sort_by(by_guid),
            SequencingOrder::CreationDateRecent => items.sort_by(|a, b| {
                view(b).0.created_at.cmp(&view(a).0.created_at).then_with(|| by_guid(a, b))
            }),
            SequencingOrder::CreationDateOldest => items.sort_by(|a, b| {
                view(a).0.created_at.cmp(&view(b).0.created_at).then_with(|| by_guid(a, b))
            }),
            SequencingOrder::LastUpdateRecent => items.sort_by(|a, b| {
                view(b)
                    .0
                    .last_changed_at()
                    .cmp(&view(a).0.last_changed_at())
                    .then_with(|| by_guid(a, b))
            }),
            SequencingOrder::LastUpdateOldest => items.sort_by(|a, b| {
                view(a)
                    .0
                    .last_changed_at()
                    .cmp(&view(b).0.last_changed_at())
                    .then_with(|| by_guid(a, b))
            }),
            SequencingOrder::PropertyAscending | SequencingOrder::PropertyDescending => {
                let name = self.property.as_deref().unwrap_or_default();
                let descending = self.order == SequencingOrder::PropertyDescending;
                items.sort_by(|a, b| {
                    let ordering = match (view(a).1.get(name), view(b).1.get(name)) {
                        // Missing values go last in either direction
                        (None, None) => Ordering::Equal,
                        (None, Some(_)) => return Ordering::Greater,
                        (Some(_), None) => return Ordering::Less,
                        (Some(x), Some(y)) => x.sequence_cmp(y),
                    };
                    let ordering = if descending { ordering.reverse() } else { ordering };
                    ordering.then_with(|| by_guid(a, b))
                });
            }
        }
    }
}

/// Offset and size of a page of results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub from_element: usize,
    pub page_size: usize,
}

impl Page {
    pub fn new(from_element: usize, page_size: usize) -> Self {
        Self {
            from_element,
            page_size,
        }
    }

    /// Cut the page out of an ordered result list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.from_element)
            .take(self.page_size)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, usize::MAX)
    }
}

/// A complete search over one kind of record
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceQuery {
    /// Entity or relationship; proxies are never search results
    pub kind: RecordKind,
    /// Restrict to this type and its subtypes
    pub type_name: Option<String>,
    /// Restrict to any of these types (and their subtypes)
    pub subtype_names: Vec<String>,
    pub properties: Option<SearchProperties>,
    pub classifications: Option<SearchClassifications>,
    pub text: Option<TextPattern>,
    /// Accepted statuses; empty means every status except `Deleted`
    pub statuses: Vec<InstanceStatus>,
    /// Restrict relationships to those with this GUID as an endpoint
    pub endpoint: Option<Guid>,
    pub sequencing: Sequencing,
    pub page: Page,
}

impl InstanceQuery {
    /// An unrestricted query over entities
    pub fn entities() -> Self {
        Self::of_kind(RecordKind::Entity)
    }

    /// An unrestricted query over relationships
    pub fn relationships() -> Self {
        Self::of_kind(RecordKind::Relationship)
    }

    fn of_kind(kind: RecordKind) -> Self {
        Self {
            kind,
            type_name: None,
            subtype_names: Vec::new(),
            properties: None,
            classifications: None,
            text: None,
            statuses: Vec::new(),
            endpoint: None,
            sequencing: Sequencing::default(),
            page: Page::default(),
        }
    }

    /// Check structural validity before touching the store
    pub fn validate(&self) -> Result<()> {
        if let Some(props) = &self.properties {
            props.validate()?;
        }
        if let Some(classifications) = &self.classifications {
            if self.kind != RecordKind::Entity {
                return Err(Error::InvalidParameter(
                    "classification conditions only apply to entities".to_string(),
                ));
            }
            classifications.validate()?;
        }
        self.sequencing.validate()
    }

    fn status_accepted(&self, status: InstanceStatus) -> bool {
        if self.statuses.is_empty() {
            !status.is_deleted()
        } else {
            self.statuses.contains(&status)
        }
    }

    /// Evaluate every filter against a record
    pub fn matches(&self, record: &Record) -> bool {
        if record.kind() != self.kind {
            return false;
        }
        let header = record.header();
        let ty = &header.instance_type;
        if self.type_name.as_deref().is_some_and(|t| !ty.is_a(t)) {
            return false;
        }
        if !self.subtype_names.is_empty() && !self.subtype_names.iter().any(|t| ty.is_a(t)) {
            return false;
        }
        if !self.status_accepted(header.status) {
            return false;
        }
        if let Some(endpoint) = &self.endpoint {
            if record.endpoints().is_none_or(|(one, two)| one != endpoint && two != endpoint) {
                return false;
            }
        }
        if self
            .properties
            .as_ref()
            .is_some_and(|p| !p.matches(record.properties()))
        {
            return false;
        }
        if self
            .text
            .as_ref()
            .is_some_and(|t| !t.matches_any(record.properties()))
        {
            return false;
        }
        match (&self.classifications, record) {
            (Some(c), Record::Entity(entity)) => c.matches(entity),
            (Some(_), _) => false,
            (None, _) => true,
        }
    }

    /// Filter, sequence and page a set of visible records
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut matched: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        self.sequencing
            .sort(&mut matched, |r| (r.header(), r.properties()));
        self.page.apply(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::CollectionId;
    use crate::instance::{Classification, InstanceType, Relationship, EntityProxy};
    use crate::instance::Instance;

    fn entity(guid: &str, props: Property) -> Entity {
        Entity::new(InstanceHeader::new(
            Guid::from(guid),
            InstanceType::with_supertypes("Table", vec!["Asset".into()]),
            CollectionId::new("local"),
            "u",
        ))
        .with_properties(props)
    }

    #[test]
    fn test_property_operators() {
        let props = Property::new().and("rows", 30i64).and("name", "orders");

        assert!(PropertyCondition::equals("rows", 30i64).matches(&props));
        assert!(PropertyCondition::equals("rows", 30.0).matches(&props));
        assert!(PropertyCondition::compare("rows", PropertyOperator::Gt, 10i64).matches(&props));
        assert!(!PropertyCondition::compare("rows", PropertyOperator::Lt, 10i64).matches(&props));
        assert!(PropertyCondition::compare("missing", PropertyOperator::IsNull, PropertyValue::Null).matches(&props));
        assert!(!PropertyCondition::compare("missing", PropertyOperator::Gt, 1i64).matches(&props));
        assert!(PropertyCondition::compare("name", PropertyOperator::In, vec!["a", "orders"]).matches(&props));
        assert!(PropertyCondition::like("name", "^ord").unwrap().matches(&props));
    }

    #[test]
    fn test_match_criteria() {
        let props = Property::new().and("a", 1i64).and("b", 2i64);
        let conditions = vec![PropertyCondition::equals("a", 1i64), PropertyCondition::equals("b", 3i64)];

        assert!(!SearchProperties::new(conditions.clone(), MatchCriteria::All).matches(&props));
        assert!(SearchProperties::new(conditions.clone(), MatchCriteria::Any).matches(&props));
        assert!(!SearchProperties::new(conditions, MatchCriteria::None).matches(&props));
    }

    #[test]
    fn test_nested_conditions() {
        let props = Property::new().and("a", 1i64).and("b", 2i64);
        let inner = SearchProperties::new(
            vec![PropertyCondition::equals("a", 9i64), PropertyCondition::equals("b", 2i64)],
            MatchCriteria::Any,
        );
        let outer = SearchProperties::new(
            vec![PropertyCondition::equals("a", 1i64), PropertyCondition::Nested(inner)],
            MatchCriteria::All,
        );
        assert!(outer.matches(&props));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(TextPattern::new("(unclosed"), Err(Error::InvalidParameter(_))));
        assert!(TextPattern::exact("a.b").unwrap().is_match("a.b"));
        assert!(!TextPattern::exact("a.b").unwrap().is_match("axb"));
    }

    #[test]
    fn test_in_requires_array() {
        let bad = SearchProperties::new(
            vec![PropertyCondition::compare("a", PropertyOperator::In, 1i64)],
            MatchCriteria::All,
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_query_type_status_and_classification() {
        let home = CollectionId::new("local");
        let plain = Record::Entity(entity("e1", Property::new()));
        let classified = Record::Entity(
            entity("e2", Property::new())
                .with_classification(Classification::new("Confidential", home, "u")),
        );

        let mut query = InstanceQuery::entities();
        query.type_name = Some("Asset".to_string());
        assert!(query.matches(&plain));

        query.classifications = Some(SearchClassifications::all_of(["Confidential"]));
        assert!(!query.matches(&plain));
        assert!(query.matches(&classified));

        let mut deleted = entity("e3", Property::new());
        deleted.header.status = InstanceStatus::Deleted;
        deleted.header.status_on_delete = Some(InstanceStatus::Active);
        let deleted = Record::Entity(deleted);
        let all = InstanceQuery::entities();
        assert!(!all.matches(&deleted));

        let mut with_deleted = InstanceQuery::entities();
        with_deleted.statuses = vec![InstanceStatus::Deleted];
        assert!(with_deleted.matches(&deleted));
    }

    #[test]
    fn test_query_endpoint_filter() {
        let header = |g: &str| {
            InstanceHeader::new(Guid::from(g), InstanceType::new("Link"), CollectionId::new("local"), "u")
        };
        let rel = Record::Relationship(Relationship::new(
            header("r1"),
            EntityProxy::new(header("a")),
            EntityProxy::new(header("b")),
        ));
        let mut query = InstanceQuery::relationships();
        query.endpoint = Some(Guid::from("b"));
        assert!(query.matches(&rel));
        query.endpoint = Some(Guid::from("c"));
        assert!(!query.matches(&rel));
    }

    #[test]
    fn test_query_text_sequencing_and_paging() {
        let records = vec![
            Record::Entity(entity("e1", Property::with("name", "orders"))),
            Record::Entity(entity("e2", Property::with("name", "customers"))),
            Record::Entity(entity("e3", Property::with("name", "order_lines"))),
            Record::Entity(entity("e4", Property::with("rows", 4i64))),
        ];

        let mut query = InstanceQuery::entities();
        query.text = Some(TextPattern::new("order").unwrap());
        query.sequencing = Sequencing::by_property("name", false);
        let found = query.apply(records.clone());
        let guids: Vec<&str> = found.iter().map(|r| r.guid().as_str()).collect();
        assert_eq!(guids, vec!["e1", "e3"]);

        query.page = Page::new(1, 5);
        let found = query.apply(records);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].guid().as_str(), "e3");
    }

    #[test]
    fn test_sequencing_requires_property() {
        let seq = Sequencing::new(SequencingOrder::PropertyAscending);
        assert!(seq.validate().is_err());
        assert!(Sequencing::by_property("name", true).validate().is_ok());
    }

    #[test]
    fn test_property_sort_puts_missing_last() {
        let mut items = vec![
            entity("a", Property::new()),
            entity("b", Property::with("n", 2i64)),
            entity("c", Property::with("n", 1i64)),
        ];
        Sequencing::by_property("n", true).sort(&mut items, |e| (e.header(), e.properties()));
        let guids: Vec<&str> = items.iter().map(|e| e.guid().as_str()).collect();
        assert_eq!(guids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_property_sort_with_mixed_kinds_and_nan() {
        let value = |i: usize| match i % 4 {
            0 => PropertyValue::Integer(i as i64),
            1 => PropertyValue::String(format!("s{}", i)),
            2 => PropertyValue::Float(f64::NAN),
            _ => PropertyValue::Float(i as f64 / 3.0),
        };
        let make = || -> Vec<Entity> {
            (0..150)
                .map(|i| entity(&format!("e{:03}", i), Property::with("n", value(i))))
                .collect()
        };

        for ascending in [true, false] {
            let mut items = make();
            let seq = Sequencing::by_property("n", ascending);
            seq.sort(&mut items, |e| (e.header(), e.properties()));
            assert_eq!(items.len(), 150);

            // Numbers and strings form two contiguous runs
            let kinds: Vec<bool> = items
                .iter()
                .map(|e| e.properties().get("n").is_some_and(|v| v.is_string()))
                .collect();
            let switches = kinds.windows(2).filter(|w| w[0] != w[1]).count();
            assert_eq!(switches, 1);

            let mut reversed = make();
            reversed.reverse();
            seq.sort(&mut reversed, |e| (e.header(), e.properties()));
            let order = |v: &[Entity]| v.iter().map(|e| e.guid().clone()).collect::<Vec<_>>();
            assert_eq!(order(&items), order(&reversed));
        }
    }
}
