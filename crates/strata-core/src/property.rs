//! Property types for instances
//!
//! Provides property values and property collections for entities,
//! relationships and classifications.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A property value that can be stored on an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Null/missing value
    Null,

    /// Boolean value
    Boolean(bool),

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Array of property values
    Array(Vec<PropertyValue>),

    /// Map of string keys to property values
    Map(HashMap<String, PropertyValue>),

    /// DateTime (milliseconds since Unix epoch)
    DateTime(i64),

    /// Enumeration value
    Enum { ordinal: i32, symbolic_name: String },
}

impl PropertyValue {
    /// Returns true if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Returns true if the value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, PropertyValue::String(_))
    }

    /// Try to get as boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            PropertyValue::Enum { symbolic_name, .. } => Some(symbolic_name),
            _ => None,
        }
    }

    /// Try to get as array reference
    pub fn as_array(&self) -> Option<&Vec<PropertyValue>> {
        match self {
            PropertyValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Array(_) => "array",
            PropertyValue::Map(_) => "map",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::Enum { .. } => "enum",
        }
    }

    /// Compare two values for ordering.
    ///
    /// Null sorts first. Integers and floats compare numerically with each
    /// other; values of incompatible kinds yield `None`.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Null, PropertyValue::Null) => Some(Ordering::Equal),
            (PropertyValue::Null, _) => Some(Ordering::Less),
            (_, PropertyValue::Null) => Some(Ordering::Greater),

            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => Some(a.cmp(b)),
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => Some(a.cmp(b)),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a.partial_cmp(b),
            (PropertyValue::Integer(a), PropertyValue::Float(b)) => (*a as f64).partial_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::DateTime(a), PropertyValue::DateTime(b)) => Some(a.cmp(b)),
            (
                PropertyValue::Enum { ordinal: a, .. },
                PropertyValue::Enum { ordinal: b, .. },
            ) => Some(a.cmp(b)),

            _ => None,
        }
    }

    /// Position of the value's kind in sequencing order; integers and
    /// floats share a rank
    fn kind_rank(&self) -> u8 {
        match self {
            PropertyValue::Null => 0,
            PropertyValue::Boolean(_) => 1,
            PropertyValue::Integer(_) | PropertyValue::Float(_) => 2,
            PropertyValue::String(_) => 3,
            PropertyValue::DateTime(_) => 4,
            PropertyValue::Enum { .. } => 5,
            PropertyValue::Array(_) => 6,
            PropertyValue::Map(_) => 7,
        }
    }

    /// Total order used to sequence results.
    ///
    /// Never reverses an ordering `compare` defines. Values of different
    /// kinds order by kind and floats order through `f64::total_cmp`, so NaN
    /// has a place too. An integer sorts before a float of equal value.
    pub fn sequence_cmp(&self, other: &PropertyValue) -> Ordering {
        use PropertyValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (String(a), String(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (
                Enum { ordinal: a, symbolic_name: x },
                Enum { ordinal: b, symbolic_name: y },
            ) => a.cmp(b).then_with(|| x.cmp(y)),
            (Array(a), Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sequence_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Map(a), Map(b)) => {
                let mut a: Vec<_> = a.iter().collect();
                let mut b: Vec<_> = b.iter().collect();
                a.sort_by(|x, y| x.0.cmp(y.0));
                b.sort_by(|x, y| x.0.cmp(y.0));
                a.iter()
                    .zip(&b)
                    .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.sequence_cmp(vb)))
                    .find(|o| o.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len()))
            }
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    /// Collect every string reachable from this value, descending into
    /// arrays and maps
    pub fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PropertyValue::String(s) => out.push(s),
            PropertyValue::Enum { symbolic_name, .. } => out.push(symbolic_name),
            PropertyValue::Array(items) => items.iter().for_each(|v| v.collect_strings(out)),
            PropertyValue::Map(map) => map.values().for_each(|v| v.collect_strings(out)),
            _ => {}
        }
    }
}

// Convenience From implementations
impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Integer(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(v: Vec<T>) -> Self {
        PropertyValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// A collection of properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    inner: HashMap<String, PropertyValue>,
}

impl Property {
    /// Create an empty property collection
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Create with a single property
    pub fn with<K: Into<String>, V: Into<PropertyValue>>(key: K, value: V) -> Self {
        let mut props = Self::new();
        props.set(key, value);
        props
    }

    /// Builder: add a property and return the collection
    pub fn and<K: Into<String>, V: Into<PropertyValue>>(mut self, key: K, value: V) -> Self {
        self.set(key, value);
        self
    }

    /// Set a property value
    pub fn set<K: Into<String>, V: Into<PropertyValue>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.into());
    }

    /// Get a property value
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.inner.get(key)
    }

    /// Remove a property
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.inner.remove(key)
    }

    /// Check if a property exists
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Get the number of properties
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over properties
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.inner.iter()
    }

    /// Get property keys
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Merge with another property collection (other takes precedence)
    pub fn merge(&mut self, other: Property) {
        self.inner.extend(other.inner);
    }

    /// Keep only the named properties
    pub fn project<'a, I>(&self, names: I) -> Property
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|name| self.inner.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// All string values held by this collection
    pub fn strings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for value in self.inner.values() {
            value.collect_strings(&mut out);
        }
        out
    }
}

impl IntoIterator for Property {
    type Item = (String, PropertyValue);
    type IntoIter = std::collections::hash_map::IntoIter<String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl FromIterator<(String, PropertyValue)> for Property {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_conversions() {
        assert_eq!(PropertyValue::Boolean(true).as_boolean(), Some(true));
        assert_eq!(PropertyValue::Integer(42).as_integer(), Some(42));
        assert_eq!(PropertyValue::Integer(42).as_float(), Some(42.0));
        assert_eq!(PropertyValue::String("test".into()).as_str(), Some("test"));
        assert!(PropertyValue::Null.is_null());
    }

    #[test]
    fn test_property_value_compare() {
        let one = PropertyValue::Integer(1);
        let two = PropertyValue::Float(2.5);
        assert_eq!(one.compare(&two), Some(Ordering::Less));
        assert_eq!(
            PropertyValue::String("b".into()).compare(&PropertyValue::String("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(PropertyValue::Null.compare(&one), Some(Ordering::Less));
        assert_eq!(one.compare(&PropertyValue::String("1".into())), None);
    }

    #[test]
    fn test_sequence_cmp_is_total() {
        let values = vec![
            PropertyValue::Float(f64::NAN),
            PropertyValue::Integer(3),
            PropertyValue::String("x".into()),
            PropertyValue::Float(3.0),
            PropertyValue::Boolean(true),
            PropertyValue::Null,
            PropertyValue::Float(-f64::NAN),
            PropertyValue::Float(f64::INFINITY),
            PropertyValue::Array(vec![PropertyValue::Integer(1)]),
            PropertyValue::Integer(i64::MAX),
        ];
        for a in &values {
            assert_eq!(a.sequence_cmp(a), Ordering::Equal);
            for b in &values {
                assert_eq!(a.sequence_cmp(b), b.sequence_cmp(a).reverse());
                for c in &values {
                    if a.sequence_cmp(b).is_le() && b.sequence_cmp(c).is_le() {
                        assert!(a.sequence_cmp(c).is_le(), "{:?} {:?} {:?}", a, b, c);
                    }
                }
            }
        }

        assert_eq!(
            PropertyValue::Integer(3).sequence_cmp(&PropertyValue::Float(3.0)),
            Ordering::Less
        );
        assert_eq!(
            PropertyValue::Integer(2).sequence_cmp(&PropertyValue::Float(2.5)),
            Ordering::Less
        );
        assert_eq!(
            PropertyValue::Boolean(true).sequence_cmp(&PropertyValue::String("a".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_collect_strings_descends() {
        let value = PropertyValue::Array(vec![
            PropertyValue::String("a".into()),
            PropertyValue::Integer(3),
            PropertyValue::Array(vec![PropertyValue::String("b".into())]),
        ]);
        let mut out = Vec::new();
        value.collect_strings(&mut out);
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_property_collection() {
        let props = Property::new().and("name", "orders").and("rows", 30i64);

        assert_eq!(props.len(), 2);
        assert!(props.contains("name"));
        assert_eq!(props.get("name").and_then(|v| v.as_str()), Some("orders"));
        assert_eq!(props.get("rows").and_then(|v| v.as_integer()), Some(30));
    }

    #[test]
    fn test_property_project() {
        let props = Property::new().and("qualifiedName", "db.orders").and("owner", "ann");
        let keys = vec!["qualifiedName".to_string(), "missing".to_string()];
        let projected = props.project(&keys);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains("qualifiedName"));
    }

    #[test]
    fn test_property_merge() {
        let mut props1 = Property::with("a", "1");
        let props2 = Property::new().and("b", "2").and("a", "overwritten");

        props1.merge(props2);

        assert_eq!(props1.get("a").and_then(|v| v.as_str()), Some("overwritten"));
        assert_eq!(props1.get("b").and_then(|v| v.as_str()), Some("2"));
    }
}
