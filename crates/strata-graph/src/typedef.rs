//! Type definitions consulted for structural validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_core::{Error, InstanceStatus, InstanceType, Property, Result};

/// Kind of instance a type definition describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    Entity,
    Relationship,
    Classification,
}

/// A type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Name of the type
    pub name: String,

    pub category: TypeCategory,

    /// Direct supertype, if any
    pub supertype: Option<String>,

    /// Properties declared by this type (inherited ones are not repeated)
    pub properties: Vec<String>,

    /// Declared properties that identify an instance; copied onto proxies
    pub unique_properties: Vec<String>,

    /// Statuses an instance of this type may hold (empty = any)
    pub valid_statuses: Vec<InstanceStatus>,

    /// Entity types allowed at end one and end two (relationships only)
    pub end_types: Option<(String, String)>,

    /// Entity types a classification may be attached to (empty = any)
    pub valid_entity_types: Vec<String>,
}

impl TypeDef {
    fn new(name: &str, category: TypeCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            supertype: None,
            properties: Vec::new(),
            unique_properties: Vec::new(),
            valid_statuses: Vec::new(),
            end_types: None,
            valid_entity_types: Vec::new(),
        }
    }

    /// Create an entity type definition
    pub fn entity(name: &str) -> Self {
        Self::new(name, TypeCategory::Entity)
    }

    /// Create a relationship type definition between two entity types
    pub fn relationship(name: &str, end_one: &str, end_two: &str) -> Self {
        Self {
            end_types: Some((end_one.to_string(), end_two.to_string())),
            ..Self::new(name, TypeCategory::Relationship)
        }
    }

    /// Create a classification type definition
    pub fn classification(name: &str) -> Self {
        Self::new(name, TypeCategory::Classification)
    }

    /// Set the direct supertype
    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertype = Some(supertype.to_string());
        self
    }

    /// Declare properties
    pub fn with_properties(mut self, names: &[&str]) -> Self {
        self.properties.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Declare properties that also identify the instance
    pub fn with_unique_properties(mut self, names: &[&str]) -> Self {
        for name in names {
            self.properties.push(name.to_string());
            self.unique_properties.push(name.to_string());
        }
        self
    }

    /// Restrict the statuses an instance may hold
    pub fn with_statuses(mut self, statuses: &[InstanceStatus]) -> Self {
        self.valid_statuses = statuses.to_vec();
        self
    }

    /// Restrict the entity types a classification may be attached to
    pub fn for_entity_types(mut self, names: &[&str]) -> Self {
        self.valid_entity_types = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// Catalog of known type definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeCatalog {
    /// Type definitions by name
    pub types: HashMap<String, TypeDef>,
}

impl TypeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type definition
    pub fn add(&mut self, def: TypeDef) -> bool {
        if self.types.contains_key(&def.name) {
            return false;
        }
        self.types.insert(def.name.clone(), def);
        true
    }

    /// Add a type definition, consuming and returning the catalog
    pub fn with(mut self, def: TypeDef) -> Self {
        self.add(def);
        self
    }

    /// Get a type definition by name
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Check if a type exists
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Get a type definition of the expected category, or a `TypeError`
    pub fn require(&self, name: &str, category: TypeCategory) -> Result<&TypeDef> {
        match self.types.get(name) {
            Some(def) if def.category == category => Ok(def),
            Some(def) => Err(Error::TypeError(format!(
                "{} is a {:?} type, not {:?}",
                name, def.category, category
            ))),
            None => Err(Error::TypeError(format!("unknown type {}", name))),
        }
    }

    /// Supertype chain of a type, nearest first
    pub fn supertypes(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.types.get(name).and_then(|d| d.supertype.clone());
        while let Some(parent) = current {
            // A cycle in the definitions ends the walk
            if chain.contains(&parent) || parent == name {
                break;
            }
            current = self.types.get(&parent).and_then(|d| d.supertype.clone());
            chain.push(parent);
        }
        chain
    }

    /// Check if `name` is `ancestor` or one of its subtypes
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor || self.supertypes(name).iter().any(|s| s == ancestor)
    }

    /// Build the instance type reference for a type of the given category
    pub fn instance_type(&self, name: &str, category: TypeCategory) -> Result<InstanceType> {
        self.require(name, category)?;
        Ok(InstanceType::with_supertypes(name, self.supertypes(name)))
    }

    /// Every property declared by a type or its supertypes
    pub fn declared_properties(&self, name: &str) -> Vec<&String> {
        self.lineage(name)
            .flat_map(|def| def.properties.iter())
            .collect()
    }

    /// Every unique property declared by a type or its supertypes
    pub fn unique_properties(&self, name: &str) -> Vec<String> {
        self.lineage(name)
            .flat_map(|def| def.unique_properties.iter().cloned())
            .collect()
    }

    fn lineage<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a TypeDef> {
        std::iter::once(name.to_string())
            .chain(self.supertypes(name))
            .filter_map(move |n| self.types.get(&n))
    }

    /// Reject properties the type does not declare
    pub fn validate_properties(&self, name: &str, properties: &Property) -> Result<()> {
        let declared = self.declared_properties(name);
        for key in properties.keys() {
            if !declared.contains(&key) {
                return Err(Error::PropertyError(format!(
                    "{} is not a property of {}",
                    key, name
                )));
            }
        }
        Ok(())
    }

    /// Reject a status the type does not support
    pub fn validate_status(&self, name: &str, status: InstanceStatus) -> Result<()> {
        let Some(def) = self.types.get(name) else {
            return Err(Error::TypeError(format!("unknown type {}", name)));
        };
        if status.is_deleted() || def.valid_statuses.is_empty() {
            return Ok(());
        }
        if def.valid_statuses.contains(&status) {
            Ok(())
        } else {
            Err(Error::TypeError(format!(
                "status {} is not valid for {}",
                status, name
            )))
        }
    }

    /// Check a classification may be attached to an entity of `entity_type`
    pub fn validate_classification(&self, classification: &str, entity_type: &str) -> Result<()> {
        let def = self
            .require(classification, TypeCategory::Classification)
            .map_err(|e| Error::Classification(e.to_string()))?;
        if def.valid_entity_types.is_empty()
            || def
                .valid_entity_types
                .iter()
                .any(|t| self.is_subtype(entity_type, t))
        {
            Ok(())
        } else {
            Err(Error::Classification(format!(
                "{} cannot classify an entity of type {}",
                classification, entity_type
            )))
        }
    }

    /// Check the endpoint entity types fit a relationship type
    pub fn validate_relationship_ends(
        &self,
        relationship_type: &str,
        end_one_type: &str,
        end_two_type: &str,
    ) -> Result<()> {
        let def = self.require(relationship_type, TypeCategory::Relationship)?;
        let Some((one, two)) = &def.end_types else {
            return Ok(());
        };
        if !self.is_subtype(end_one_type, one) {
            return Err(Error::TypeMismatch {
                expected: one.clone(),
                found: end_one_type.to_string(),
            });
        }
        if !self.is_subtype(end_two_type, two) {
            return Err(Error::TypeMismatch {
                expected: two.clone(),
                found: end_two_type.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TypeCatalog {
        TypeCatalog::new()
            .with(TypeDef::entity("Referenceable").with_unique_properties(&["qualifiedName"]))
            .with(
                TypeDef::entity("Asset")
                    .extends("Referenceable")
                    .with_properties(&["name", "owner"]),
            )
            .with(TypeDef::entity("Table").extends("Asset"))
            .with(TypeDef::entity("Process").extends("Referenceable"))
            .with(TypeDef::relationship("Lineage", "Asset", "Process"))
            .with(TypeDef::classification("Confidential").for_entity_types(&["Asset"]))
            .with(
                TypeDef::entity("Glossary")
                    .with_statuses(&[InstanceStatus::Draft, InstanceStatus::Active]),
            )
    }

    #[test]
    fn test_add_duplicate() {
        let mut catalog = catalog();
        assert!(!catalog.add(TypeDef::entity("Asset")));
        assert!(catalog.add(TypeDef::entity("Schema")));
    }

    #[test]
    fn test_supertypes_and_subtyping() {
        let catalog = catalog();
        assert_eq!(catalog.supertypes("Table"), vec!["Asset", "Referenceable"]);
        assert!(catalog.is_subtype("Table", "Referenceable"));
        assert!(!catalog.is_subtype("Process", "Asset"));

        let ty = catalog.instance_type("Table", TypeCategory::Entity).unwrap();
        assert!(ty.is_a("Asset"));
    }

    #[test]
    fn test_require_checks_category() {
        let catalog = catalog();
        assert!(catalog.require("Lineage", TypeCategory::Relationship).is_ok());
        assert!(matches!(
            catalog.require("Lineage", TypeCategory::Entity),
            Err(Error::TypeError(_))
        ));
        assert!(catalog.require("Missing", TypeCategory::Entity).is_err());
    }

    #[test]
    fn test_inherited_properties() {
        let catalog = catalog();
        assert_eq!(catalog.unique_properties("Table"), vec!["qualifiedName"]);
        let props = Property::with("qualifiedName", "db.t").and("name", "t");
        assert!(catalog.validate_properties("Table", &props).is_ok());
        let bad = Property::with("colour", "red");
        assert!(matches!(
            catalog.validate_properties("Table", &bad),
            Err(Error::PropertyError(_))
        ));
    }

    #[test]
    fn test_status_validation() {
        let catalog = catalog();
        assert!(catalog.validate_status("Glossary", InstanceStatus::Draft).is_ok());
        assert!(catalog.validate_status("Glossary", InstanceStatus::Deprecated).is_err());
        assert!(catalog.validate_status("Asset", InstanceStatus::Deprecated).is_ok());
    }

    #[test]
    fn test_classification_validation() {
        let catalog = catalog();
        assert!(catalog.validate_classification("Confidential", "Table").is_ok());
        assert!(matches!(
            catalog.validate_classification("Confidential", "Process"),
            Err(Error::Classification(_))
        ));
        assert!(catalog.validate_classification("Unknown", "Table").is_err());
    }

    #[test]
    fn test_relationship_ends() {
        let catalog = catalog();
        assert!(catalog.validate_relationship_ends("Lineage", "Table", "Process").is_ok());
        assert!(matches!(
            catalog.validate_relationship_ends("Lineage", "Process", "Table"),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
