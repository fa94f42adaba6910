//! YAML fixtures describing a small store.
//!
//! ```yaml
//! properties:
//!   Population: number
//!   Located in: page
//! subcategories:
//!   Capital: [City]
//! pages:
//!   Berlin:
//!     categories: [Capital]
//!     values:
//!       Population: [{ type: number, value: 3600000 }]
//! concepts:
//!   Big cities: { type: value, property: { namespace: 102, title: Population }, comparator: geq, datum: { type: number, value: 1000000 } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use semq_core::{DataItem, HierarchyKind, SemqError, ValueType, WikiPage};
use semq_description::Description;

use crate::IndexManager;

/// Store contents keyed by plain titles (no namespace prefixes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Property title to datatype name.
    pub properties: BTreeMap<String, String>,
    /// Category title to its direct parent categories.
    pub subcategories: BTreeMap<String, Vec<String>>,
    /// Property title to its direct parent properties.
    pub subproperties: BTreeMap<String, Vec<String>>,
    pub pages: BTreeMap<String, FixturePage>,
    pub concepts: BTreeMap<String, Description>,
}

/// One content page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixturePage {
    pub categories: Vec<String>,
    pub values: BTreeMap<String, Vec<DataItem>>,
}

impl Fixture {
    /// Parse a fixture document.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Serialization`] if the YAML is invalid.
    pub fn from_yaml_str(source: &str) -> Result<Self, SemqError> {
        serde_yaml::from_str(source).map_err(|e| SemqError::Serialization(e.to_string()))
    }

    /// Load a fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Io`] if the file cannot be read and
    /// [`SemqError::Serialization`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, SemqError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    /// Write the fixture into `index`.
    ///
    /// Properties are typed first so that values land in the right tables.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Config`] for an unknown datatype name or a
    /// value whose type disagrees with its property, and
    /// [`SemqError::Index`] if a write fails.
    pub fn populate(&self, index: &IndexManager) -> Result<(), SemqError> {
        let mut declared = BTreeMap::new();
        for (name, type_name) in &self.properties {
            let value_type: ValueType = type_name
                .parse()
                .map_err(|e: String| SemqError::Config(format!("property '{name}': {e}")))?;
            index.set_property_type(&WikiPage::property(name.as_str()), value_type)?;
            declared.insert(name.as_str(), value_type);
        }

        for (child, parents) in &self.subcategories {
            for parent in parents {
                index.add_subordinate(
                    &WikiPage::category(child.as_str()),
                    &WikiPage::category(parent.as_str()),
                    HierarchyKind::Class,
                )?;
            }
        }
        for (child, parents) in &self.subproperties {
            for parent in parents {
                index.add_subordinate(
                    &WikiPage::property(child.as_str()),
                    &WikiPage::property(parent.as_str()),
                    HierarchyKind::Property,
                )?;
            }
        }

        for (title, page) in &self.pages {
            let subject = WikiPage::page(title.as_str());
            index.ensure_entity(&subject)?;
            for category in &page.categories {
                index.add_category(&subject, &WikiPage::category(category.as_str()))?;
            }
            for (property, values) in &page.values {
                let expected = declared
                    .get(property.as_str())
                    .copied()
                    .unwrap_or_default();
                for value in values {
                    if value.value_type() != expected {
                        return Err(SemqError::Config(format!(
                            "{title}: value '{value}' of '{property}' is not of type {expected}"
                        )));
                    }
                    index.add_value(&subject, &WikiPage::property(property.as_str()), value)?;
                }
            }
        }

        for (name, definition) in &self.concepts {
            index.store_concept(&WikiPage::concept(name.as_str()), definition)?;
        }

        tracing::debug!(
            pages = self.pages.len(),
            properties = self.properties.len(),
            concepts = self.concepts.len(),
            "fixture loaded"
        );
        Ok(())
    }

    /// Build an in-memory store holding this fixture.
    ///
    /// # Errors
    ///
    /// See [`Fixture::populate`].
    pub fn into_index(&self) -> Result<IndexManager, SemqError> {
        let index = IndexManager::in_memory()?;
        self.populate(&index)?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semq_core::{EntityLookup, HierarchyLookup};
    use semq_description::ConceptStore;

    const CITIES: &str = r#"
properties:
  Population: number
  Located in: page
subcategories:
  Capital: [City]
pages:
  Berlin:
    categories: [Capital]
    values:
      Population: [{ type: number, value: 3600000 }]
      Located in: [{ type: page, value: { title: Germany } }]
  Bonn:
    categories: [City]
    values:
      Population: [{ type: number, value: 330000 }]
concepts:
  Big cities:
    type: value
    property: { namespace: 102, title: Population }
    comparator: geq
    datum: { type: number, value: 1000000 }
"#;

    #[test]
    fn parse_and_populate() {
        let fixture = Fixture::from_yaml_str(CITIES).unwrap();
        assert_eq!(fixture.pages.len(), 2);

        let index = fixture.into_index().unwrap();
        assert!(index.id_for(&WikiPage::page("Germany")).unwrap().is_some());
        assert_eq!(
            index.property_type(&WikiPage::property("Located in")).unwrap(),
            ValueType::Page
        );
        assert_eq!(
            index
                .children_of(&WikiPage::category("City"), HierarchyKind::Class)
                .unwrap(),
            vec![WikiPage::category("Capital")]
        );
        assert!(index
            .definition_of(&WikiPage::concept("Big cities"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn mistyped_value_is_rejected() {
        let fixture = Fixture::from_yaml_str(
            r#"
properties:
  Population: number
pages:
  Berlin:
    values:
      Population: [{ type: text, value: "many" }]
"#,
        )
        .unwrap();
        let err = fixture.into_index().unwrap_err();
        assert!(matches!(err, SemqError::Config(_)));
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let fixture = Fixture::from_yaml_str("properties:\n  Size: blob\n").unwrap();
        assert!(matches!(
            fixture.into_index().unwrap_err(),
            SemqError::Config(_)
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cities.yaml");
        std::fs::write(&path, CITIES).unwrap();
        let fixture = Fixture::load(&path).unwrap();
        assert_eq!(fixture.properties.len(), 2);
    }

    #[test]
    fn invalid_yaml_is_serialization_error() {
        let err = Fixture::from_yaml_str("pages: [oops").unwrap_err();
        assert!(matches!(err, SemqError::Serialization(_)));
    }
}
