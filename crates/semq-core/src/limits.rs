//! Compiler limits and configuration.
//!
//! Loaded from `semq.toml`; every limit left at zero (or absent) falls
//! back to the backend default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SemqError;

pub const DEFAULT_MAX_SIZE: usize = 12;
pub const DEFAULT_MAX_DEPTH: usize = 4;
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 10;
pub const DEFAULT_MAX_HIERARCHY_SIZE: usize = 500;
pub const DEFAULT_MAX_CONCEPT_RECURSION_DEPTH: usize = 8;

/// Bounds applied while compiling one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub max_size: usize,
    pub max_depth: usize,
    pub max_hierarchy_depth: usize,
    pub max_hierarchy_size: usize,
    pub max_concept_recursion_depth: usize,
}

impl QueryLimits {
    /// Replace every zero limit with its default.
    #[must_use]
    pub fn resolved(self) -> Self {
        fn or(value: usize, default: usize) -> usize {
            if value == 0 {
                default
            } else {
                value
            }
        }
        Self {
            max_size: or(self.max_size, DEFAULT_MAX_SIZE),
            max_depth: or(self.max_depth, DEFAULT_MAX_DEPTH),
            max_hierarchy_depth: or(self.max_hierarchy_depth, DEFAULT_MAX_HIERARCHY_DEPTH),
            max_hierarchy_size: or(self.max_hierarchy_size, DEFAULT_MAX_HIERARCHY_SIZE),
            max_concept_recursion_depth: or(
                self.max_concept_recursion_depth,
                DEFAULT_MAX_CONCEPT_RECURSION_DEPTH,
            ),
        }
    }
}

/// Settings for the graph (SPARQL) backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// IRI prefix under which pages are exported.
    pub base_iri: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_iri: "http://example.org/id/".to_string(),
        }
    }
}

/// Complete compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub limits: QueryLimits,
    /// Expand categories to their sub-categories.
    pub subcategory_inclusion: bool,
    /// Expand properties to their sub-properties.
    pub subproperty_inclusion: bool,
    pub graph: GraphConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            limits: QueryLimits::default(),
            subcategory_inclusion: true,
            subproperty_inclusion: true,
            graph: GraphConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Parse a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Config`] if the document is not valid TOML or
    /// has fields of the wrong type.
    pub fn from_toml_str(source: &str) -> Result<Self, SemqError> {
        toml::from_str(source).map_err(|e| SemqError::Config(e.to_string()))
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Io`] if the file cannot be read and
    /// [`SemqError::Config`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, SemqError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Limits with defaults filled in.
    #[must_use]
    pub fn limits(&self) -> QueryLimits {
        self.limits.resolved()
    }
}
