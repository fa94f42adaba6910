//! Collaborator interfaces the compiler consults.
//!
//! Implementations are expected to be fast, cached reads. They are passed
//! in explicitly; the compiler never reaches for ambient services.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataitem::{EntityId, ValueType, WikiPage, NS_CATEGORY, NS_PROPERTY};
use crate::error::LookupError;

/// Which "is-a" relation to traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyKind {
    /// Sub-category of.
    Class,
    /// Sub-property of.
    Property,
}

impl HierarchyKind {
    /// Namespace every member of this hierarchy lives in.
    #[must_use]
    pub fn namespace(self) -> i32 {
        match self {
            Self::Class => NS_CATEGORY,
            Self::Property => NS_PROPERTY,
        }
    }
}

impl fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => write!(f, "class"),
            Self::Property => write!(f, "property"),
        }
    }
}

/// Direct sub-entries of categories and properties.
pub trait HierarchyLookup {
    /// Direct children (sub-categories or sub-properties) of `page`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the hierarchy cannot be read.
    fn children_of(&self, page: &WikiPage, kind: HierarchyKind)
        -> Result<Vec<WikiPage>, LookupError>;
}

/// Store identities and property datatypes.
pub trait EntityLookup {
    /// Store id of `page`, or `None` if the store has never seen it.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the store cannot be read.
    fn id_for(&self, page: &WikiPage) -> Result<Option<EntityId>, LookupError>;

    /// Declared datatype of a property.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the store cannot be read.
    fn property_type(&self, property: &WikiPage) -> Result<ValueType, LookupError>;
}
