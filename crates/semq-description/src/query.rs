//! Query envelope: a description plus ordering and paging.

use serde::{Deserialize, Serialize};

use semq_core::WikiPage;

use crate::description::Description;

/// A complete query as handed over by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub description: Description,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_keys: Vec<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl Query {
    #[must_use]
    pub fn new(description: Description) -> Self {
        Self {
            description,
            sort_keys: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[must_use]
    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether results should be ordered by the given property.
    #[must_use]
    pub fn sorts_by(&self, property: &WikiPage) -> bool {
        self.sort_keys
            .iter()
            .any(|k| k.property.as_ref() == Some(property))
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Property to sort by; `None` sorts by the page itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<WikiPage>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    #[must_use]
    pub fn page(direction: SortDirection) -> Self {
        Self {
            property: None,
            direction,
        }
    }

    #[must_use]
    pub fn property(property: WikiPage, direction: SortDirection) -> Self {
        Self {
            property: Some(property),
            direction,
        }
    }

    /// Label under which sort bindings are tracked (`""` for the page).
    #[must_use]
    pub fn label(&self) -> String {
        self.property
            .as_ref()
            .map(WikiPage::text)
            .unwrap_or_default()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A requested output column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrintRequest {
    pub label: String,
    pub kind: PrintKind,
}

/// What a print request outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "property", rename_all = "snake_case")]
pub enum PrintKind {
    /// The result page itself.
    ThisPage,
    /// The categories of the result page.
    Categories,
    /// Values of a property.
    Property(WikiPage),
}

impl PrintRequest {
    #[must_use]
    pub fn property(property: WikiPage) -> Self {
        Self {
            label: property.text(),
            kind: PrintKind::Property(property),
        }
    }

    #[must_use]
    pub fn categories() -> Self {
        Self {
            label: "Categories".to_string(),
            kind: PrintKind::Categories,
        }
    }
}
