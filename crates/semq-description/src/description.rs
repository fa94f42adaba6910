//! The Description AST: a backend-independent query tree.
//!
//! Descriptions are immutable values produced by the host and read by the
//! compilers. Each node has a size (node-count weight) and a depth
//! (property nesting weight) which the pruning policy bounds.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use semq_core::{namespace_name_or_number, DataItem, Diagnostic, Diagnostics, ValueType, WikiPage};

use crate::query::PrintRequest;

/// One node of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Description {
    /// Matches every page.
    Thing,
    /// Pages in a namespace.
    Namespace { namespace: i32 },
    /// Members of any of the given categories.
    Class { categories: Vec<WikiPage> },
    /// A comparison against a single datum. Without a property the
    /// comparison applies to the page itself.
    Value {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property: Option<WikiPage>,
        #[serde(default)]
        comparator: Comparator,
        datum: DataItem,
    },
    /// Pages having a value for `property` that matches `description`.
    SomeProperty {
        property: WikiPage,
        description: Box<Description>,
    },
    /// Reference to a stored, named description.
    Concept { concept: WikiPage },
    /// All children must match.
    Conjunction {
        descriptions: Vec<Description>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        print_requests: Vec<PrintRequest>,
    },
    /// At least one child must match. Empty matches nothing.
    Disjunction {
        descriptions: Vec<Description>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        print_requests: Vec<PrintRequest>,
    },
}

/// Comparison operators of [`Description::Value`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    #[default]
    Eq,
    Neq,
    Less,
    Greater,
    Leq,
    Geq,
    /// Pattern match; `*` matches any run of characters, `?` a single one.
    Like,
    NotLike,
}

impl Comparator {
    /// Whether this comparator is defined for values of `value_type`.
    #[must_use]
    pub fn supports(self, value_type: ValueType) -> bool {
        match value_type {
            ValueType::Text | ValueType::Page => true,
            ValueType::Number | ValueType::Time => !matches!(self, Self::Like | Self::NotLike),
            ValueType::Boolean => matches!(self, Self::Eq | Self::Neq),
        }
    }

    /// Prefix used in the query syntax.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Eq => "",
            Self::Neq => "!",
            Self::Less => "<<",
            Self::Greater => ">>",
            Self::Leq => "<",
            Self::Geq => ">",
            Self::Like => "~",
            Self::NotLike => "!~",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::Leq => "<=",
            Self::Geq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        };
        write!(f, "{op}")
    }
}

impl Description {
    /// The canonical "matches nothing" description.
    #[must_use]
    pub fn nothing() -> Self {
        Self::Disjunction {
            descriptions: Vec::new(),
            print_requests: Vec::new(),
        }
    }

    #[must_use]
    pub fn class(category: WikiPage) -> Self {
        Self::Class {
            categories: vec![category],
        }
    }

    #[must_use]
    pub fn concept(concept: WikiPage) -> Self {
        Self::Concept { concept }
    }

    #[must_use]
    pub fn value(property: WikiPage, comparator: Comparator, datum: DataItem) -> Self {
        Self::Value {
            property: Some(property),
            comparator,
            datum,
        }
    }

    /// A comparison against the page itself.
    #[must_use]
    pub fn page_value(comparator: Comparator, datum: DataItem) -> Self {
        Self::Value {
            property: None,
            comparator,
            datum,
        }
    }

    #[must_use]
    pub fn some_property(property: WikiPage, description: Description) -> Self {
        Self::SomeProperty {
            property,
            description: Box::new(description),
        }
    }

    /// Build a conjunction, flattening nested conjunctions and dropping
    /// `Thing` members.
    #[must_use]
    pub fn conjunction(descriptions: impl IntoIterator<Item = Description>) -> Self {
        let mut parts = Vec::new();
        let mut print_requests = Vec::new();
        for description in descriptions {
            match description {
                Self::Thing => {}
                Self::Conjunction {
                    descriptions,
                    print_requests: inner,
                } => {
                    parts.extend(descriptions);
                    print_requests.extend(inner);
                }
                other => parts.push(other),
            }
        }
        if print_requests.is_empty() {
            match parts.len() {
                0 => return Self::Thing,
                1 => return parts.remove(0),
                _ => {}
            }
        }
        Self::Conjunction {
            descriptions: parts,
            print_requests,
        }
    }

    /// Build a disjunction, flattening nested disjunctions. A `Thing`
    /// member makes the whole disjunction `Thing`.
    #[must_use]
    pub fn disjunction(descriptions: impl IntoIterator<Item = Description>) -> Self {
        let mut parts = Vec::new();
        let mut print_requests = Vec::new();
        for description in descriptions {
            match description {
                Self::Thing => return Self::Thing,
                Self::Disjunction {
                    descriptions,
                    print_requests: inner,
                } => {
                    parts.extend(descriptions);
                    print_requests.extend(inner);
                }
                other => parts.push(other),
            }
        }
        if print_requests.is_empty() && parts.len() == 1 {
            return parts.remove(0);
        }
        Self::Disjunction {
            descriptions: parts,
            print_requests,
        }
    }

    /// Attach an output column to this description.
    #[must_use]
    pub fn with_print_request(self, request: PrintRequest) -> Self {
        match self {
            Self::Conjunction {
                descriptions,
                mut print_requests,
            } => {
                print_requests.push(request);
                Self::Conjunction {
                    descriptions,
                    print_requests,
                }
            }
            Self::Disjunction {
                descriptions,
                mut print_requests,
            } => {
                print_requests.push(request);
                Self::Disjunction {
                    descriptions,
                    print_requests,
                }
            }
            Self::Thing => Self::Conjunction {
                descriptions: Vec::new(),
                print_requests: vec![request],
            },
            other => Self::Conjunction {
                descriptions: vec![other],
                print_requests: vec![request],
            },
        }
    }

    /// Whether this description matches every page.
    #[must_use]
    pub fn is_thing(&self) -> bool {
        match self {
            Self::Thing => true,
            Self::Conjunction { descriptions, .. } => descriptions.iter().all(Self::is_thing),
            _ => false,
        }
    }

    /// Whether this description provably matches nothing.
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Disjunction { descriptions, .. } if descriptions.is_empty())
    }

    /// Node-count weight.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Thing => 0,
            Self::Namespace { .. } | Self::Concept { .. } => 1,
            Self::Class { categories } => categories.len().max(1),
            Self::Value { property, .. } => {
                if property.is_some() {
                    2
                } else {
                    1
                }
            }
            Self::SomeProperty { description, .. } => 1 + description.size(),
            Self::Conjunction { descriptions, .. } | Self::Disjunction { descriptions, .. } => {
                descriptions.iter().map(Self::size).sum()
            }
        }
    }

    /// Property nesting weight.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Thing | Self::Namespace { .. } | Self::Concept { .. } | Self::Class { .. } => 0,
            Self::Value { property, .. } => usize::from(property.is_some()),
            Self::SomeProperty { description, .. } => 1 + description.depth(),
            Self::Conjunction { descriptions, .. } | Self::Disjunction { descriptions, .. } => {
                descriptions.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// Output columns requested by this node and its descendants.
    #[must_use]
    pub fn print_requests(&self) -> Vec<PrintRequest> {
        let mut out: Vec<PrintRequest> = Vec::new();
        self.collect_print_requests(&mut out);
        out
    }

    fn collect_print_requests(&self, out: &mut Vec<PrintRequest>) {
        match self {
            Self::Conjunction {
                descriptions,
                print_requests,
            }
            | Self::Disjunction {
                descriptions,
                print_requests,
            } => {
                for request in print_requests {
                    if !out.contains(request) {
                        out.push(request.clone());
                    }
                }
                for description in descriptions {
                    description.collect_print_requests(out);
                }
            }
            Self::SomeProperty { description, .. } => description.collect_print_requests(out),
            _ => {}
        }
    }

    /// Replace parts that exceed the size or depth budget with `Thing`,
    /// recording a diagnostic for each replaced subtree.
    ///
    /// The result never has a larger [`size`](Self::size) or
    /// [`depth`](Self::depth) than `self`.
    #[must_use]
    pub fn prune(&self, max_size: usize, max_depth: usize, diagnostics: &mut Diagnostics) -> Self {
        let mut size = max_size;
        let mut depth = max_depth;
        self.prune_within(&mut size, &mut depth, diagnostics)
    }

    fn prune_within(
        &self,
        max_size: &mut usize,
        max_depth: &mut usize,
        log: &mut Diagnostics,
    ) -> Self {
        if self.size() == 0 && self.depth() == 0 {
            return self.clone();
        }
        match self {
            Self::SomeProperty {
                property,
                description,
            } => {
                if *max_size == 0 || *max_depth == 0 {
                    log.push(self.truncation(*max_size == 0));
                    return Self::Thing;
                }
                *max_size -= 1;
                *max_depth -= 1;
                let inner = description.prune_within(max_size, max_depth, log);
                Self::SomeProperty {
                    property: property.clone(),
                    description: Box::new(inner),
                }
            }
            Self::Conjunction {
                descriptions,
                print_requests,
            } => {
                if *max_size == 0 {
                    log.push(self.truncation(true));
                    return Self::Thing;
                }
                let (parts, new_depth) = prune_children(descriptions, max_size, *max_depth, log);
                *max_depth = new_depth;
                let parts: Vec<Self> = parts.into_iter().filter(|d| !d.is_thing()).collect();
                if print_requests.is_empty() {
                    match parts.len() {
                        0 => return Self::Thing,
                        1 => return parts.into_iter().next().unwrap_or(Self::Thing),
                        _ => {}
                    }
                }
                Self::Conjunction {
                    descriptions: parts,
                    print_requests: print_requests.clone(),
                }
            }
            Self::Disjunction {
                descriptions,
                print_requests,
            } => {
                if *max_size == 0 {
                    log.push(self.truncation(true));
                    return Self::Thing;
                }
                let (parts, new_depth) = prune_children(descriptions, max_size, *max_depth, log);
                *max_depth = new_depth;
                if parts.iter().any(Self::is_thing) {
                    return print_requests
                        .iter()
                        .cloned()
                        .fold(Self::Thing, Self::with_print_request);
                }
                if print_requests.is_empty() && parts.len() == 1 {
                    return parts.into_iter().next().unwrap_or(Self::Thing);
                }
                Self::Disjunction {
                    descriptions: parts,
                    print_requests: print_requests.clone(),
                }
            }
            leaf => {
                let size = leaf.size();
                let depth = leaf.depth();
                if *max_size < size || *max_depth < depth {
                    log.push(leaf.truncation(*max_size < size));
                    return Self::Thing;
                }
                *max_size -= size;
                *max_depth -= depth;
                leaf.clone()
            }
        }
    }

    fn truncation(&self, too_large: bool) -> Diagnostic {
        let detail = if too_large {
            "query truncated: too large"
        } else {
            "query truncated: too deep"
        };
        Diagnostic::truncated(self.query_string(), detail)
    }

    /// Render in the wiki query syntax.
    #[must_use]
    pub fn query_string(&self) -> String {
        match self {
            Self::Thing => "+".to_string(),
            Self::Namespace { namespace } => {
                format!("[[{}:+]]", namespace_name_or_number(*namespace))
            }
            Self::Class { categories } => {
                let names: Vec<String> = categories.iter().map(WikiPage::text).collect();
                format!("[[Category:{}]]", names.join("||"))
            }
            Self::Value {
                property: None,
                comparator,
                datum,
            } => format!("[[{}{}]]", comparator.prefix(), datum),
            Self::Value {
                property: Some(property),
                comparator,
                datum,
            } => format!("[[{}::{}{}]]", property.text(), comparator.prefix(), datum),
            Self::SomeProperty {
                property,
                description,
            } => match description.as_ref() {
                inner if inner.is_thing() => format!("[[{}::+]]", property.text()),
                Self::Value {
                    property: None,
                    comparator,
                    datum,
                } => format!("[[{}::{}{}]]", property.text(), comparator.prefix(), datum),
                inner => format!("[[{}::<q>{}</q>]]", property.text(), inner.query_string()),
            },
            Self::Concept { concept } => format!("[[Concept:{}]]", concept.text()),
            Self::Conjunction { descriptions, .. } => {
                if descriptions.is_empty() {
                    return "+".to_string();
                }
                let parts: Vec<String> = descriptions
                    .iter()
                    .map(|d| match d {
                        Self::Disjunction { .. } => format!("<q>{}</q>", d.query_string()),
                        _ => d.query_string(),
                    })
                    .collect();
                parts.join(" ")
            }
            Self::Disjunction { descriptions, .. } => {
                if descriptions.is_empty() {
                    return "<q></q>".to_string();
                }
                let parts: Vec<String> = descriptions
                    .iter()
                    .map(|d| match d {
                        Self::Conjunction { .. } => format!("<q>{}</q>", d.query_string()),
                        _ => d.query_string(),
                    })
                    .collect();
                parts.join(" OR ")
            }
        }
    }

    /// Stable identity of this subtree, used as a cache key by the host.
    ///
    /// Equal descriptions always have equal fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical =
            serde_json::to_vec(self).unwrap_or_else(|_| self.query_string().into_bytes());
        format!("{:x}", Sha256::digest(&canonical))
    }
}

/// Prune siblings against one shared size budget; each sibling gets the
/// full depth budget. Returns the pruned children and the smallest
/// remaining depth.
fn prune_children(
    descriptions: &[Description],
    max_size: &mut usize,
    max_depth: usize,
    log: &mut Diagnostics,
) -> (Vec<Description>, usize) {
    let mut new_depth = max_depth;
    let mut parts = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        let mut rest_depth = max_depth;
        parts.push(description.prune_within(max_size, &mut rest_depth, log));
        new_depth = new_depth.min(rest_depth);
    }
    (parts, new_depth)
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_string())
    }
}
