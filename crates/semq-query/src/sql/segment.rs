//! Query segments: the intermediate join-plan tree.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use semq_core::EntityId;

/// What a segment contributes to the final statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// A table joined on its join field.
    Table,
    /// All components constrain the same row.
    Conjunction,
    /// Each component is an independent subquery; rows are unioned.
    Disjunction,
    /// Every entity except a fixed id set.
    Negation,
    /// A table constrained by an expanded hierarchy id set.
    Hierarchy,
    /// A fixed id set. Empty means the segment matches nothing.
    Value,
}

/// A child segment and, for table segments, the column of the parent
/// that the child's join field must equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub segment: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySegment {
    pub id: usize,
    pub kind: SegmentKind,
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_table: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub join_field: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub where_fragment: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<EntityId>,
    /// Sort label to the column holding its value.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sort_fields: BTreeMap<String, String>,
    /// Joined with LEFT OUTER semantics; never narrows the result.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl QuerySegment {
    /// Whether this segment is the canonical empty match.
    #[must_use]
    pub fn matches_nothing(&self) -> bool {
        self.kind == SegmentKind::Value && self.ids.is_empty()
    }
}

/// Call-scoped owner of all segments. Ids are arena positions, so they
/// increase monotonically and a segment's children always precede it.
#[derive(Debug, Default)]
pub struct SegmentArena {
    segments: Vec<QuerySegment>,
}

impl SegmentArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias the next pushed segment will receive.
    #[must_use]
    pub fn next_alias(&self) -> String {
        format!("t{}", self.segments.len())
    }

    pub fn push(&mut self, kind: SegmentKind) -> &mut QuerySegment {
        let id = self.segments.len();
        self.segments.push(QuerySegment {
            id,
            kind,
            alias: format!("t{id}"),
            join_table: None,
            join_field: String::new(),
            where_fragment: String::new(),
            components: Vec::new(),
            ids: Vec::new(),
            sort_fields: BTreeMap::new(),
            optional: false,
        });
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// A table segment joined on `join_column` of itself.
    pub fn push_table(&mut self, kind: SegmentKind, table: &str, join_column: &str) -> &mut QuerySegment {
        let segment = self.push(kind);
        segment.join_table = Some(table.to_string());
        segment.join_field = format!("{}.{join_column}", segment.alias);
        segment
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&QuerySegment> {
        self.segments.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuerySegment> {
        self.segments.iter()
    }

    /// Sort labels that reach `root` without crossing a disjunction.
    #[must_use]
    pub fn sort_labels(&self, root: usize) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(segment) = self.get(id) else {
                continue;
            };
            if segment.kind == SegmentKind::Disjunction {
                continue;
            }
            labels.extend(segment.sort_fields.keys().cloned());
            stack.extend(segment.components.iter().map(|c| c.segment));
        }
        labels
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<QuerySegment> {
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_follow_ids() {
        let mut arena = SegmentArena::new();
        assert_eq!(arena.next_alias(), "t0");
        let first = arena.push_table(SegmentKind::Table, "smw_fpt_inst", "s_id").id;
        let second = arena.push(SegmentKind::Conjunction).id;
        assert_eq!((first, second), (0, 1));
        assert_eq!(arena.get(0).unwrap().join_field, "t0.s_id");
        assert_eq!(arena.get(1).unwrap().alias, "t1");
        assert_eq!(arena.next_alias(), "t2");
    }

    #[test]
    fn empty_value_segment_matches_nothing() {
        let mut arena = SegmentArena::new();
        assert!(arena.push(SegmentKind::Value).matches_nothing());
        assert!(!arena.push(SegmentKind::Negation).matches_nothing());
    }

    #[test]
    fn sort_labels_stop_at_disjunctions() {
        let mut arena = SegmentArena::new();
        arena
            .push_table(SegmentKind::Table, "smw_di_number", "s_id")
            .sort_fields
            .insert("Population".into(), "t0.o_sortkey".into());
        arena
            .push_table(SegmentKind::Table, "smw_di_number", "s_id")
            .sort_fields
            .insert("Area".into(), "t1.o_sortkey".into());
        arena.push(SegmentKind::Disjunction).components = vec![Component {
            segment: 1,
            column: None,
        }];
        arena.push(SegmentKind::Conjunction).components = vec![
            Component {
                segment: 0,
                column: None,
            },
            Component {
                segment: 2,
                column: None,
            },
        ];

        let labels = arena.sort_labels(3);
        assert!(labels.contains("Population"));
        assert!(!labels.contains("Area"));
    }
}
