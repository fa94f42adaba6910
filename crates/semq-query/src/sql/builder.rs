//! Description → segment tree.
//!
//! One method per description variant. Children are always compiled
//! before their parent segment is pushed, so every child id (and alias)
//! is lower than its parent's.

use semq_core::{
    DataItem, Diagnostic, DiagnosticReason, HierarchyKind, Result, ValueType, WikiPage,
};
use semq_description::{Comparator, Description, SortKey};

use crate::context::CompilationContext;
use crate::sql::segment::{Component, SegmentArena, SegmentKind};
use crate::sql::value::{
    comparison, id_predicate, value_column, value_table, ID_TABLE, INST_TABLE,
};

/// Outcome of folding a description into a predicate on one literal
/// value column.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fold {
    /// No constraint.
    Any,
    /// No value can match.
    Never,
    Where(String),
}

pub struct SegmentBuilder<'c, 'a> {
    ctx: &'c mut CompilationContext<'a>,
    arena: SegmentArena,
    sort_keys: &'c [SortKey],
}

impl<'c, 'a> SegmentBuilder<'c, 'a> {
    pub fn new(ctx: &'c mut CompilationContext<'a>, sort_keys: &'c [SortKey]) -> Self {
        Self {
            ctx,
            arena: SegmentArena::new(),
            sort_keys,
        }
    }

    #[must_use]
    pub fn finish(self) -> SegmentArena {
        self.arena
    }

    /// Compile `description` and return the id of its segment.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures and malformed collaborator responses.
    pub fn compile(&mut self, description: &Description) -> Result<usize> {
        match description {
            Description::Thing => Ok(self.entity_table()),
            Description::Namespace { namespace } => {
                let segment = self.arena.push_table(SegmentKind::Table, ID_TABLE, "smw_id");
                segment.where_fragment = format!("{}.smw_namespace = {namespace}", segment.alias);
                Ok(segment.id)
            }
            Description::Class { categories } => self.class(categories),
            Description::Value {
                property: Some(property),
                comparator,
                datum,
            } => {
                let inner = Description::page_value(*comparator, datum.clone());
                self.some_property(property, &inner)
            }
            Description::Value {
                property: None,
                comparator,
                datum,
            } => self.page_value(*comparator, datum, description),
            Description::SomeProperty {
                property,
                description: inner,
            } => self.some_property(property, inner),
            Description::Concept { concept } => {
                let resolved = self.ctx.resolve_concept(concept)?;
                self.compile(&resolved)
            }
            Description::Conjunction { descriptions, .. } => {
                if descriptions.is_empty() {
                    return Ok(self.entity_table());
                }
                let children = self.compile_all(descriptions)?;
                Ok(self.composite(SegmentKind::Conjunction, children))
            }
            Description::Disjunction { descriptions, .. } => {
                if descriptions.is_empty() {
                    return Ok(self.nothing());
                }
                let children = self.compile_all(descriptions)?;
                Ok(self.composite(SegmentKind::Disjunction, children))
            }
        }
    }

    fn compile_all(&mut self, descriptions: &[Description]) -> Result<Vec<usize>> {
        descriptions.iter().map(|d| self.compile(d)).collect()
    }

    fn composite(&mut self, kind: SegmentKind, children: Vec<usize>) -> usize {
        let segment = self.arena.push(kind);
        segment.components = children
            .into_iter()
            .map(|segment| Component {
                segment,
                column: None,
            })
            .collect();
        segment.id
    }

    fn entity_table(&mut self) -> usize {
        self.arena.push_table(SegmentKind::Table, ID_TABLE, "smw_id").id
    }

    fn nothing(&mut self) -> usize {
        self.arena.push(SegmentKind::Value).id
    }

    fn class(&mut self, categories: &[WikiPage]) -> Result<usize> {
        let mut members: Vec<WikiPage> = Vec::new();
        for category in categories {
            for member in self.ctx.expand(category, HierarchyKind::Class)? {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }

        let ids = self.ctx.entity_ids(&members)?;
        if ids.is_empty() {
            tracing::debug!(?categories, "no known category, class matches nothing");
            return Ok(self.nothing());
        }

        let kind = if members.len() > categories.len() {
            SegmentKind::Hierarchy
        } else {
            SegmentKind::Table
        };
        let segment = self.arena.push_table(kind, INST_TABLE, "s_id");
        segment.where_fragment = id_predicate(&format!("{}.o_id", segment.alias), &ids, false);
        Ok(segment.id)
    }

    /// A comparison against the page itself.
    fn page_value(
        &mut self,
        comparator: Comparator,
        datum: &DataItem,
        original: &Description,
    ) -> Result<usize> {
        let Some(page) = datum.as_page() else {
            tracing::debug!(subtree = %original, "non-page datum at entity level matches nothing");
            return Ok(self.nothing());
        };

        match comparator {
            Comparator::Eq => {
                let id = self.ctx.entity_id(page)?;
                let segment = self.arena.push(SegmentKind::Value);
                segment.ids.extend(id);
                Ok(segment.id)
            }
            Comparator::Neq => match self.ctx.entity_id(page)? {
                Some(id) => {
                    let segment = self.arena.push(SegmentKind::Negation);
                    segment.ids.push(id);
                    Ok(segment.id)
                }
                None => Ok(self.entity_table()),
            },
            _ => {
                let segment = self.arena.push_table(SegmentKind::Table, ID_TABLE, "smw_id");
                segment.where_fragment = comparison(
                    &format!("{}.smw_sortkey", segment.alias),
                    comparator,
                    datum,
                );
                Ok(segment.id)
            }
        }
    }

    fn sort_label(&self, property: &WikiPage) -> Option<String> {
        self.sort_keys
            .iter()
            .find(|key| key.property.as_ref() == Some(property))
            .map(SortKey::label)
    }

    fn some_property(&mut self, property: &WikiPage, inner: &Description) -> Result<usize> {
        let properties = self.ctx.expand(property, HierarchyKind::Property)?;
        let pids = self.ctx.entity_ids(&properties)?;
        if pids.is_empty() {
            tracing::debug!(property = %property, "unknown property matches nothing");
            return Ok(self.nothing());
        }
        let value_type = self.ctx.property_type(property)?;
        let sort_label = self.sort_label(property);
        let kind = if properties.len() > 1 {
            SegmentKind::Hierarchy
        } else {
            SegmentKind::Table
        };

        if value_type == ValueType::Page {
            let mut children = Vec::new();
            if !inner.is_thing() {
                children.push(self.compile(inner)?);
            }
            let mut sort_column = None;
            if sort_label.is_some() {
                let object = self.arena.push_table(SegmentKind::Table, ID_TABLE, "smw_id");
                sort_column = Some(format!("{}.smw_sortkey", object.alias));
                children.push(object.id);
            }

            let segment = self.arena.push_table(kind, value_table(value_type), "s_id");
            let object_column = format!("{}.o_id", segment.alias);
            segment.where_fragment = id_predicate(&format!("{}.p_id", segment.alias), &pids, false);
            segment.components = children
                .into_iter()
                .map(|child| Component {
                    segment: child,
                    column: Some(object_column.clone()),
                })
                .collect();
            if let (Some(label), Some(column)) = (sort_label, sort_column) {
                segment.sort_fields.insert(label, column);
            }
            return Ok(segment.id);
        }

        let alias = self.arena.next_alias();
        let column = format!("{alias}.{}", value_column(value_type));
        let predicate = match self.literal_condition(inner, property, value_type, &column)? {
            Fold::Never => {
                tracing::debug!(property = %property, "entity description under a literal property matches nothing");
                return Ok(self.nothing());
            }
            Fold::Any => None,
            Fold::Where(predicate) => Some(predicate),
        };

        let segment = self.arena.push_table(kind, value_table(value_type), "s_id");
        segment.where_fragment = id_predicate(&format!("{}.p_id", segment.alias), &pids, false);
        if let Some(predicate) = predicate {
            segment.where_fragment = format!("{} AND {predicate}", segment.where_fragment);
        }
        if let Some(label) = sort_label {
            segment.sort_fields.insert(label, column);
        }
        Ok(segment.id)
    }

    /// Fold a description of literal values into a predicate on `column`.
    ///
    /// All parts constrain the same value row, so disjunctions become `OR`
    /// without changing cardinality.
    fn literal_condition(
        &mut self,
        description: &Description,
        property: &WikiPage,
        value_type: ValueType,
        column: &str,
    ) -> Result<Fold> {
        let fold = match description {
            Description::Thing => Fold::Any,
            Description::Value {
                property: None,
                comparator,
                datum,
            } => {
                let problem = if datum.value_type() != value_type {
                    Some(format!(
                        "{} value cannot be compared with {value_type} values",
                        datum.value_type()
                    ))
                } else if !comparator.supports(value_type) {
                    Some(format!(
                        "comparator {comparator} is not defined for {value_type} values"
                    ))
                } else {
                    None
                };
                match problem {
                    Some(detail) => {
                        let subtree =
                            Description::value(property.clone(), *comparator, datum.clone());
                        self.ctx.report(Diagnostic::new(
                            subtree.query_string(),
                            DiagnosticReason::UnsupportedComparator,
                            detail,
                        ));
                        Fold::Any
                    }
                    None => Fold::Where(comparison(column, *comparator, datum)),
                }
            }
            Description::Concept { concept } => {
                let resolved = self.ctx.resolve_concept(concept)?;
                self.literal_condition(&resolved, property, value_type, column)?
            }
            Description::Conjunction { descriptions, .. } => {
                let mut parts = Vec::new();
                for d in descriptions {
                    match self.literal_condition(d, property, value_type, column)? {
                        Fold::Never => return Ok(Fold::Never),
                        Fold::Any => {}
                        Fold::Where(w) => parts.push(w),
                    }
                }
                combine(parts, " AND ", Fold::Any)
            }
            Description::Disjunction { descriptions, .. } => {
                let mut parts = Vec::new();
                for d in descriptions {
                    match self.literal_condition(d, property, value_type, column)? {
                        Fold::Any => return Ok(Fold::Any),
                        Fold::Never => {}
                        Fold::Where(w) => parts.push(w),
                    }
                }
                combine(parts, " OR ", Fold::Never)
            }
            Description::Namespace { .. }
            | Description::Class { .. }
            | Description::SomeProperty { .. }
            | Description::Value {
                property: Some(_), ..
            } => Fold::Never,
        };
        Ok(fold)
    }

    /// Add joins for sort keys no compiled segment provides. Property
    /// sort joins are LEFT OUTER so that pages without a value still
    /// appear.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    pub fn add_sort_joins(&mut self, root: usize) -> Result<usize> {
        let mut satisfied = self.arena.sort_labels(root);
        let mut extra = Vec::new();

        for key in self.sort_keys {
            let label = key.label();
            if satisfied.contains(&label) {
                continue;
            }
            match &key.property {
                None => {
                    let segment = self.arena.push_table(SegmentKind::Table, ID_TABLE, "smw_id");
                    let column = format!("{}.smw_sortkey", segment.alias);
                    segment.sort_fields.insert(label.clone(), column);
                    extra.push(segment.id);
                }
                Some(property) => {
                    let Some(pid) = self.ctx.entity_id(property)? else {
                        tracing::debug!(property = %property, "cannot sort by unknown property");
                        continue;
                    };
                    let value_type = self.ctx.property_type(property)?;
                    let mut object = None;
                    if value_type == ValueType::Page {
                        let page = self.arena.push_table(SegmentKind::Table, ID_TABLE, "smw_id");
                        object = Some((page.id, format!("{}.smw_sortkey", page.alias)));
                    }

                    let segment = self.arena.push_table(SegmentKind::Table, value_table(value_type), "s_id");
                    segment.optional = true;
                    segment.where_fragment = id_predicate(&format!("{}.p_id", segment.alias), &[pid], false);
                    let column = match object {
                        Some((object, column)) => {
                            segment.components.push(Component {
                                segment: object,
                                column: Some(format!("{}.o_id", segment.alias)),
                            });
                            column
                        }
                        None => format!("{}.{}", segment.alias, value_column(value_type)),
                    };
                    segment.sort_fields.insert(label.clone(), column);
                    extra.push(segment.id);
                }
            }
            satisfied.insert(label);
        }

        if extra.is_empty() {
            return Ok(root);
        }
        let mut children = vec![root];
        children.extend(extra);
        Ok(self.composite(SegmentKind::Conjunction, children))
    }
}

fn combine(mut parts: Vec<String>, separator: &str, empty: Fold) -> Fold {
    match parts.len() {
        0 => empty,
        1 => Fold::Where(parts.remove(0)),
        _ => Fold::Where(format!("({})", parts.join(separator))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::MemoryStore;
    use crate::context::Collaborators;
    use semq_core::{CompilerConfig, Diagnostics};
    use semq_description::SortDirection;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::default();
        store.entity(&WikiPage::category("City"));
        store.property("Population", ValueType::Number);
        store.property("Name", ValueType::Text);
        store.property("Located in", ValueType::Page);
        store.entity(&WikiPage::page("Berlin"));
        store.entity(&WikiPage::page("Germany"));
        store
    }

    fn build(
        store: &MemoryStore,
        description: &Description,
        sort_keys: &[SortKey],
    ) -> (usize, SegmentArena, Diagnostics) {
        build_with(store, &CompilerConfig::default(), description, sort_keys)
    }

    fn build_with(
        store: &MemoryStore,
        config: &CompilerConfig,
        description: &Description,
        sort_keys: &[SortKey],
    ) -> (usize, SegmentArena, Diagnostics) {
        let mut ctx =
            CompilationContext::new(Collaborators::from_store(store), config, Diagnostics::new());
        let mut builder = SegmentBuilder::new(&mut ctx, sort_keys);
        let root = builder.compile(description).unwrap();
        let root = builder.add_sort_joins(root).unwrap();
        let arena = builder.finish();
        (root, arena, ctx.into_diagnostics())
    }

    fn city() -> Description {
        Description::class(WikiPage::category("City"))
    }

    #[test]
    fn class_without_subcategories_is_direct_equality() {
        let store = store();
        let (root, arena, diagnostics) = build(&store, &city(), &[]);
        let segment = arena.get(root).unwrap();
        assert_eq!(segment.kind, SegmentKind::Table);
        assert_eq!(segment.where_fragment, "t0.o_id = 1");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn class_with_subcategories_is_hierarchy_in_list() {
        let mut store = store();
        store.subcategory("Capital", "City");
        let capital = store.ids[&WikiPage::category("Capital")];
        let (root, arena, _) = build(&store, &city(), &[]);
        let segment = arena.get(root).unwrap();
        assert_eq!(segment.kind, SegmentKind::Hierarchy);
        assert_eq!(segment.where_fragment, format!("t0.o_id IN (1, {capital})"));
    }

    fn large_population() -> Description {
        Description::value(
            WikiPage::property("Population"),
            Comparator::Geq,
            DataItem::Number(1000.0),
        )
    }

    #[test]
    fn subproperties_widen_the_property_id_list() {
        let mut store = store();
        store.subproperty("Inhabitants", "Population", ValueType::Number);
        let inhabitants = store.ids[&WikiPage::property("Inhabitants")];
        let (root, arena, _) = build(&store, &large_population(), &[]);
        let segment = arena.get(root).unwrap();
        assert_eq!(segment.kind, SegmentKind::Hierarchy);
        assert_eq!(
            segment.where_fragment,
            format!("t0.p_id IN (2, {inhabitants}) AND t0.o_sortkey >= 1000")
        );
    }

    #[test]
    fn subproperty_inclusion_off_keeps_the_named_property() {
        let mut store = store();
        store.subproperty("Inhabitants", "Population", ValueType::Number);
        let config = CompilerConfig {
            subproperty_inclusion: false,
            ..CompilerConfig::default()
        };
        let (root, arena, _) = build_with(&store, &config, &large_population(), &[]);
        let segment = arena.get(root).unwrap();
        assert_eq!(segment.kind, SegmentKind::Table);
        assert_eq!(segment.where_fragment, "t0.p_id = 2 AND t0.o_sortkey >= 1000");
    }

    #[test]
    fn unknown_category_matches_nothing() {
        let store = store();
        let (root, arena, _) = build(&store, &Description::class(WikiPage::category("Town")), &[]);
        assert!(arena.get(root).unwrap().matches_nothing());
    }

    #[test]
    fn literal_disjunction_folds_into_one_row() {
        let store = store();
        let population = WikiPage::property("Population");
        let q = Description::some_property(
            population,
            Description::disjunction([
                Description::page_value(Comparator::Less, DataItem::Number(10.0)),
                Description::page_value(Comparator::Geq, DataItem::Number(1000.0)),
            ]),
        );
        let (root, arena, _) = build(&store, &q, &[]);
        assert_eq!(arena.len(), 1);
        assert_eq!(
            arena.get(root).unwrap().where_fragment,
            "t0.p_id = 2 AND (t0.o_sortkey < 10 OR t0.o_sortkey >= 1000)"
        );
    }

    #[test]
    fn like_on_number_is_unsupported() {
        let store = store();
        let q = Description::value(
            WikiPage::property("Population"),
            Comparator::Like,
            DataItem::Number(5.0),
        );
        let (root, arena, diagnostics) = build(&store, &q, &[]);
        assert_eq!(diagnostics.count(DiagnosticReason::UnsupportedComparator), 1);
        assert_eq!(arena.get(root).unwrap().where_fragment, "t0.p_id = 2");
    }

    #[test]
    fn text_like_uses_escaped_pattern() {
        let store = store();
        let q = Description::value(
            WikiPage::property("Name"),
            Comparator::Like,
            DataItem::Text("Ber*".into()),
        );
        let (root, arena, diagnostics) = build(&store, &q, &[]);
        assert!(diagnostics.is_empty());
        assert_eq!(
            arena.get(root).unwrap().where_fragment,
            "t0.p_id = 3 AND t0.o_blob LIKE 'Ber%' ESCAPE '\\'"
        );
    }

    #[test]
    fn page_property_nests_its_description() {
        let store = store();
        let q = Description::some_property(
            WikiPage::property("Located in"),
            Description::page_value(Comparator::Eq, DataItem::Page(WikiPage::page("Germany"))),
        );
        let (root, arena, _) = build(&store, &q, &[]);
        assert_eq!(root, 1);
        let segment = arena.get(root).unwrap();
        assert_eq!(segment.join_table.as_deref(), Some("smw_di_wikipage"));
        assert_eq!(
            segment.components,
            vec![Component {
                segment: 0,
                column: Some("t1.o_id".into())
            }]
        );
        assert_eq!(arena.get(0).unwrap().kind, SegmentKind::Value);
    }

    #[test]
    fn class_under_literal_property_matches_nothing() {
        let store = store();
        let q = Description::some_property(WikiPage::property("Population"), city());
        let (root, arena, _) = build(&store, &q, &[]);
        assert!(arena.get(root).unwrap().matches_nothing());
    }

    #[test]
    fn sort_key_on_compiled_property_is_recorded() {
        let store = store();
        let q = Description::conjunction([
            city(),
            Description::some_property(WikiPage::property("Population"), Description::Thing),
        ]);
        let keys = [SortKey::property(
            WikiPage::property("Population"),
            SortDirection::Desc,
        )];
        let (root, arena, _) = build(&store, &q, &keys);
        assert_eq!(root, 2);
        assert_eq!(
            arena.get(1).unwrap().sort_fields.get("Population").map(String::as_str),
            Some("t1.o_sortkey")
        );
    }

    #[test]
    fn missing_sort_key_adds_optional_join() {
        let store = store();
        let keys = [
            SortKey::property(WikiPage::property("Population"), SortDirection::Asc),
            SortKey::page(SortDirection::Asc),
        ];
        let (root, arena, _) = build(&store, &city(), &keys);
        let wrapper = arena.get(root).unwrap();
        assert_eq!(wrapper.kind, SegmentKind::Conjunction);
        assert_eq!(wrapper.components.len(), 3);
        assert!(arena.get(1).unwrap().optional);
        assert!(!arena.get(2).unwrap().optional);
    }
}
