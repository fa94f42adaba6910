//! Lowers a segment tree into a single [`Statement`].

use std::collections::BTreeMap;

use semq_core::{EntityId, Result, SemqError};
use semq_description::SortKey;

use crate::sql::segment::{QuerySegment, SegmentArena, SegmentKind};
use crate::sql::statement::{JoinClause, JoinKind, SortField, Statement, TableSource};
use crate::sql::value::{id_predicate, ID_TABLE};

/// Join clauses rooted at one join field.
#[derive(Debug, Clone)]
struct JoinPlan {
    clauses: Vec<JoinClause>,
    join_field: String,
    sort_fields: BTreeMap<String, String>,
}

impl JoinPlan {
    fn is_optional(&self) -> bool {
        self.clauses
            .first()
            .is_some_and(|c| c.kind == JoinKind::LeftOuter)
    }

    /// Join this plan's first clause to `column`.
    fn attach_to(&mut self, column: &str) {
        if let Some(first) = self.clauses.first_mut() {
            first.join_condition = Some(format!("{column} = {}", self.join_field));
        }
    }

    fn into_statement(self) -> Statement {
        Statement::new(self.join_field, self.clauses)
    }
}

#[derive(Debug, Clone)]
enum Resolved {
    Join(JoinPlan),
    /// A fixed id set, or every entity except that set.
    Values { ids: Vec<EntityId>, negated: bool },
    /// Matches nothing.
    Empty,
}

/// Turns an id set into a plan over the entity table.
fn materialize(alias: &str, ids: &[EntityId], negated: bool) -> JoinPlan {
    let mut clause = JoinClause::table(alias, ID_TABLE);
    let join_field = format!("{alias}.smw_id");
    if !(negated && ids.is_empty()) {
        clause.and_where(&id_predicate(&join_field, ids, negated));
    }
    JoinPlan {
        clauses: vec![clause],
        join_field,
        sort_fields: BTreeMap::new(),
    }
}

/// Resolves the segments of one compilation.
///
/// Conjunction children join on the parent's join field, disjunction
/// children become independent subqueries combined with `UNION`, and id
/// sets turn into `IN` predicates on whatever they are attached to.
pub struct QuerySegmentListResolver<'s> {
    arena: &'s SegmentArena,
}

impl<'s> QuerySegmentListResolver<'s> {
    #[must_use]
    pub fn new(arena: &'s SegmentArena) -> Self {
        Self { arena }
    }

    /// # Errors
    ///
    /// Returns [`SemqError::Internal`] if the segment tree refers to a
    /// segment that does not exist or a child that does not precede its
    /// parent.
    pub fn resolve(&self, root: usize, sort_keys: &[SortKey]) -> Result<Statement> {
        let root_alias = self.segment(root)?.alias.clone();
        let plan = match self.resolve_segment(root)? {
            Resolved::Empty => return Ok(Statement::empty()),
            Resolved::Values { ids, negated } => materialize(&root_alias, &ids, negated),
            Resolved::Join(plan) => plan,
        };

        let sort_fields = sort_keys
            .iter()
            .filter_map(|key| {
                let label = key.label();
                plan.sort_fields.get(&label).map(|column| SortField {
                    label,
                    column: column.clone(),
                    direction: key.direction,
                })
            })
            .collect();

        let mut statement = plan.into_statement();
        statement.sort_fields = sort_fields;
        Ok(statement)
    }

    fn segment(&self, id: usize) -> Result<&'s QuerySegment> {
        self.arena
            .get(id)
            .ok_or_else(|| SemqError::Internal(format!("segment {id} does not exist")))
    }

    fn resolve_segment(&self, id: usize) -> Result<Resolved> {
        let segment = self.segment(id)?;
        for component in &segment.components {
            if component.segment >= id {
                return Err(SemqError::Internal(format!(
                    "segment {id} has child {} that does not precede it",
                    component.segment
                )));
            }
        }

        match segment.kind {
            SegmentKind::Value if segment.ids.is_empty() => Ok(Resolved::Empty),
            SegmentKind::Value => Ok(Resolved::Values {
                ids: segment.ids.clone(),
                negated: false,
            }),
            SegmentKind::Negation => Ok(Resolved::Values {
                ids: segment.ids.clone(),
                negated: true,
            }),
            SegmentKind::Table | SegmentKind::Hierarchy => self.resolve_table(segment),
            SegmentKind::Conjunction => self.resolve_conjunction(segment),
            SegmentKind::Disjunction => self.resolve_disjunction(segment),
        }
    }

    fn resolve_table(&self, segment: &QuerySegment) -> Result<Resolved> {
        let table = segment.join_table.as_deref().ok_or_else(|| {
            SemqError::Internal(format!("table segment {} has no table", segment.id))
        })?;
        let kind = if segment.optional {
            JoinKind::LeftOuter
        } else {
            JoinKind::Inner
        };

        let mut head = JoinClause::table(&segment.alias, table);
        head.kind = kind;
        head.and_where(&segment.where_fragment);
        let mut nested = Vec::new();
        let mut sort_fields = segment.sort_fields.clone();

        for component in &segment.components {
            let column = component.column.as_deref().unwrap_or(&segment.join_field);
            match self.resolve_segment(component.segment)? {
                Resolved::Empty => return Ok(Resolved::Empty),
                Resolved::Values { ids, negated } => {
                    if !(negated && ids.is_empty()) {
                        head.and_where(&id_predicate(column, &ids, negated));
                    }
                }
                Resolved::Join(mut plan) => {
                    plan.attach_to(column);
                    if segment.optional {
                        for clause in &mut plan.clauses {
                            clause.kind = JoinKind::LeftOuter;
                        }
                    }
                    for (label, field) in plan.sort_fields {
                        sort_fields.entry(label).or_insert(field);
                    }
                    nested.extend(plan.clauses);
                }
            }
        }

        let mut clauses = vec![head];
        clauses.extend(nested);
        Ok(Resolved::Join(JoinPlan {
            clauses,
            join_field: segment.join_field.clone(),
            sort_fields,
        }))
    }

    fn resolve_conjunction(&self, segment: &QuerySegment) -> Result<Resolved> {
        let mut required: Vec<JoinPlan> = Vec::new();
        let mut optional: Vec<JoinPlan> = Vec::new();
        let mut positive: Option<Vec<EntityId>> = None;
        let mut excluded: Vec<EntityId> = Vec::new();

        for component in &segment.components {
            match self.resolve_segment(component.segment)? {
                Resolved::Empty => return Ok(Resolved::Empty),
                Resolved::Values { ids, negated: true } => {
                    for id in ids {
                        if !excluded.contains(&id) {
                            excluded.push(id);
                        }
                    }
                }
                Resolved::Values { ids, negated: false } => {
                    positive = Some(match positive {
                        None => ids,
                        Some(current) => current.into_iter().filter(|id| ids.contains(id)).collect(),
                    });
                }
                Resolved::Join(plan) if plan.is_optional() => optional.push(plan),
                Resolved::Join(plan) => required.push(plan),
            }
        }

        if let Some(ids) = &mut positive {
            ids.retain(|id| !excluded.contains(id));
            if ids.is_empty() {
                return Ok(Resolved::Empty);
            }
        }

        if required.is_empty() && optional.is_empty() {
            return Ok(match positive {
                Some(ids) => Resolved::Values {
                    ids,
                    negated: false,
                },
                None => Resolved::Values {
                    ids: excluded,
                    negated: true,
                },
            });
        }

        let mut plans = required.into_iter();
        let mut base = match plans.next() {
            Some(plan) => plan,
            None => materialize(&segment.alias, &[], true),
        };
        let join_field = base.join_field.clone();

        let mut values = Vec::new();
        match positive {
            Some(ids) => values.push(id_predicate(&join_field, &ids, false)),
            None if !excluded.is_empty() => values.push(id_predicate(&join_field, &excluded, true)),
            None => {}
        }
        if let Some(head) = base.clauses.first_mut() {
            for predicate in &values {
                head.and_where(predicate);
            }
        }

        for mut plan in plans.chain(optional) {
            plan.attach_to(&join_field);
            for (label, field) in plan.sort_fields {
                base.sort_fields.entry(label).or_insert(field);
            }
            base.clauses.extend(plan.clauses);
        }
        Ok(Resolved::Join(base))
    }

    fn resolve_disjunction(&self, segment: &QuerySegment) -> Result<Resolved> {
        let mut branches: Vec<(Resolved, &str)> = Vec::new();
        for component in &segment.components {
            match self.resolve_segment(component.segment)? {
                Resolved::Empty => {}
                resolved => branches.push((resolved, &self.segment(component.segment)?.alias)),
            }
        }

        if branches.is_empty() {
            return Ok(Resolved::Empty);
        }

        // Plain id sets union without a subquery.
        if branches
            .iter()
            .all(|(b, _)| matches!(b, Resolved::Values { negated: false, .. }))
        {
            let mut ids: Vec<EntityId> = Vec::new();
            for (branch, _) in branches {
                if let Resolved::Values { ids: more, .. } = branch {
                    for id in more {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
            }
            return Ok(Resolved::Values {
                ids,
                negated: false,
            });
        }

        let mut parts = Vec::with_capacity(branches.len());
        for (branch, alias) in branches {
            let statement = match branch {
                Resolved::Join(plan) => plan.into_statement(),
                Resolved::Values { ids, negated } => {
                    materialize(alias, &ids, negated).into_statement()
                }
                Resolved::Empty => continue,
            };
            parts.push(statement);
        }

        let join_field = format!("{}.id", segment.alias);
        Ok(Resolved::Join(JoinPlan {
            clauses: vec![JoinClause {
                alias: segment.alias.clone(),
                source: TableSource::Union(parts),
                kind: JoinKind::Inner,
                join_condition: None,
                where_fragment: String::new(),
            }],
            join_field,
            sort_fields: BTreeMap::new(),
        }))
    }
}
