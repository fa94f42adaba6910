//! Description → graph-pattern condition.

use semq_core::{
    DataItem, Diagnostic, DiagnosticReason, HierarchyKind, Result, ValueType, WikiPage,
};
use semq_description::{Comparator, Description, SortDirection, SortKey};
use serde::Serialize;

use crate::context::CompilationContext;
use crate::sparql::condition::Condition;
use crate::sparql::encoder::{regex_pattern, string_literal, Encoder};

/// Variable the top-level condition constrains.
pub const RESULT_VARIABLE: &str = "?result";

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTerm {
    pub variable: String,
    pub direction: SortDirection,
}

pub struct ConditionBuilder<'c, 'a> {
    ctx: &'c mut CompilationContext<'a>,
    encoder: Encoder,
    sort_keys: &'c [SortKey],
    /// Properties whose values are being described, innermost last.
    properties: Vec<WikiPage>,
}

impl<'c, 'a> ConditionBuilder<'c, 'a> {
    pub fn new(
        ctx: &'c mut CompilationContext<'a>,
        encoder: Encoder,
        sort_keys: &'c [SortKey],
    ) -> Self {
        Self {
            ctx,
            encoder,
            sort_keys,
            properties: Vec::new(),
        }
    }

    fn declare(&self, condition: &mut Condition, prefixes: &[&str]) {
        for prefix in prefixes {
            if let Some(iri) = self.encoder.namespace_iri(prefix) {
                condition.declare(*prefix, iri);
            }
        }
    }

    fn fresh_variable(&mut self) -> String {
        format!("?v{}", self.ctx.fresh_id())
    }

    fn sort_label(&self, property: &WikiPage) -> Option<String> {
        self.sort_keys
            .iter()
            .find(|key| key.property.as_ref() == Some(property))
            .map(SortKey::label)
    }

    /// Condition on `join_variable`, whose values have `value_type`.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures and malformed collaborator responses.
    pub fn build(
        &mut self,
        description: &Description,
        join_variable: &str,
        value_type: ValueType,
    ) -> Result<Condition> {
        let literal = value_type != ValueType::Page;
        match description {
            Description::Thing => Ok(Condition::truth()),
            Description::Namespace { .. }
            | Description::Class { .. }
            | Description::SomeProperty { .. }
            | Description::Value {
                property: Some(_), ..
            } if literal => {
                tracing::debug!(subtree = %description, %value_type, "page description under a literal property matches nothing");
                Ok(Condition::falsity())
            }
            Description::Namespace { namespace } => {
                let mut condition = Condition::pattern(
                    format!("{join_variable} swivt:wikiNamespace \"{namespace}\"^^xsd:integer ."),
                    &[join_variable],
                );
                self.declare(&mut condition, &["swivt", "xsd"]);
                Ok(condition)
            }
            Description::Class { categories } => self.class(categories, join_variable),
            Description::Value {
                property: Some(property),
                comparator,
                datum,
            } => {
                let inner = Description::page_value(*comparator, datum.clone());
                self.some_property(property, &inner, join_variable)
            }
            Description::Value {
                property: None,
                comparator,
                datum,
            } => Ok(self.value(*comparator, datum, join_variable, value_type, description)),
            Description::SomeProperty {
                property,
                description: inner,
            } => self.some_property(property, inner, join_variable),
            Description::Concept { concept } => {
                let resolved = self.ctx.resolve_concept(concept)?;
                self.build(&resolved, join_variable, value_type)
            }
            Description::Conjunction { descriptions, .. } => {
                let parts = descriptions
                    .iter()
                    .map(|d| self.build(d, join_variable, value_type))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Condition::conjoin(parts))
            }
            Description::Disjunction { descriptions, .. } => {
                let parts = descriptions
                    .iter()
                    .map(|d| self.build(d, join_variable, value_type))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Condition::disjoin(parts, join_variable))
            }
        }
    }

    fn class(&mut self, categories: &[WikiPage], join_variable: &str) -> Result<Condition> {
        let mut members: Vec<WikiPage> = Vec::new();
        for category in categories {
            for member in self.ctx.expand(category, HierarchyKind::Class)? {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }
        if members.is_empty() {
            return Ok(Condition::falsity());
        }

        let patterns: Vec<String> = members
            .iter()
            .map(|m| format!("{join_variable} rdf:type {} .", self.encoder.page(m)))
            .collect();
        let mut condition = Condition::pattern(alternatives(patterns), &[join_variable]);
        self.declare(&mut condition, &["rdf", "wiki"]);
        Ok(condition)
    }

    fn value(
        &mut self,
        comparator: Comparator,
        datum: &DataItem,
        join_variable: &str,
        value_type: ValueType,
        original: &Description,
    ) -> Condition {
        if value_type == ValueType::Page {
            return self.page_value(comparator, datum, join_variable, original);
        }

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
        if let Some(detail) = problem {
            let subtree = match self.properties.last() {
                Some(property) => {
                    Description::value(property.clone(), comparator, datum.clone()).query_string()
                }
                None => original.query_string(),
            };
            self.ctx.report(Diagnostic::new(
                subtree,
                DiagnosticReason::UnsupportedComparator,
                detail,
            ));
            return Condition::truth();
        }

        let term = self.encoder.datum(datum);
        let mut condition = match comparator {
            Comparator::Eq => Condition::singleton(term, join_variable),
            Comparator::Like | Comparator::NotLike => {
                let text = match datum {
                    DataItem::Text(s) => s.clone(),
                    other => other.to_string(),
                };
                Condition::filter(
                    regex(join_variable, comparator, &text),
                    &[join_variable],
                )
            }
            _ => Condition::filter(
                format!("{join_variable} {comparator} {term}"),
                &[join_variable],
            ),
        };
        self.declare(&mut condition, Encoder::datum_prefixes(datum));
        condition
    }

    fn page_value(
        &mut self,
        comparator: Comparator,
        datum: &DataItem,
        join_variable: &str,
        original: &Description,
    ) -> Condition {
        let Some(page) = datum.as_page() else {
            tracing::debug!(subtree = %original, "non-page datum at entity level matches nothing");
            return Condition::falsity();
        };

        let term = self.encoder.page(page);
        let mut condition = match comparator {
            Comparator::Eq => Condition::singleton(term, join_variable),
            Comparator::Neq => {
                Condition::filter(format!("{join_variable} != {term}"), &[join_variable])
            }
            _ => {
                let sort_variable = format!("{join_variable}sk");
                let expression = match comparator {
                    Comparator::Like | Comparator::NotLike => {
                        regex(&sort_variable, comparator, &page.sort_key())
                    }
                    _ => format!(
                        "{sort_variable} {comparator} {}",
                        string_literal(&page.sort_key())
                    ),
                };
                let mut condition = Condition::filter(expression, &[join_variable]);
                condition.add_weak(
                    sort_variable.clone(),
                    format!("OPTIONAL {{ {join_variable} swivt:wikiPageSortKey {sort_variable} . }}"),
                );
                condition.order_by_variable = sort_variable;
                self.declare(&mut condition, &["swivt"]);
                condition
            }
        };
        self.declare(&mut condition, &["wiki"]);
        condition
    }

    fn some_property(
        &mut self,
        property: &WikiPage,
        inner: &Description,
        join_variable: &str,
    ) -> Result<Condition> {
        let properties = self.ctx.expand(property, HierarchyKind::Property)?;
        let value_type = self.ctx.property_type(property)?;
        let object = self.fresh_variable();

        self.properties.push(property.clone());
        let nested = self.build(inner, &object, value_type);
        self.properties.pop();
        let nested = nested?;
        if nested.is_false() {
            return Ok(Condition::falsity());
        }

        let inlined = match &nested.match_element {
            Some(element) if nested.is_bare_singleton() => Some(element.clone()),
            _ => None,
        };
        let object_term = inlined.clone().unwrap_or_else(|| object.clone());
        let patterns: Vec<String> = properties
            .iter()
            .map(|p| format!("{join_variable} {} {object_term} .", self.encoder.property(p)))
            .collect();

        let mut condition = Condition::pattern(alternatives(patterns), &[join_variable]);
        if inlined.is_none() {
            condition.bound_variables.insert(object.clone());
            if let Some(element) = &nested.match_element {
                condition.push_filter(format!("{object} = {element}"));
            }
            for pattern in &nested.cogent {
                condition.push_cogent(pattern.clone());
            }
            for filter in &nested.filters {
                condition.push_filter(filter.clone());
            }
            condition
                .bound_variables
                .extend(nested.bound_variables.iter().cloned());
            let bound = condition.bound_variables.clone();
            condition.free_variables.extend(
                nested
                    .free_variables
                    .iter()
                    .filter(|v| !bound.contains(*v))
                    .cloned(),
            );
        }
        condition.absorb_context(&nested);
        self.declare(&mut condition, &["property"]);

        if let (Some(label), None) = (self.sort_label(property), &inlined) {
            let variable = if value_type == ValueType::Page {
                let sort_variable = format!("{object}sk");
                condition.add_weak(
                    sort_variable.clone(),
                    format!("OPTIONAL {{ {object} swivt:wikiPageSortKey {sort_variable} . }}"),
                );
                self.declare(&mut condition, &["swivt"]);
                sort_variable
            } else {
                object.clone()
            };
            condition.order_variables.entry(label).or_insert(variable);
        }
        Ok(condition)
    }

    /// Resolve every sort key to a variable, adding `OPTIONAL` bindings
    /// to `condition` for keys it does not already bind.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    pub fn order_terms(&mut self, condition: &mut Condition) -> Result<Vec<OrderTerm>> {
        let mut terms = Vec::new();
        for key in self.sort_keys {
            let label = key.label();
            let bound = condition.order_variables.get(&label).cloned();
            let variable = match (bound, &key.property) {
                (Some(variable), _) => variable,
                (None, None) => {
                    let variable = format!("{RESULT_VARIABLE}sk");
                    if !condition.needs_anchor() {
                        condition.add_weak(
                            variable.clone(),
                            format!("OPTIONAL {{ {RESULT_VARIABLE} swivt:wikiPageSortKey {variable} . }}"),
                        );
                    }
                    self.declare(condition, &["swivt"]);
                    variable
                }
                (None, Some(property)) => {
                    let value_type = self.ctx.property_type(property)?;
                    let object = self.fresh_variable();
                    let predicate = self.encoder.property(property);
                    let variable = if value_type == ValueType::Page {
                        let sort_variable = format!("{object}sk");
                        condition.add_weak(
                            sort_variable.clone(),
                            format!(
                                "OPTIONAL {{ {RESULT_VARIABLE} {predicate} {object} . {object} swivt:wikiPageSortKey {sort_variable} . }}"
                            ),
                        );
                        self.declare(condition, &["property", "swivt"]);
                        sort_variable
                    } else {
                        condition.add_weak(
                            object.clone(),
                            format!("OPTIONAL {{ {RESULT_VARIABLE} {predicate} {object} . }}"),
                        );
                        self.declare(condition, &["property"]);
                        object
                    };
                    condition.order_variables.insert(label, variable.clone());
                    variable
                }
            };
            terms.push(OrderTerm {
                variable,
                direction: key.direction,
            });
        }
        Ok(terms)
    }
}

fn alternatives(mut patterns: Vec<String>) -> String {
    if patterns.len() == 1 {
        return patterns.remove(0);
    }
    let groups: Vec<String> = patterns.iter().map(|p| format!("{{ {p} }}")).collect();
    groups.join(" UNION ")
}

fn regex(variable: &str, comparator: Comparator, pattern: &str) -> String {
    let negation = if comparator == Comparator::NotLike { "!" } else { "" };
    format!(
        "{negation}regex( str({variable}), {}, \"s\" )",
        string_literal(&regex_pattern(pattern))
    )
}
