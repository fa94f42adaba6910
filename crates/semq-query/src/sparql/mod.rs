//! Graph (SPARQL) backend.

pub mod builder;
pub mod condition;
pub mod encoder;

use std::fmt::Write as _;

use serde::Serialize;

use semq_core::{Result, ValueType};
use semq_description::{Description, Query};

use crate::context::CompilationContext;
use builder::{ConditionBuilder, OrderTerm, RESULT_VARIABLE};
use condition::Condition;
use encoder::{Encoder, SWIVT_IRI};

/// A condition on `?result` plus ordering and paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphQuery {
    pub condition: Condition,
    pub order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl GraphQuery {
    /// Render as a SPARQL `SELECT` query.
    #[must_use]
    pub fn to_sparql(&self) -> String {
        let condition = &self.condition;
        let anchored = condition.needs_anchor();

        let mut namespaces = condition.namespaces.clone();
        if anchored {
            namespaces
                .entry("swivt".to_string())
                .or_insert_with(|| SWIVT_IRI.to_string());
        }

        let mut lines = Vec::new();
        if condition.is_false() {
            lines.push("FILTER( false )".to_string());
        } else {
            if let Some(element) = &condition.match_element {
                lines.push(format!("VALUES {RESULT_VARIABLE} {{ {element} }}"));
            }
            if anchored {
                lines.push(format!(
                    "{RESULT_VARIABLE} swivt:wikiPageSortKey {RESULT_VARIABLE}sk ."
                ));
            }
            lines.extend(condition.cogent.iter().cloned());
            lines.extend(condition.filters.iter().map(|f| format!("FILTER( {f} )")));
            lines.extend(condition.weak.values().cloned());
        }

        let mut out = String::new();
        for (prefix, iri) in &namespaces {
            let _ = writeln!(out, "PREFIX {prefix}: <{iri}>");
        }
        let _ = writeln!(out, "SELECT DISTINCT {RESULT_VARIABLE} WHERE {{");
        for line in lines {
            let _ = writeln!(out, "  {line}");
        }
        out.push('}');

        if !self.order.is_empty() {
            let terms: Vec<String> = self
                .order
                .iter()
                .map(|t| format!("{}({})", t.direction.keyword(), t.variable))
                .collect();
            let _ = write!(out, "\nORDER BY {}", terms.join(" "));
        }
        if let Some(limit) = self.limit {
            let _ = write!(out, "\nLIMIT {limit}");
        }
        if let Some(offset) = self.offset {
            let _ = write!(out, "\nOFFSET {offset}");
        }
        out
    }
}

/// Compile an already pruned `description` using the ordering and paging
/// of `query`.
///
/// # Errors
///
/// Propagates lookup failures and malformed collaborator responses.
pub fn compile(
    description: &Description,
    query: &Query,
    ctx: &mut CompilationContext<'_>,
) -> Result<GraphQuery> {
    let encoder = Encoder::new(ctx.config().graph.base_iri.clone());
    let mut builder = ConditionBuilder::new(ctx, encoder, &query.sort_keys);
    let mut condition = builder.build(description, RESULT_VARIABLE, ValueType::Page)?;
    let order = builder.order_terms(&mut condition)?;
    tracing::debug!(
        kind = ?condition.kind,
        safe = condition.is_safe,
        patterns = condition.cogent.len(),
        "graph condition built"
    );

    Ok(GraphQuery {
        condition,
        order,
        limit: query.limit,
        offset: query.offset,
    })
}
