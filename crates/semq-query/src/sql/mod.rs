//! Relational backend.
//!
//! Compilation runs in two phases. [`builder::SegmentBuilder`] lowers the
//! description into a tree of [`segment::QuerySegment`]s, and
//! [`resolver::QuerySegmentListResolver`] folds that tree into one
//! [`statement::Statement`].

pub mod builder;
pub mod resolver;
pub mod segment;
pub mod statement;
pub mod value;

use serde::Serialize;

use semq_core::Result;
use semq_description::{Description, Query};

use crate::context::CompilationContext;
use builder::SegmentBuilder;
use resolver::QuerySegmentListResolver;
use segment::QuerySegment;
use statement::Statement;

/// Output of the relational backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlPlan {
    /// Id of the root segment in `segments`.
    pub root: usize,
    pub segments: Vec<QuerySegment>,
    pub statement: Statement,
}

impl SqlPlan {
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.statement.to_sql()
    }
}

/// Compile an already pruned `description` using the ordering and paging
/// of `query`.
///
/// # Errors
///
/// Propagates lookup failures, malformed collaborator responses and
/// internal inconsistencies of the segment tree.
pub fn compile(
    description: &Description,
    query: &Query,
    ctx: &mut CompilationContext<'_>,
) -> Result<SqlPlan> {
    let mut builder = SegmentBuilder::new(ctx, &query.sort_keys);
    let root = builder.compile(description)?;
    let root = builder.add_sort_joins(root)?;
    let arena = builder.finish();

    let mut statement = QuerySegmentListResolver::new(&arena).resolve(root, &query.sort_keys)?;
    statement.limit = query.limit;
    statement.offset = query.offset;
    tracing::debug!(segments = arena.len(), root, empty = statement.empty, "join plan resolved");

    Ok(SqlPlan {
        root,
        segments: arena.into_vec(),
        statement,
    })
}
