//! # semq-query
//!
//! Compiles semantic query descriptions into backend plans.
//!
//! Includes:
//! - Hierarchy expansion and concept resolution shared by both backends
//! - Relational backend: a join plan of query segments rendered as SQL
//! - Graph backend: a condition algebra rendered as SPARQL
//! - Execution of relational plans against the SQLite store
//! - Result and plan formatting (JSON, Table, Markdown)

pub mod compiler;
pub mod concept;
pub mod context;
pub mod executor;
pub mod formatter;
pub mod hierarchy;
pub mod sparql;
pub mod sql;

pub use compiler::{compile, Backend, CompiledQuery, Plan};
pub use context::{Collaborators, CompilationContext};
pub use executor::execute;
pub use formatter::{
    format_explain, format_plan, format_results, OutputFormat, QueryResult, ResultRow,
};
