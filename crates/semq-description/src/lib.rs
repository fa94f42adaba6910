//! # semq-description
//!
//! The backend-independent query language of semq.
//!
//! A [`Description`] is produced by the host's query-syntax parser and
//! consumed by the compilers in `semq-query`. The AST carries its own
//! weights ([`Description::size`], [`Description::depth`]), the pruning
//! policy, query-string rendering and a stable fingerprint.

pub mod concept;
pub mod description;
pub mod query;

pub use concept::ConceptStore;
pub use description::{Comparator, Description};
pub use query::{PrintKind, PrintRequest, Query, SortDirection, SortKey};
