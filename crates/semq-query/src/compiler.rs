//! Query → backend plan.
//!
//! [`compile`] is the single entry point. It prunes the description to
//! the configured budget, creates a fresh [`CompilationContext`] and hands
//! over to the selected backend. Everything it learned along the way that
//! did not stop compilation is returned as diagnostics.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use semq_core::{CompilerConfig, Diagnostic, Diagnostics, Result, SemqError};
use semq_description::{PrintRequest, Query};

use crate::context::{Collaborators, CompilationContext};
use crate::sparql::GraphQuery;
use crate::sql::SqlPlan;

/// Target backend of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sql,
    Sparql,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql => write!(f, "sql"),
            Self::Sparql => write!(f, "sparql"),
        }
    }
}

impl FromStr for Backend {
    type Err = SemqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sql" => Ok(Self::Sql),
            "sparql" => Ok(Self::Sparql),
            other => Err(SemqError::Config(format!(
                "unknown backend '{other}', expected 'sql' or 'sparql'"
            ))),
        }
    }
}

/// A backend plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum Plan {
    Sql(SqlPlan),
    Sparql(GraphQuery),
}

impl Plan {
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            Self::Sql(_) => Backend::Sql,
            Self::Sparql(_) => Backend::Sparql,
        }
    }

    /// The plan as query text for its backend.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Sql(plan) => plan.to_sql(),
            Self::Sparql(query) => query.to_sparql(),
        }
    }
}

/// Result of a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub plan: Plan,
    pub diagnostics: Vec<Diagnostic>,
    /// Fingerprint of the description as received, before pruning.
    pub fingerprint: String,
    pub print_requests: Vec<PrintRequest>,
}

impl CompiledQuery {
    /// Whether some part of the query was dropped or replaced.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Compile `query` for `backend`.
///
/// # Errors
///
/// Returns [`SemqError::Lookup`] when a collaborator fails (retryable),
/// [`SemqError::MalformedResponse`] when it answers with nonsense and
/// [`SemqError::Internal`] on an inconsistent join plan. Oversized
/// queries, cycles and unsupported comparators are not errors; they show
/// up in [`CompiledQuery::diagnostics`].
pub fn compile(
    query: &Query,
    backend: Backend,
    collaborators: Collaborators<'_>,
    config: &CompilerConfig,
) -> Result<CompiledQuery> {
    let fingerprint = query.description.fingerprint();
    let print_requests = query.description.print_requests();
    tracing::debug!(%backend, fingerprint = %fingerprint, "compiling query");

    let limits = config.limits();
    let mut diagnostics = Diagnostics::new();
    let description = query
        .description
        .prune(limits.max_size, limits.max_depth, &mut diagnostics);

    let mut ctx = CompilationContext::new(collaborators, config, diagnostics);
    ctx.charge(description.size());
    let plan = match backend {
        Backend::Sql => Plan::Sql(crate::sql::compile(&description, query, &mut ctx)?),
        Backend::Sparql => Plan::Sparql(crate::sparql::compile(&description, query, &mut ctx)?),
    };
    let diagnostics = ctx.into_diagnostics().into_vec();

    tracing::debug!(
        %backend,
        diagnostics = diagnostics.len(),
        "query compiled"
    );
    Ok(CompiledQuery {
        plan,
        diagnostics,
        fingerprint,
        print_requests,
    })
}
