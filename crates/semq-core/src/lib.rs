//! # semq-core
//!
//! Core types shared by every semq crate:
//! - Data items ([`WikiPage`], [`DataItem`], [`ValueType`], [`EntityId`])
//! - Error hierarchy ([`SemqError`], [`LookupError`])
//! - Compiler limits and configuration ([`QueryLimits`], [`CompilerConfig`])
//! - Non-fatal [`Diagnostic`]s
//! - Collaborator interfaces ([`HierarchyLookup`], [`EntityLookup`])

pub mod dataitem;
pub mod diagnostic;
pub mod error;
pub mod limits;
pub mod lookup;

pub use dataitem::{
    julian_day, namespace_name, namespace_name_or_number, DataItem, EntityId, ValueType, WikiPage,
    NS_CATEGORY, NS_CONCEPT, NS_MAIN, NS_PROPERTY,
};
pub use diagnostic::{Diagnostic, DiagnosticReason, Diagnostics};
pub use error::{LookupError, Result, SemqError};
pub use limits::{CompilerConfig, GraphConfig, QueryLimits};
pub use lookup::{EntityLookup, HierarchyKind, HierarchyLookup};
