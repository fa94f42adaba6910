//! Concept storage collaborator.

use semq_core::{LookupError, WikiPage};

use crate::description::Description;

/// Source of stored concept definitions.
pub trait ConceptStore {
    /// The defining description of `concept`, or `None` if the concept
    /// page has no definition.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the concept storage cannot be read.
    fn definition_of(&self, concept: &WikiPage) -> Result<Option<Description>, LookupError>;
}
