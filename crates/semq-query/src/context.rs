//! Per-call compilation state.
//!
//! A [`CompilationContext`] lives for exactly one `compile` call. It owns
//! the diagnostics gathered so far, the fresh-name counter and the
//! concept recursion guard, and is the only path through which the
//! backends reach the lookup collaborators. Nothing here is shared
//! between calls.

use semq_core::{
    CompilerConfig, Diagnostic, Diagnostics, EntityId, EntityLookup, HierarchyKind,
    HierarchyLookup, QueryLimits, Result, SemqError, ValueType, WikiPage,
};
use semq_description::{ConceptStore, Description};

use crate::concept::ConceptResolver;
use crate::hierarchy::HierarchyExpander;

/// The lookup collaborators a compilation consults.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub hierarchy: &'a dyn HierarchyLookup,
    pub entities: &'a dyn EntityLookup,
    pub concepts: &'a dyn ConceptStore,
}

impl<'a> Collaborators<'a> {
    /// Use one store for every collaborator role.
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: HierarchyLookup + EntityLookup + ConceptStore,
    {
        Self {
            hierarchy: store,
            entities: store,
            concepts: store,
        }
    }
}

pub struct CompilationContext<'a> {
    collaborators: Collaborators<'a>,
    config: &'a CompilerConfig,
    limits: QueryLimits,
    diagnostics: Diagnostics,
    concepts: ConceptResolver<'a>,
    /// Size units still available to inlined concept definitions.
    size_budget: usize,
    next_id: usize,
}

impl<'a> CompilationContext<'a> {
    #[must_use]
    pub fn new(
        collaborators: Collaborators<'a>,
        config: &'a CompilerConfig,
        diagnostics: Diagnostics,
    ) -> Self {
        let limits = config.limits();
        Self {
            collaborators,
            config,
            limits,
            diagnostics,
            concepts: ConceptResolver::new(
                collaborators.concepts,
                limits.max_concept_recursion_depth,
            ),
            size_budget: limits.max_size,
            next_id: 0,
        }
    }

    #[must_use]
    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        self.config
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Next value of the call-scoped counter used for fresh names.
    pub fn fresh_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    /// `root` together with its sub-categories or sub-properties, in BFS
    /// order with `root` first.
    ///
    /// Returns only `root` when inclusion of that kind is switched off.
    /// A truncated expansion is reported as a diagnostic.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures and malformed hierarchy responses.
    pub fn expand(&mut self, root: &WikiPage, kind: HierarchyKind) -> Result<Vec<WikiPage>> {
        let enabled = match kind {
            HierarchyKind::Class => self.config.subcategory_inclusion,
            HierarchyKind::Property => self.config.subproperty_inclusion,
        };
        if !enabled {
            return Ok(vec![root.clone()]);
        }

        let expander = HierarchyExpander::new(
            self.collaborators.hierarchy,
            self.limits.max_hierarchy_depth,
            self.limits.max_hierarchy_size,
        );
        let expansion = expander.expand(root, kind)?;
        if expansion.truncated {
            self.report(Diagnostic::truncated(
                root.to_string(),
                format!(
                    "{kind} hierarchy of {root} truncated at {} members",
                    expansion.members.len()
                ),
            ));
        }
        Ok(expansion.members)
    }

    /// Store id of `page`.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::MalformedResponse`] if the store answers with
    /// a non-positive id, and propagates lookup failures.
    pub fn entity_id(&self, page: &WikiPage) -> Result<Option<EntityId>> {
        match self.collaborators.entities.id_for(page)? {
            Some(id) if !id.is_valid() => Err(SemqError::MalformedResponse(format!(
                "entity lookup returned id {id} for {page}"
            ))),
            other => Ok(other),
        }
    }

    /// Ids of every page in `pages` the store knows, without duplicates.
    ///
    /// # Errors
    ///
    /// See [`CompilationContext::entity_id`].
    pub fn entity_ids(&self, pages: &[WikiPage]) -> Result<Vec<EntityId>> {
        let mut ids = Vec::with_capacity(pages.len());
        for page in pages {
            if let Some(id) = self.entity_id(page)? {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// # Errors
    ///
    /// Propagates lookup failures.
    pub fn property_type(&self, property: &WikiPage) -> Result<ValueType> {
        Ok(self.collaborators.entities.property_type(property)?)
    }

    /// Take `size` units out of the budget shared by every concept
    /// expansion of this compilation.
    pub fn charge(&mut self, size: usize) {
        self.size_budget = self.size_budget.saturating_sub(size);
    }

    /// Expand a concept reference into its (pruned) definition.
    ///
    /// All references of one compilation share the query size budget, so
    /// the inlined definitions together never exceed `max_size`.
    ///
    /// # Errors
    ///
    /// Propagates concept storage failures.
    pub fn resolve_concept(&mut self, concept: &WikiPage) -> Result<Description> {
        let resolved = self
            .concepts
            .resolve(concept, self.size_budget, &mut self.diagnostics)?;
        let resolved = resolved.prune(
            self.size_budget,
            self.limits.max_depth,
            &mut self.diagnostics,
        );
        self.charge(resolved.size());
        Ok(resolved)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators for unit tests.

    use std::cell::Cell;
    use std::collections::HashMap;

    use semq_core::{
        EntityId, EntityLookup, HierarchyKind, HierarchyLookup, LookupError, ValueType, WikiPage,
    };
    use semq_description::{ConceptStore, Description};

    #[derive(Default)]
    pub struct MemoryStore {
        pub children: HashMap<(WikiPage, HierarchyKind), Vec<WikiPage>>,
        pub ids: HashMap<WikiPage, EntityId>,
        pub types: HashMap<WikiPage, ValueType>,
        pub concepts: HashMap<WikiPage, Description>,
        pub offline: bool,
        /// Number of concept definitions read so far.
        pub concept_reads: Cell<usize>,
    }

    impl MemoryStore {
        /// Register `page` with the next free id and return it.
        pub fn entity(&mut self, page: &WikiPage) -> EntityId {
            let next = EntityId(self.ids.len() as i64 + 1);
            *self.ids.entry(page.clone()).or_insert(next)
        }

        pub fn subcategory(&mut self, child: &str, parent: &str) {
            let child = WikiPage::category(child);
            let parent = WikiPage::category(parent);
            self.entity(&child);
            self.entity(&parent);
            self.children
                .entry((parent, HierarchyKind::Class))
                .or_default()
                .push(child);
        }

        /// Declare `child` as a sub-property of `parent`, sharing its type.
        pub fn subproperty(&mut self, child: &str, parent: &str, value_type: ValueType) {
            self.property(child, value_type);
            self.property(parent, value_type);
            self.children
                .entry((WikiPage::property(parent), HierarchyKind::Property))
                .or_default()
                .push(WikiPage::property(child));
        }

        pub fn property(&mut self, name: &str, value_type: ValueType) -> EntityId {
            let property = WikiPage::property(name);
            self.types.insert(property.clone(), value_type);
            self.entity(&property)
        }

        fn check(&self) -> Result<(), LookupError> {
            if self.offline {
                return Err(LookupError::Unavailable {
                    collaborator: "memory",
                    reason: "offline".to_string(),
                });
            }
            Ok(())
        }
    }

    impl HierarchyLookup for MemoryStore {
        fn children_of(
            &self,
            page: &WikiPage,
            kind: HierarchyKind,
        ) -> Result<Vec<WikiPage>, LookupError> {
            self.check()?;
            Ok(self
                .children
                .get(&(page.clone(), kind))
                .cloned()
                .unwrap_or_default())
        }
    }

    impl EntityLookup for MemoryStore {
        fn id_for(&self, page: &WikiPage) -> Result<Option<EntityId>, LookupError> {
            self.check()?;
            Ok(self.ids.get(page).copied())
        }

        fn property_type(&self, property: &WikiPage) -> Result<ValueType, LookupError> {
            self.check()?;
            Ok(self.types.get(property).copied().unwrap_or_default())
        }
    }

    impl ConceptStore for MemoryStore {
        fn definition_of(&self, concept: &WikiPage) -> Result<Option<Description>, LookupError> {
            self.check()?;
            self.concept_reads.set(self.concept_reads.get() + 1);
            Ok(self.concepts.get(concept).cloned())
        }
    }
}
