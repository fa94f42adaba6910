//! Concept expansion with cycle, depth and size guards.

use std::collections::HashMap;

use semq_core::{Diagnostic, DiagnosticReason, Diagnostics, Result, WikiPage};
use semq_description::{ConceptStore, Description};

/// Expands concept references into their stored definitions.
///
/// The guard holds the chain of concepts currently being expanded. A
/// concept that is already on the chain, or a chain that has reached the
/// configured depth, is replaced by `Thing` and reported.
///
/// Expansion also draws on a size budget: every inlined node and nested
/// reference costs its weight, and once the budget is spent the rest of
/// the expansion becomes `Thing`. Definitions are read from the store at
/// most once per resolver.
pub struct ConceptResolver<'a> {
    store: &'a dyn ConceptStore,
    max_depth: usize,
    guard: Vec<WikiPage>,
    definitions: HashMap<WikiPage, Option<Description>>,
    remaining: usize,
    exhausted: bool,
}

impl<'a> ConceptResolver<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ConceptStore, max_depth: usize) -> Self {
        Self {
            store,
            max_depth,
            guard: Vec::new(),
            definitions: HashMap::new(),
            remaining: 0,
            exhausted: false,
        }
    }

    /// The definition of `concept` with every nested concept expanded,
    /// using at most `budget` size units.
    ///
    /// An undefined concept matches nothing. Running out of budget is
    /// reported once per resolver, however many references hit it.
    ///
    /// # Errors
    ///
    /// Returns [`semq_core::SemqError::Lookup`] if the concept storage
    /// cannot be read.
    pub fn resolve(
        &mut self,
        concept: &WikiPage,
        budget: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Description> {
        self.remaining = budget;
        if budget == 0 {
            self.exhaust(&Description::concept(concept.clone()), diagnostics);
            return Ok(Description::Thing);
        }
        self.inline(concept, diagnostics)
    }

    fn inline(&mut self, concept: &WikiPage, diagnostics: &mut Diagnostics) -> Result<Description> {
        let reference = Description::concept(concept.clone());

        if self.guard.contains(concept) {
            let mut chain: Vec<String> = self.guard.iter().map(WikiPage::to_string).collect();
            chain.push(concept.to_string());
            diagnostics.push(Diagnostic::new(
                reference.query_string(),
                DiagnosticReason::CycleDetected,
                format!("concept cycle {}", chain.join(" -> ")),
            ));
            return Ok(Description::Thing);
        }

        if self.guard.len() >= self.max_depth {
            diagnostics.push(Diagnostic::truncated(
                reference.query_string(),
                format!("concept nesting deeper than {}", self.max_depth),
            ));
            return Ok(Description::Thing);
        }

        let Some(definition) = self.definition(concept)? else {
            tracing::debug!(concept = %concept, "undefined concept matches nothing");
            return Ok(Description::nothing());
        };

        self.guard.push(concept.clone());
        let expanded = self.expand(&definition, diagnostics);
        self.guard.pop();
        expanded
    }

    fn definition(&mut self, concept: &WikiPage) -> Result<Option<Description>> {
        if let Some(known) = self.definitions.get(concept) {
            return Ok(known.clone());
        }
        let definition = self.store.definition_of(concept)?;
        self.definitions.insert(concept.clone(), definition.clone());
        Ok(definition)
    }

    /// Spend `cost` units on `subtree`, or report exhaustion.
    fn take(&mut self, cost: usize, subtree: &Description, log: &mut Diagnostics) -> bool {
        if cost <= self.remaining {
            self.remaining -= cost;
            return true;
        }
        self.remaining = 0;
        self.exhaust(subtree, log);
        false
    }

    fn exhaust(&mut self, subtree: &Description, log: &mut Diagnostics) {
        if !self.exhausted {
            self.exhausted = true;
            log.push(Diagnostic::truncated(
                subtree.query_string(),
                "concept expansion exceeds the query size budget",
            ));
        }
    }

    fn expand(&mut self, description: &Description, log: &mut Diagnostics) -> Result<Description> {
        let expanded = match description {
            Description::Concept { concept } => {
                if !self.take(1, description, log) {
                    return Ok(Description::Thing);
                }
                self.inline(concept, log)?
            }
            Description::SomeProperty {
                property,
                description: nested,
            } => {
                if !self.take(1, description, log) {
                    return Ok(Description::Thing);
                }
                Description::some_property(property.clone(), self.expand(nested, log)?)
            }
            Description::Conjunction {
                descriptions,
                print_requests,
            } => {
                let parts = self.expand_all(descriptions, log)?;
                print_requests
                    .iter()
                    .cloned()
                    .fold(Description::conjunction(parts), Description::with_print_request)
            }
            Description::Disjunction {
                descriptions,
                print_requests,
            } => {
                let parts = self.expand_all(descriptions, log)?;
                print_requests
                    .iter()
                    .cloned()
                    .fold(Description::disjunction(parts), Description::with_print_request)
            }
            leaf => {
                if !self.take(leaf.size(), leaf, log) {
                    return Ok(Description::Thing);
                }
                leaf.clone()
            }
        };
        Ok(expanded)
    }

    fn expand_all(
        &mut self,
        descriptions: &[Description],
        log: &mut Diagnostics,
    ) -> Result<Vec<Description>> {
        descriptions.iter().map(|d| self.expand(d, log)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::MemoryStore;
    use semq_core::DataItem;
    use semq_description::Comparator;

    const BUDGET: usize = 12;

    fn concept(name: &str) -> Description {
        Description::concept(WikiPage::concept(name))
    }

    fn define(store: &mut MemoryStore, name: &str, definition: Description) {
        store.concepts.insert(WikiPage::concept(name), definition);
    }

    #[test]
    fn self_reference_is_thing_with_one_cycle() {
        let mut store = MemoryStore::default();
        define(
            &mut store,
            "A",
            Description::Conjunction {
                descriptions: vec![concept("A")],
                print_requests: Vec::new(),
            },
        );
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolver
            .resolve(&WikiPage::concept("A"), BUDGET, &mut diagnostics)
            .unwrap();

        assert_eq!(resolved, Description::Thing);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.count(DiagnosticReason::CycleDetected), 1);
    }

    #[test]
    fn two_cycle_terminates() {
        let mut store = MemoryStore::default();
        define(&mut store, "A", concept("B"));
        define(&mut store, "B", concept("A"));
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolver
            .resolve(&WikiPage::concept("A"), BUDGET, &mut diagnostics)
            .unwrap();

        assert!(resolved.is_thing());
        assert_eq!(diagnostics.count(DiagnosticReason::CycleDetected), 1);
        let detail = &diagnostics.iter().next().unwrap().detail;
        assert!(detail.contains("Concept:A -> Concept:B -> Concept:A"));
    }

    #[test]
    fn long_acyclic_chain_is_truncated() {
        let mut store = MemoryStore::default();
        for i in 0..20 {
            define(&mut store, &format!("C{i}"), concept(&format!("C{}", i + 1)));
        }
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolver
            .resolve(&WikiPage::concept("C0"), BUDGET, &mut diagnostics)
            .unwrap();

        assert!(resolved.is_thing());
        assert_eq!(diagnostics.count(DiagnosticReason::Truncated), 1);
        assert_eq!(diagnostics.count(DiagnosticReason::CycleDetected), 0);
    }

    #[test]
    fn nested_concepts_are_inlined() {
        let mut store = MemoryStore::default();
        let big = Description::value(
            WikiPage::property("Population"),
            Comparator::Geq,
            DataItem::Number(1_000_000.0),
        );
        define(&mut store, "Big", big.clone());
        define(
            &mut store,
            "Big cities",
            Description::conjunction([Description::class(WikiPage::category("City")), concept("Big")]),
        );
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolver
            .resolve(&WikiPage::concept("Big cities"), BUDGET, &mut diagnostics)
            .unwrap();

        assert_eq!(
            resolved,
            Description::conjunction([Description::class(WikiPage::category("City")), big])
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn reuse_of_a_concept_in_siblings_is_not_a_cycle() {
        let mut store = MemoryStore::default();
        define(&mut store, "City", Description::class(WikiPage::category("City")));
        define(
            &mut store,
            "Twice",
            Description::disjunction([concept("City"), concept("City")]),
        );
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        resolver
            .resolve(&WikiPage::concept("Twice"), BUDGET, &mut diagnostics)
            .unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn undefined_concept_matches_nothing() {
        let store = MemoryStore::default();
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolver
            .resolve(&WikiPage::concept("Missing"), BUDGET, &mut diagnostics)
            .unwrap();
        assert!(resolved.is_nothing());
    }

    #[test]
    fn storage_failure_propagates() {
        let store = MemoryStore {
            offline: true,
            ..MemoryStore::default()
        };
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let err = resolver
            .resolve(&WikiPage::concept("A"), BUDGET, &mut diagnostics)
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn fan_out_is_bounded_by_the_size_budget() {
        let mut store = MemoryStore::default();
        for i in 0..7 {
            let next = format!("C{}", i + 1);
            define(
                &mut store,
                &format!("C{i}"),
                Description::Conjunction {
                    descriptions: vec![concept(&next), concept(&next), concept(&next), concept(&next)],
                    print_requests: Vec::new(),
                },
            );
        }
        define(&mut store, "C7", Description::class(WikiPage::category("City")));

        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolver
            .resolve(&WikiPage::concept("C0"), BUDGET, &mut diagnostics)
            .unwrap();

        assert!(resolved.size() <= BUDGET);
        assert_eq!(diagnostics.count(DiagnosticReason::Truncated), 1);
        assert!(store.concept_reads.get() <= 8);
    }

    #[test]
    fn exhausted_budget_reports_once_across_references() {
        let mut store = MemoryStore::default();
        define(&mut store, "City", Description::class(WikiPage::category("City")));
        let mut resolver = ConceptResolver::new(&store, 8);
        let mut diagnostics = Diagnostics::new();

        let first = resolver
            .resolve(&WikiPage::concept("City"), 1, &mut diagnostics)
            .unwrap();
        assert_eq!(first, Description::class(WikiPage::category("City")));
        for _ in 0..3 {
            let rest = resolver
                .resolve(&WikiPage::concept("City"), 0, &mut diagnostics)
                .unwrap();
            assert!(rest.is_thing());
        }
        assert_eq!(diagnostics.count(DiagnosticReason::Truncated), 1);
        assert_eq!(store.concept_reads.get(), 1);
    }
}
