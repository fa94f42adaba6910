//! Bounded transitive closure over the sub-category / sub-property
//! relation.

use std::collections::{HashSet, VecDeque};

use semq_core::{HierarchyKind, HierarchyLookup, Result, SemqError, WikiPage};

/// Members reached from a root, in breadth-first order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// The root first, then its descendants.
    pub members: Vec<WikiPage>,
    /// The size bound cut the traversal short.
    pub truncated: bool,
}

/// Breadth-first hierarchy traversal.
///
/// The root is at depth 0 and nodes deeper than `max_depth` are never
/// visited. The traversal stops once `max_size` members are collected.
/// A visited set keeps it finite on cyclic hierarchies.
pub struct HierarchyExpander<'a> {
    lookup: &'a dyn HierarchyLookup,
    max_depth: usize,
    max_size: usize,
}

impl<'a> HierarchyExpander<'a> {
    #[must_use]
    pub fn new(lookup: &'a dyn HierarchyLookup, max_depth: usize, max_size: usize) -> Self {
        Self {
            lookup,
            max_depth,
            max_size: max_size.max(1),
        }
    }

    /// # Errors
    ///
    /// Returns [`SemqError::Lookup`] if the hierarchy cannot be read and
    /// [`SemqError::MalformedResponse`] if a child is in the wrong
    /// namespace or has no title.
    pub fn expand(&self, root: &WikiPage, kind: HierarchyKind) -> Result<Expansion> {
        let mut members = vec![root.clone()];
        let mut visited: HashSet<WikiPage> = HashSet::new();
        let mut queue: VecDeque<(WikiPage, usize)> = VecDeque::new();

        visited.insert(root.clone());
        queue.push_back((root.clone(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }

            for child in self.lookup.children_of(&current, kind)? {
                if child.namespace != kind.namespace() || child.title.is_empty() {
                    return Err(SemqError::MalformedResponse(format!(
                        "{kind} hierarchy lookup returned '{child}' as a child of {current}"
                    )));
                }
                if !visited.insert(child.clone()) {
                    continue;
                }
                if members.len() >= self.max_size {
                    tracing::trace!(root = %root, size = members.len(), "hierarchy size bound reached");
                    return Ok(Expansion {
                        members,
                        truncated: true,
                    });
                }
                tracing::trace!(parent = %current, child = %child, depth = depth + 1, "hierarchy member");
                members.push(child.clone());
                queue.push_back((child, depth + 1));
            }
        }

        Ok(Expansion {
            members,
            truncated: false,
        })
    }
}
