//! Graph-pattern conditions and their boolean algebra.
//!
//! A [`Condition`] constrains one join variable. Cogent parts (triple
//! patterns and filters) narrow the result; weak parts are `OPTIONAL`
//! bindings that only introduce ordering variables. A condition is
//! *safe* when it can be evaluated on its own, i.e. when it binds its
//! join variable with a pattern instead of only filtering it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Matches everything.
    True,
    /// Matches nothing.
    False,
    /// A graph pattern, possibly with filters.
    Where,
    /// Filters only; the constrained variables must be bound elsewhere.
    Filter,
    /// The join variable is one fixed element.
    Singleton,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub kind: ConditionKind,
    /// Triple patterns or group patterns, in order, without duplicates.
    pub cogent: Vec<String>,
    /// Filter expressions, without the `FILTER` keyword.
    pub filters: Vec<String>,
    /// Optional bindings keyed by the variable they introduce.
    pub weak: BTreeMap<String, String>,
    /// Prefix to IRI.
    pub namespaces: BTreeMap<String, String>,
    /// Variable holding the sort key of the join variable, or empty.
    pub order_by_variable: String,
    /// Sort label to the variable bound to its value.
    pub order_variables: BTreeMap<String, String>,
    pub is_safe: bool,
    /// Element a singleton condition is fixed to.
    pub match_element: Option<String>,
    /// Variables the filters use that no pattern here binds.
    pub free_variables: BTreeSet<String>,
    /// Variables the cogent patterns bind.
    pub bound_variables: BTreeSet<String>,
}

impl Condition {
    fn with_kind(kind: ConditionKind, is_safe: bool) -> Self {
        Self {
            kind,
            cogent: Vec::new(),
            filters: Vec::new(),
            weak: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            order_by_variable: String::new(),
            order_variables: BTreeMap::new(),
            is_safe,
            match_element: None,
            free_variables: BTreeSet::new(),
            bound_variables: BTreeSet::new(),
        }
    }

    /// Matches everything; unsafe on its own.
    #[must_use]
    pub fn truth() -> Self {
        Self::with_kind(ConditionKind::True, false)
    }

    /// Matches nothing; trivially safe.
    #[must_use]
    pub fn falsity() -> Self {
        Self::with_kind(ConditionKind::False, true)
    }

    /// A safe pattern binding `binds`.
    #[must_use]
    pub fn pattern(pattern: impl Into<String>, binds: &[&str]) -> Self {
        let mut condition = Self::with_kind(ConditionKind::Where, true);
        condition.cogent.push(pattern.into());
        condition
            .bound_variables
            .extend(binds.iter().map(|v| (*v).to_string()));
        condition
    }

    /// A filter over `free`, which some sibling must bind.
    #[must_use]
    pub fn filter(expression: impl Into<String>, free: &[&str]) -> Self {
        let mut condition = Self::with_kind(ConditionKind::Filter, false);
        condition.filters.push(expression.into());
        condition
            .free_variables
            .extend(free.iter().map(|v| (*v).to_string()));
        condition
    }

    /// `join_variable` fixed to `element`.
    #[must_use]
    pub fn singleton(element: impl Into<String>, join_variable: &str) -> Self {
        let mut condition = Self::with_kind(ConditionKind::Singleton, true);
        condition.match_element = Some(element.into());
        condition.bound_variables.insert(join_variable.to_string());
        condition
    }

    #[must_use]
    pub fn is_true(&self) -> bool {
        self.kind == ConditionKind::True
    }

    #[must_use]
    pub fn is_false(&self) -> bool {
        self.kind == ConditionKind::False
    }

    /// Singleton with nothing but its element.
    #[must_use]
    pub fn is_bare_singleton(&self) -> bool {
        self.kind == ConditionKind::Singleton && self.cogent.is_empty() && self.filters.is_empty()
    }

    pub fn declare(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.namespaces.entry(prefix.into()).or_insert_with(|| iri.into());
    }

    /// Add an ordering-only binding. A variable is introduced once.
    pub fn add_weak(&mut self, variable: impl Into<String>, pattern: impl Into<String>) {
        self.weak.entry(variable.into()).or_insert_with(|| pattern.into());
    }

    pub fn push_cogent(&mut self, pattern: String) {
        if !self.cogent.contains(&pattern) {
            self.cogent.push(pattern);
        }
    }

    pub fn push_filter(&mut self, filter: String) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    /// Take over the weak bindings, namespaces and sort variables of
    /// `other`. Entries already present win.
    pub fn absorb_context(&mut self, other: &Condition) {
        for (variable, pattern) in &other.weak {
            self.add_weak(variable.clone(), pattern.clone());
        }
        for (prefix, iri) in &other.namespaces {
            self.declare(prefix.clone(), iri.clone());
        }
        for (label, variable) in &other.order_variables {
            self.order_variables
                .entry(label.clone())
                .or_insert_with(|| variable.clone());
        }
    }

    /// Whether a standalone rendering must bind the join variable to
    /// every page first.
    #[must_use]
    pub fn needs_anchor(&self) -> bool {
        !self.is_false()
            && (!self.is_safe
                || matches!(
                    self.kind,
                    ConditionKind::True | ConditionKind::Filter | ConditionKind::Singleton
                ))
    }

    /// Filter expression equivalent to this condition when it has no
    /// patterns.
    #[must_use]
    pub fn as_expression(&self, join_variable: &str) -> Option<String> {
        if !self.cogent.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        if let Some(element) = &self.match_element {
            parts.push(format!("{join_variable} = {element}"));
        }
        parts.extend(self.filters.iter().cloned());
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(format!("( {} )", parts.join(" && "))),
        }
    }

    /// Cogent part as the lines of a group pattern.
    #[must_use]
    pub fn group_lines(&self, join_variable: &str) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(element) = &self.match_element {
            lines.push(format!("VALUES {join_variable} {{ {element} }}"));
        }
        lines.extend(self.cogent.iter().cloned());
        lines.extend(self.filters.iter().map(|f| format!("FILTER( {f} )")));
        lines
    }

    /// All of `parts`.
    ///
    /// Safe iff some part is safe and every variable an unsafe part needs
    /// is bound by a safe part.
    #[must_use]
    pub fn conjoin(parts: Vec<Condition>) -> Condition {
        if parts.iter().any(Condition::is_false) {
            return Condition::falsity();
        }
        let mut parts: Vec<Condition> = parts.into_iter().filter(|c| !c.is_true()).collect();
        match parts.len() {
            0 => return Condition::truth(),
            1 => return parts.remove(0),
            _ => {}
        }

        let mut element: Option<String> = None;
        for part in &parts {
            if let Some(other) = &part.match_element {
                match &element {
                    Some(current) if current != other => return Condition::falsity(),
                    _ => element = Some(other.clone()),
                }
            }
        }

        let mut result = Condition::with_kind(ConditionKind::Where, false);
        let mut safe_bound = BTreeSet::new();
        let mut unsafe_free = BTreeSet::new();
        let mut any_safe = false;
        for part in &parts {
            for pattern in &part.cogent {
                result.push_cogent(pattern.clone());
            }
            for filter in &part.filters {
                result.push_filter(filter.clone());
            }
            result.absorb_context(part);
            if result.order_by_variable.is_empty() {
                result.order_by_variable = part.order_by_variable.clone();
            }
            result.bound_variables.extend(part.bound_variables.iter().cloned());
            result.free_variables.extend(part.free_variables.iter().cloned());
            if part.is_safe {
                any_safe = true;
                safe_bound.extend(part.bound_variables.iter().cloned());
            } else {
                unsafe_free.extend(part.free_variables.iter().cloned());
            }
        }

        result.is_safe = any_safe && unsafe_free.is_subset(&safe_bound);
        let bound = result.bound_variables.clone();
        result.free_variables.retain(|v| !bound.contains(v));
        result.kind = if element.is_some() {
            ConditionKind::Singleton
        } else if result.cogent.is_empty() {
            ConditionKind::Filter
        } else {
            ConditionKind::Where
        };
        result.match_element = element;
        result
    }

    /// Any of `parts`, constraining `join_variable`.
    ///
    /// Pattern alternatives become a `UNION`, safe iff every alternative
    /// is. Pure filters are combined with `||`. A mix of both tests the
    /// patterns with `EXISTS` inside the filter.
    #[must_use]
    pub fn disjoin(parts: Vec<Condition>, join_variable: &str) -> Condition {
        if parts.iter().any(Condition::is_true) {
            return Condition::truth();
        }
        let mut parts: Vec<Condition> = parts.into_iter().filter(|c| !c.is_false()).collect();
        match parts.len() {
            0 => return Condition::falsity(),
            1 => return parts.remove(0),
            _ => {}
        }

        let mut groups = Vec::new();
        let mut expressions = Vec::new();
        let mut all_safe = true;
        let mut result = Condition::with_kind(ConditionKind::Where, false);
        let mut bound: Option<BTreeSet<String>> = None;

        for part in &parts {
            for (variable, pattern) in &part.weak {
                result.add_weak(variable.clone(), pattern.clone());
            }
            for (prefix, iri) in &part.namespaces {
                result.declare(prefix.clone(), iri.clone());
            }
            result.free_variables.extend(part.free_variables.iter().cloned());
            match part.as_expression(join_variable) {
                Some(expression) => expressions.push(expression),
                None => {
                    all_safe &= part.is_safe;
                    bound = Some(match bound {
                        None => part.bound_variables.clone(),
                        Some(b) => b.intersection(&part.bound_variables).cloned().collect(),
                    });
                    let lines = part.group_lines(join_variable);
                    groups.push(format!("{{ {} }}", lines.join(" ")));
                }
            }
        }

        if expressions.is_empty() {
            result.kind = ConditionKind::Where;
            result.cogent.push(groups.join(" UNION "));
            result.is_safe = all_safe;
            result.bound_variables = bound.unwrap_or_default();
            let bound = result.bound_variables.clone();
            result.free_variables.retain(|v| !bound.contains(v));
            return result;
        }

        for group in groups {
            expressions.push(format!("EXISTS {group}"));
        }
        result.kind = ConditionKind::Filter;
        result.filters.push(format!("( {} )", expressions.join(" || ")));
        result.free_variables.insert(join_variable.to_string());
        result
    }
}
