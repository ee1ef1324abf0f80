//! Bounded queries over one unit's facts.
//!
//! [`FlowResolver`] answers three kinds of question for the rules:
//! - literal values: what constant does an expression resolve to, and does a
//!   list value contain a given string
//! - order: does one call run before another on every path ([`dominance`])
//! - origin: is a value read from an inbound request header ([`taint`])
//!
//! All lookups stay inside one unit. Identifiers resolve to the latest
//! definition before the use in the same function, falling back to
//! package-level definitions.

mod dominance;
mod taint;

pub use taint::TaintTrace;

use crate::analysis::{
    AccessPath, DefinitionFact, FunctionId, KnownApis, LiteralValue, NodeId, SourceUnit,
    UnitFacts, ValueFact,
};

/// Maximum definitions followed when resolving an identifier to a constant.
const MAX_CONSTANT_HOPS: usize = 8;

/// Query interface over a unit's facts.
pub struct FlowResolver<'a> {
    unit: &'a SourceUnit,
    facts: &'a UnitFacts,
    apis: &'a KnownApis,
    taint_depth: usize,
}

impl<'a> FlowResolver<'a> {
    pub fn new(
        unit: &'a SourceUnit,
        facts: &'a UnitFacts,
        apis: &'a KnownApis,
        taint_depth: usize,
    ) -> Self {
        Self {
            unit,
            facts,
            apis,
            taint_depth,
        }
    }

    pub fn unit(&self) -> &'a SourceUnit {
        self.unit
    }

    pub fn facts(&self) -> &'a UnitFacts {
        self.facts
    }

    pub fn apis(&self) -> &'a KnownApis {
        self.apis
    }

    pub fn taint_depth(&self) -> usize {
        self.taint_depth
    }

    /// The definition of `target` in effect at `use_site`: the last one
    /// in the same function that ends before the use and whose statement
    /// runs on every path to it, else the last package-level one.
    ///
    /// A reassignment in a branch that may be skipped does not replace the
    /// value seen after the branch.
    pub fn definition_before(
        &self,
        target: &AccessPath,
        use_site: NodeId,
        function: Option<FunctionId>,
    ) -> Option<&'a DefinitionFact> {
        let use_start = self.unit.span(use_site).start_byte;
        let use_statement = function.and_then(|f| self.statement_of(use_site, f));
        let in_effect = |d: &DefinitionFact| match (function, d.statement, use_statement) {
            (Some(f), Some(def_stmt), Some(use_stmt)) => {
                self.facts.function(f).graph.dominates(def_stmt, use_stmt)
            }
            _ => true,
        };
        let latest = |scope: Option<FunctionId>, ordered: bool| {
            self.facts
                .definitions
                .iter()
                .filter(|d| d.function == scope && d.target == *target)
                .filter(|d| !ordered || self.unit.span(d.site).end_byte <= use_start)
                .filter(|d| scope.is_none() || in_effect(*d))
                .max_by_key(|d| self.unit.span(d.site).start_byte)
        };
        // Package-level definitions are visible regardless of source order.
        match function {
            Some(_) => latest(function, true).or_else(|| latest(None, false)),
            None => latest(None, true).or_else(|| latest(None, false)),
        }
    }

    /// The flow-graph statement of `function` that contains `node`.
    fn statement_of(&self, node: NodeId, function: FunctionId) -> Option<NodeId> {
        let graph = &self.facts.function(function).graph;
        let mut current = Some(node);
        while let Some(n) = current {
            if graph.contains(n) {
                return Some(n);
            }
            current = self.unit.parent(n);
        }
        None
    }

    /// Follow identifiers through plain definitions to the value they hold.
    ///
    /// Stops at anything that is not an identifier, at multi-value and
    /// compound assignments, and after a fixed number of hops.
    pub fn resolve_value(
        &self,
        value: &ValueFact,
        site: NodeId,
        function: Option<FunctionId>,
    ) -> ValueFact {
        let mut current = value.clone();
        let mut site = site;
        let mut function = function;
        for _ in 0..MAX_CONSTANT_HOPS {
            let ValueFact::Identifier(name) = &current else {
                return current;
            };
            let Some(def) = self.definition_before(&AccessPath::variable(name.clone()), site, function)
            else {
                tracing::trace!(path = self.unit.path(), name = %name, "unresolved identifier");
                return current;
            };
            if def.tuple_index.is_some() || def.compound || def.value.is_none() {
                return ValueFact::Unknown;
            }
            current = def.value_fact.clone();
            site = def.site;
            function = def.function;
        }
        ValueFact::Unknown
    }

    /// Constant string an expression resolves to.
    pub fn resolve_str(
        &self,
        value: &ValueFact,
        site: NodeId,
        function: Option<FunctionId>,
    ) -> Option<String> {
        match self.resolve_value(value, site, function) {
            ValueFact::Literal(LiteralValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Constant boolean an expression resolves to.
    pub fn resolve_bool(
        &self,
        value: &ValueFact,
        site: NodeId,
        function: Option<FunctionId>,
    ) -> Option<bool> {
        self.resolve_value(value, site, function)
            .as_literal()
            .and_then(LiteralValue::as_bool)
    }

    /// Whether a list value, directly or through resolved identifiers,
    /// contains `needle` at any position. Exact string match only.
    pub fn sequence_contains(
        &self,
        value: &ValueFact,
        site: NodeId,
        function: Option<FunctionId>,
        needle: &str,
    ) -> bool {
        match self.resolve_value(value, site, function) {
            ValueFact::Sequence(items) => items
                .iter()
                .any(|item| self.resolve_str(item, site, function).as_deref() == Some(needle)),
            _ => false,
        }
    }
}
