//! Origin tracking for values read from inbound request headers.
//!
//! A value is tainted when a bounded chain of direct assignments, field
//! selections and method calls on it leads back to a request-header read
//! (`r.Header.Get(...)`, or `h.Get(...)` after `h := r.Header`). Collections,
//! arithmetic and calls through other functions are not followed.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::analysis::{
    access_path, AccessPath, CallFact, FunctionId, LiteralValue, NodeId, NodeKind, Pattern,
    ValueFact,
};

use super::FlowResolver;

/// How a tainted value was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaintTrace {
    /// The header read the value comes from.
    pub source: NodeId,
    /// Header name, when constant.
    pub header_name: Option<String>,
    /// Expressions walked from the queried value back to the source, in
    /// walk order (queried value first).
    pub chain: Vec<NodeId>,
    /// Variables and fields that carried the value.
    pub carriers: Vec<AccessPath>,
}

impl TaintTrace {
    fn carrier_roots(&self) -> BTreeSet<&str> {
        self.carriers
            .iter()
            .filter(|c| c.is_variable())
            .map(|c| c.root.as_str())
            .collect()
    }
}

impl<'a> FlowResolver<'a> {
    /// Trace `expr` back to a request-header read, if it comes from one.
    pub fn taint_origin(&self, expr: NodeId, function: Option<FunctionId>) -> Option<TaintTrace> {
        let mut trace = TaintTrace {
            source: expr,
            header_name: None,
            chain: Vec::new(),
            carriers: Vec::new(),
        };
        let source = self.trace(expr, function, self.taint_depth, &mut trace)?;
        trace.source = source;
        trace.header_name = self
            .facts
            .call(source)
            .and_then(|call| match call.pattern {
                Some(Pattern::HeaderGet { name_arg }) => call.arg(name_arg),
                _ => call.arg(0),
            })
            .and_then(|arg| self.resolve_str(&arg.value, arg.node, function));
        Some(trace)
    }

    fn trace(
        &self,
        expr: NodeId,
        function: Option<FunctionId>,
        hops: usize,
        trace: &mut TaintTrace,
    ) -> Option<NodeId> {
        trace.chain.push(expr);
        match self.unit.kind(expr) {
            NodeKind::Call { callee, .. } => {
                let call = self.facts.call(expr)?;
                if self.is_header_read(call, hops) {
                    return Some(expr);
                }
                // A method on a tainted value: `origin.String()`.
                if hops == 0 {
                    return None;
                }
                match self.unit.kind(*callee) {
                    NodeKind::FieldAccess { operand, .. } if call.callee_path.is_some() => {
                        self.trace(*operand, function, hops - 1, trace)
                    }
                    _ => None,
                }
            }
            NodeKind::FieldAccess { operand, .. } => {
                if hops == 0 {
                    return None;
                }
                self.trace(*operand, function, hops - 1, trace)
            }
            NodeKind::Unary { op, operand } if op == "*" || op == "&" => {
                self.trace(*operand, function, hops, trace)
            }
            NodeKind::Identifier { name } => {
                if hops == 0 {
                    return None;
                }
                let target = AccessPath::variable(name.clone());
                let def = self.definition_before(&target, expr, function)?;
                if def.tuple_index.map(|i| i != 0).unwrap_or(false) {
                    return None;
                }
                let value = def.value?;
                trace.carriers.push(target);
                self.trace(value, def.function, hops - 1, trace)
            }
            _ => None,
        }
    }

    /// Whether a call reads an inbound request header, directly by pattern
    /// or through a variable bound to a header map (`h := r.Header`).
    fn is_header_read(&self, call: &CallFact, hops: usize) -> bool {
        if matches!(call.pattern, Some(Pattern::HeaderGet { .. })) {
            return true;
        }
        let Some(path) = &call.callee_path else {
            return false;
        };
        let mut path = path.clone();
        let mut site = call.site;
        let mut function = call.function;
        for _ in 0..hops {
            let root = AccessPath::variable(path.root.clone());
            let Some(def) = self.definition_before(&root, site, function) else {
                return false;
            };
            let ValueFact::Path(prefix) = &def.value_fact else {
                return false;
            };
            path = path.rebase(prefix);
            if matches!(self.apis.method(&path), Some(Pattern::HeaderGet { .. })) {
                return true;
            }
            site = def.site;
            function = def.function;
        }
        false
    }

    /// Whether a branch that validates the traced value against an allow-list
    /// controls whether `sink` runs.
    ///
    /// The branch must dominate the sink, have an arm that avoids it, and
    /// test the value: an equality against a non-empty constant or another
    /// value, a membership lookup, a validating call taking it as an
    /// argument, or a switch on it.
    pub fn is_allow_listed(&self, trace: &TaintTrace, sink: &CallFact) -> bool {
        let (Some(function), Some(statement)) = (sink.function, sink.statement) else {
            return false;
        };
        let graph = &self.facts.function(function).graph;
        self.facts
            .branches
            .iter()
            .filter(|b| b.function == Some(function) && b.statement != statement)
            .filter(|b| graph.dominates(b.statement, statement))
            .filter(|b| graph.has_avoiding_successor(b.statement, statement))
            .any(|b| {
                let tag = match self.unit.kind(b.statement) {
                    NodeKind::Switch { tag, .. } => *tag,
                    _ => None,
                };
                b.conditions.iter().any(|&c| {
                    (Some(c) == tag && self.mentions(c, trace))
                        || self.is_allow_check(c, trace, function, MAX_CHECK_DEPTH)
                })
            })
    }

    fn is_allow_check(
        &self,
        cond: NodeId,
        trace: &TaintTrace,
        function: FunctionId,
        depth: usize,
    ) -> bool {
        if depth == 0 {
            return false;
        }
        match self.unit.kind(cond) {
            NodeKind::Binary { op, left, right } => match op.as_str() {
                "&&" | "||" => {
                    self.is_allow_check(*left, trace, function, depth - 1)
                        || self.is_allow_check(*right, trace, function, depth - 1)
                }
                "==" | "!=" => {
                    let (l, r) = (self.mentions(*left, trace), self.mentions(*right, trace));
                    (l && self.is_meaningful_operand(*right)) || (r && self.is_meaningful_operand(*left))
                }
                _ => false,
            },
            NodeKind::Unary { op, operand } if op == "!" => {
                self.is_allow_check(*operand, trace, function, depth - 1)
            }
            NodeKind::Index {
                index: Some(index), ..
            } => self.mentions(*index, trace),
            NodeKind::Call { args, .. } => args.iter().any(|a| self.mentions(*a, trace)),
            NodeKind::Identifier { name } => {
                let target = AccessPath::variable(name.clone());
                self.definition_before(&target, cond, Some(function))
                    .and_then(|d| d.value)
                    .map(|v| self.is_allow_check(v, trace, function, depth - 1))
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// An operand that makes an equality test a real check, as opposed to
    /// an emptiness or nil test.
    fn is_meaningful_operand(&self, operand: NodeId) -> bool {
        match self.unit.kind(operand) {
            NodeKind::Literal(LiteralValue::Str(s)) => !s.is_empty(),
            NodeKind::Literal(_) => false,
            _ => true,
        }
    }

    /// Whether an expression refers to the traced value.
    fn mentions(&self, expr: NodeId, trace: &TaintTrace) -> bool {
        let roots = trace.carrier_roots();
        self.unit.descendants(expr).into_iter().any(|n| {
            if n == trace.source {
                return true;
            }
            match self.unit.kind(n) {
                NodeKind::Identifier { name } => {
                    roots.contains(name.as_str()) && !self.is_selected_field(n)
                }
                NodeKind::Call { .. } => self
                    .facts
                    .call(n)
                    .map(|c| self.reads_same_header(c, trace))
                    .unwrap_or(false),
                NodeKind::FieldAccess { .. } => access_path(self.unit, n)
                    .map(|p| trace.carriers.contains(&p))
                    .unwrap_or(false),
                _ => false,
            }
        })
    }

    /// Whether `call` re-reads the traced header: the same constant header
    /// name from the same header map as the source.
    fn reads_same_header(&self, call: &CallFact, trace: &TaintTrace) -> bool {
        let Some(Pattern::HeaderGet { name_arg }) = call.pattern else {
            return false;
        };
        let expected = trace.header_name.as_deref();
        let (Some(expected), Some(source)) = (expected, self.facts.call(trace.source)) else {
            return false;
        };
        if call.receiver.is_none() || call.receiver != source.receiver {
            return false;
        }
        call.arg(name_arg)
            .and_then(|arg| self.resolve_str(&arg.value, arg.node, call.function))
            .map(|name| name.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }

    /// Keys of composite elements name fields, not variables.
    fn is_selected_field(&self, ident: NodeId) -> bool {
        match self.unit.parent(ident).map(|p| self.unit.kind(p)) {
            Some(NodeKind::CompositeConstruct { elements, .. }) => {
                elements.iter().any(|e| e.key == Some(ident))
            }
            _ => false,
        }
    }
}

/// Bound on nested boolean structure inspected in a condition.
const MAX_CHECK_DEPTH: usize = 8;
