//! Per-function control-flow graphs over statement nodes.
//!
//! Every statement of a function body becomes one vertex; branches, loops,
//! switches, labeled jumps, `goto`, `fallthrough`, `return` and calls that
//! never return are wired explicitly. Blocks are transparent. Dominators are
//! computed once with Cooper-Harvey-Kennedy (`petgraph`'s `simple_fast`).

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use super::{JumpKind, NodeId, NodeKind, SourceUnit, SwitchKind};

/// A vertex of a flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "node", rename_all = "lowercase")]
pub enum FlowNode {
    Entry,
    Exit,
    Stmt(NodeId),
}

/// A directed edge `(from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowEdge {
    pub from: FlowNode,
    pub to: FlowNode,
}

/// Control-flow graph of one function body.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    graph: DiGraph<FlowNode, ()>,
    entry: NodeIndex,
    exit: NodeIndex,
    index: HashMap<NodeId, NodeIndex>,
    dominators: Dominators<NodeIndex>,
}

impl FlowGraph {
    /// Build the graph for `function` (a `Function` node).
    ///
    /// `is_terminal` reports whether an expression statement's expression
    /// never returns (e.g. a `panic` call).
    pub fn build(unit: &SourceUnit, function: NodeId, is_terminal: &dyn Fn(NodeId) -> bool) -> Self {
        let mut graph = DiGraph::new();
        let entry = graph.add_node(FlowNode::Entry);
        let exit = graph.add_node(FlowNode::Exit);

        let mut builder = Builder {
            unit,
            is_terminal,
            graph,
            index: HashMap::new(),
            exit,
            targets: Vec::new(),
            labels: HashMap::new(),
            gotos: Vec::new(),
            pending_label: None,
        };

        let exits = match unit.kind(function) {
            NodeKind::Function { body: Some(body), .. } => builder.stmt(*body, vec![entry]),
            _ => vec![entry],
        };
        builder.connect(&exits, exit);
        builder.resolve_gotos();

        let Builder { graph, index, .. } = builder;
        let dominators = dominators::simple_fast(&graph, entry);

        Self {
            graph,
            entry,
            exit,
            index,
            dominators,
        }
    }

    pub fn contains(&self, stmt: NodeId) -> bool {
        self.index.contains_key(&stmt)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> Vec<FlowEdge> {
        self.graph
            .raw_edges()
            .iter()
            .map(|e| FlowEdge {
                from: self.graph[e.source()],
                to: self.graph[e.target()],
            })
            .collect()
    }

    /// Statement vertices in insertion order.
    pub fn statements(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter_map(|ix| match self.graph[ix] {
                FlowNode::Stmt(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn successors(&self, stmt: NodeId) -> Vec<FlowNode> {
        match self.index.get(&stmt) {
            Some(&ix) => {
                let mut out: Vec<FlowNode> = self
                    .graph
                    .neighbors_directed(ix, Direction::Outgoing)
                    .map(|n| self.graph[n])
                    .collect();
                out.reverse();
                out
            }
            None => Vec::new(),
        }
    }

    /// Whether the statement flows straight to the function exit.
    pub fn exits_function(&self, stmt: NodeId) -> bool {
        self.index
            .get(&stmt)
            .map(|&ix| self.graph.contains_edge(ix, self.exit))
            .unwrap_or(false)
    }

    /// Whether some path from function entry reaches the statement.
    pub fn is_reachable(&self, stmt: NodeId) -> bool {
        self.index
            .get(&stmt)
            .map(|&ix| self.dominators.dominators(ix).is_some())
            .unwrap_or(false)
    }

    /// Whether every path from entry to `b` passes through `a`.
    ///
    /// An unreachable `b` is dominated by everything.
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        let (Some(&ia), Some(&ib)) = (self.index.get(&a), self.index.get(&b)) else {
            return false;
        };
        if ia == ib {
            return true;
        }
        match self.dominators.dominators(ib) {
            Some(mut doms) => doms.any(|d| d == ia),
            None => true,
        }
    }

    pub fn immediate_dominator(&self, stmt: NodeId) -> Option<FlowNode> {
        let ix = *self.index.get(&stmt)?;
        self.dominators
            .immediate_dominator(ix)
            .map(|d| self.graph[d])
    }

    /// Whether `branch` has an outgoing edge from which `target` cannot be
    /// reached without passing through `branch` again, i.e. whether taking
    /// some arm of the branch avoids `target`.
    pub fn has_avoiding_successor(&self, branch: NodeId, target: NodeId) -> bool {
        let (Some(&b), Some(&t)) = (self.index.get(&branch), self.index.get(&target)) else {
            return false;
        };
        self.graph
            .neighbors_directed(b, Direction::Outgoing)
            .any(|s| !self.reaches_avoiding(s, t, b))
    }

    /// Whether some path from entry reaches `target` without passing through
    /// any statement of `avoid`. False for an unreachable `target` and for a
    /// `target` that is itself avoided.
    pub fn reachable_avoiding_all(&self, target: NodeId, avoid: &[NodeId]) -> bool {
        let Some(&t) = self.index.get(&target) else {
            return false;
        };
        let mut seen: HashSet<NodeIndex> = avoid
            .iter()
            .filter_map(|a| self.index.get(a).copied())
            .collect();
        if seen.contains(&t) {
            return false;
        }
        seen.insert(self.entry);
        let mut queue = VecDeque::from([self.entry]);
        while let Some(n) = queue.pop_front() {
            for next in self.graph.neighbors_directed(n, Direction::Outgoing) {
                if next == t {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    fn reaches_avoiding(&self, from: NodeIndex, to: NodeIndex, avoid: NodeIndex) -> bool {
        if from == to {
            return true;
        }
        if from == avoid {
            return false;
        }
        let mut seen = HashSet::from([from, avoid]);
        let mut queue = VecDeque::from([from]);
        while let Some(n) = queue.pop_front() {
            for next in self.graph.neighbors_directed(n, Direction::Outgoing) {
                if next == to {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    pub fn entry(&self) -> FlowNode {
        self.graph[self.entry]
    }

    pub fn exit(&self) -> FlowNode {
        self.graph[self.exit]
    }
}

/// A `break`/`continue` destination.
#[derive(Default)]
struct JumpTarget {
    label: Option<String>,
    breaks: Vec<NodeIndex>,
    /// `None` for switch/select, which only accept `break`.
    continue_to: Option<NodeIndex>,
}

struct Builder<'a> {
    unit: &'a SourceUnit,
    is_terminal: &'a dyn Fn(NodeId) -> bool,
    graph: DiGraph<FlowNode, ()>,
    index: HashMap<NodeId, NodeIndex>,
    exit: NodeIndex,
    targets: Vec<JumpTarget>,
    labels: HashMap<String, NodeIndex>,
    gotos: Vec<(NodeIndex, String)>,
    pending_label: Option<String>,
}

impl<'a> Builder<'a> {
    fn add(&mut self, id: NodeId) -> NodeIndex {
        let ix = self.graph.add_node(FlowNode::Stmt(id));
        self.index.insert(id, ix);
        ix
    }

    fn connect(&mut self, preds: &[NodeIndex], to: NodeIndex) {
        for &p in preds {
            self.graph.update_edge(p, to, ());
        }
    }

    fn seq(&mut self, stmts: &[NodeId], mut preds: Vec<NodeIndex>) -> Vec<NodeIndex> {
        for &s in stmts {
            preds = self.stmt(s, preds);
        }
        preds
    }

    /// Wire `id` after `preds`; returns the vertices that fall through to
    /// whatever comes next.
    fn stmt(&mut self, id: NodeId, preds: Vec<NodeIndex>) -> Vec<NodeIndex> {
        let unit = self.unit;
        match unit.kind(id) {
            NodeKind::Block { stmts } => self.seq(stmts, preds),
            NodeKind::If {
                init,
                then,
                otherwise,
                ..
            } => {
                let preds = match init {
                    Some(init) => self.stmt(*init, preds),
                    None => preds,
                };
                let n = self.add(id);
                self.connect(&preds, n);
                let mut exits = self.stmt(*then, vec![n]);
                match otherwise {
                    Some(otherwise) => exits.extend(self.stmt(*otherwise, vec![n])),
                    None => exits.push(n),
                }
                exits
            }
            NodeKind::Loop {
                init,
                cond,
                post,
                body,
            } => {
                let label = self.pending_label.take();
                let preds = match init {
                    Some(init) => self.stmt(*init, preds),
                    None => preds,
                };
                let header = self.add(id);
                self.connect(&preds, header);
                let continue_to = match post {
                    Some(post) => {
                        let p = self.add(*post);
                        self.graph.update_edge(p, header, ());
                        p
                    }
                    None => header,
                };
                self.targets.push(JumpTarget {
                    label,
                    breaks: Vec::new(),
                    continue_to: Some(continue_to),
                });
                let body_exits = self.stmt(*body, vec![header]);
                self.connect(&body_exits, continue_to);
                let target = self.targets.pop().unwrap_or_default();
                let mut exits = target.breaks;
                if cond.is_some() {
                    exits.push(header);
                }
                exits
            }
            NodeKind::Switch {
                kind, init, cases, ..
            } => {
                let label = self.pending_label.take();
                let preds = match init {
                    Some(init) => self.stmt(*init, preds),
                    None => preds,
                };
                let sw = self.add(id);
                self.connect(&preds, sw);
                self.targets.push(JumpTarget {
                    label,
                    breaks: Vec::new(),
                    continue_to: None,
                });

                let mut exits = Vec::new();
                let mut carried: Vec<NodeIndex> = Vec::new();
                let mut has_default = false;
                for &case in cases {
                    let c = self.add(case);
                    self.graph.update_edge(sw, c, ());
                    let carried_in = std::mem::take(&mut carried);
                    self.connect(&carried_in, c);

                    let (body, is_default): (&[NodeId], bool) = match unit.kind(case) {
                        NodeKind::Case {
                            body, is_default, ..
                        } => (body.as_slice(), *is_default),
                        _ => (&[][..], false),
                    };
                    has_default |= is_default;
                    let falls_through = body
                        .last()
                        .map(|last| {
                            matches!(
                                unit.kind(*last),
                                NodeKind::Jump {
                                    kind: JumpKind::Fallthrough,
                                    ..
                                }
                            )
                        })
                        .unwrap_or(false);
                    let case_exits = self.seq(body, vec![c]);
                    if falls_through {
                        carried = case_exits;
                    } else {
                        exits.extend(case_exits);
                    }
                }
                exits.extend(carried);
                if !has_default && *kind != SwitchKind::Select {
                    exits.push(sw);
                }
                let target = self.targets.pop().unwrap_or_default();
                exits.extend(target.breaks);
                exits
            }
            NodeKind::Return { .. } => {
                let n = self.add(id);
                self.connect(&preds, n);
                self.graph.update_edge(n, self.exit, ());
                Vec::new()
            }
            NodeKind::Jump { kind, label } => {
                let n = self.add(id);
                self.connect(&preds, n);
                match kind {
                    JumpKind::Break => {
                        let found = self
                            .targets
                            .iter_mut()
                            .rev()
                            .find(|t| label.is_none() || t.label.as_deref() == label.as_deref());
                        match found {
                            Some(target) => target.breaks.push(n),
                            None => {
                                self.graph.update_edge(n, self.exit, ());
                            }
                        }
                        Vec::new()
                    }
                    JumpKind::Continue => {
                        let dest = self
                            .targets
                            .iter()
                            .rev()
                            .filter(|t| t.continue_to.is_some())
                            .find(|t| label.is_none() || t.label.as_deref() == label.as_deref())
                            .and_then(|t| t.continue_to)
                            .unwrap_or(self.exit);
                        self.graph.update_edge(n, dest, ());
                        Vec::new()
                    }
                    JumpKind::Goto => {
                        self.gotos.push((n, label.clone().unwrap_or_default()));
                        Vec::new()
                    }
                    JumpKind::Fallthrough => vec![n],
                }
            }
            NodeKind::Labeled { label, stmt } => {
                let n = self.add(id);
                self.connect(&preds, n);
                self.labels.insert(label.clone(), n);
                match stmt {
                    Some(inner) => {
                        if matches!(
                            unit.kind(*inner),
                            NodeKind::Loop { .. } | NodeKind::Switch { .. }
                        ) {
                            self.pending_label = Some(label.clone());
                        }
                        self.stmt(*inner, vec![n])
                    }
                    None => vec![n],
                }
            }
            NodeKind::ExprStmt { expr } => {
                let n = self.add(id);
                self.connect(&preds, n);
                if (self.is_terminal)(*expr) {
                    self.graph.update_edge(n, self.exit, ());
                    Vec::new()
                } else {
                    vec![n]
                }
            }
            _ => {
                let n = self.add(id);
                self.connect(&preds, n);
                vec![n]
            }
        }
    }

    fn resolve_gotos(&mut self) {
        let gotos = std::mem::take(&mut self.gotos);
        for (from, label) in gotos {
            let to = self.labels.get(&label).copied().unwrap_or(self.exit);
            self.graph.update_edge(from, to, ());
        }
    }
}
