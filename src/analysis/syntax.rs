//! Normalized syntax model shared by every front-end.
//!
//! A [`SourceUnit`] owns an arena of [`Node`]s addressed by [`NodeId`].
//! Children are referenced from inside [`NodeKind`]; parents are filled in
//! when the unit is sealed by [`UnitBuilder::finish`](super::UnitBuilder).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node inside its unit's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed).
    pub end_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    #[cfg(feature = "tree-sitter")]
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
            end_line: end.row + 1,
            end_col: end.column + 1,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.start_line,
            column: self.start_col,
        }
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A 1-indexed line/column pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A constant value written directly in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum LiteralValue {
    /// String literal with quotes removed and escapes decoded.
    Str(String),
    /// Integer, float or imaginary literal, kept as written.
    Number(String),
    /// Rune literal, kept as written.
    Char(String),
    Bool(bool),
    Nil,
}

impl LiteralValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LiteralValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Str(s) => write!(f, "{:?}", s),
            LiteralValue::Number(n) | LiteralValue::Char(n) => write!(f, "{}", n),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Nil => write!(f, "nil"),
        }
    }
}

/// How an assignment binds its targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOp {
    /// `x := v`, `var x = v`, `const x = v`.
    Define,
    /// `x = v`.
    Assign,
    /// `x += v`, `x++`, ... (the operator as written).
    Compound(String),
    /// `k, v := range xs`.
    Range,
}

/// Unstructured control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
    Goto,
    Fallthrough,
}

/// The flavor of a multi-way branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    Expression,
    Type,
    /// A `select`: without a default case one of the cases always runs.
    Select,
}

/// One element of a composite construct: `Key: value` or a bare `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub key: Option<NodeId>,
    pub value: NodeId,
}

/// The shape of a normalized node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Top of the tree: functions and package-level definitions.
    Root { decls: Vec<NodeId> },
    /// Named function, method or function literal (`name == None`).
    Function {
        name: Option<String>,
        receiver: Option<String>,
        params: Vec<String>,
        body: Option<NodeId>,
    },
    Block { stmts: Vec<NodeId> },
    If {
        init: Option<NodeId>,
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    /// Any loop. `cond == None` loops forever unless broken out of.
    Loop {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        post: Option<NodeId>,
        body: NodeId,
    },
    Switch {
        kind: SwitchKind,
        init: Option<NodeId>,
        tag: Option<NodeId>,
        cases: Vec<NodeId>,
    },
    Case {
        values: Vec<NodeId>,
        body: Vec<NodeId>,
        is_default: bool,
    },
    Return { values: Vec<NodeId> },
    Jump { kind: JumpKind, label: Option<String> },
    Labeled { label: String, stmt: Option<NodeId> },
    ExprStmt { expr: NodeId },
    /// Deferred call; runs at function exit.
    Defer { call: NodeId },
    /// Call started on another goroutine/thread.
    Spawn { call: NodeId },
    Assignment {
        targets: Vec<NodeId>,
        values: Vec<NodeId>,
        op: AssignOp,
    },
    Call { callee: NodeId, args: Vec<NodeId> },
    FieldAccess { operand: NodeId, field: String },
    Index { operand: NodeId, index: Option<NodeId> },
    Identifier { name: String },
    Literal(LiteralValue),
    /// Struct/record/slice/map literal. `type_name` is the type as written.
    CompositeConstruct {
        type_name: Option<String>,
        elements: Vec<Element>,
    },
    Binary { op: String, left: NodeId, right: NodeId },
    Unary { op: String, operand: NodeId },
    /// Anything the detectors never look inside of; children stay reachable.
    Opaque { children: Vec<NodeId> },
}

impl NodeKind {
    /// Child node ids in source order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            NodeKind::Root { decls } => out.extend(decls),
            NodeKind::Function { body, .. } => out.extend(body),
            NodeKind::Block { stmts } => out.extend(stmts),
            NodeKind::If {
                init,
                cond,
                then,
                otherwise,
            } => {
                out.extend(init);
                out.push(*cond);
                out.push(*then);
                out.extend(otherwise);
            }
            NodeKind::Loop {
                init,
                cond,
                post,
                body,
            } => {
                out.extend(init);
                out.extend(cond);
                out.extend(post);
                out.push(*body);
            }
            NodeKind::Switch {
                init, tag, cases, ..
            } => {
                out.extend(init);
                out.extend(tag);
                out.extend(cases);
            }
            NodeKind::Case { values, body, .. } => {
                out.extend(values);
                out.extend(body);
            }
            NodeKind::Return { values } => out.extend(values),
            NodeKind::Jump { .. } => {}
            NodeKind::Labeled { stmt, .. } => out.extend(stmt),
            NodeKind::ExprStmt { expr } => out.push(*expr),
            NodeKind::Defer { call } | NodeKind::Spawn { call } => out.push(*call),
            NodeKind::Assignment {
                targets, values, ..
            } => {
                out.extend(targets);
                out.extend(values);
            }
            NodeKind::Call { callee, args } => {
                out.push(*callee);
                out.extend(args);
            }
            NodeKind::FieldAccess { operand, .. } => out.push(*operand),
            NodeKind::Index { operand, index } => {
                out.push(*operand);
                out.extend(index);
            }
            NodeKind::Identifier { .. } | NodeKind::Literal(_) => {}
            NodeKind::CompositeConstruct { elements, .. } => {
                for element in elements {
                    out.extend(element.key);
                    out.push(element.value);
                }
            }
            NodeKind::Binary { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::Unary { operand, .. } => out.push(*operand),
            NodeKind::Opaque { children } => out.extend(children),
        }
        out
    }

    /// Whether this node is a statement that gets its own flow-graph vertex.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::If { .. }
                | NodeKind::Loop { .. }
                | NodeKind::Switch { .. }
                | NodeKind::Case { .. }
                | NodeKind::Return { .. }
                | NodeKind::Jump { .. }
                | NodeKind::Labeled { .. }
                | NodeKind::ExprStmt { .. }
                | NodeKind::Defer { .. }
                | NodeKind::Spawn { .. }
                | NodeKind::Assignment { .. }
        )
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            NodeKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&LiteralValue> {
        match self {
            NodeKind::Literal(value) => Some(value),
            _ => None,
        }
    }
}

/// A normalized syntax element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
}

impl Node {
    pub fn position(&self) -> Position {
        self.span.position()
    }
}

/// How an import binds a package into the file's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// `import "net/http"` binds `http`.
    Default,
    /// `import h "net/http"` binds `h`.
    Named,
    /// `import . "net/http"` merges exported names.
    Dot,
    /// `import _ "net/http"` binds nothing.
    Blank,
}

/// A symbol binding introduced by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    /// Local name the package is reachable under (`.`/`_` for dot/blank).
    pub alias: String,
    /// Full import path, e.g. `github.com/rs/cors`.
    pub path: String,
    pub kind: ImportKind,
}

impl ImportBinding {
    /// Build a binding from an optional explicit name and the import path.
    pub fn new(name: Option<&str>, path: &str) -> Self {
        let (alias, kind) = match name {
            Some(".") => (".".to_string(), ImportKind::Dot),
            Some("_") => ("_".to_string(), ImportKind::Blank),
            Some(n) => (n.to_string(), ImportKind::Named),
            None => (default_package_name(path), ImportKind::Default),
        };
        Self {
            alias,
            path: path.to_string(),
            kind,
        }
    }
}

/// Package name a path binds by default: its last element, skipping a
/// trailing major-version element (`/v2`) and a `.vN` suffix (`yaml.v3`).
pub fn default_package_name(path: &str) -> String {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() > 1 {
        if let Some(last) = parts.last() {
            if is_major_version(last) {
                parts.pop();
            }
        }
    }
    let last = parts.last().copied().unwrap_or(path);
    let last = match last.rsplit_once(".v") {
        Some((head, tail)) if !head.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => head,
        _ => last,
    };
    last.strip_prefix("go-").unwrap_or(last).replace('-', "_")
}

fn is_major_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

/// One compilable file in normalized form. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub(super) path: String,
    pub(super) language: String,
    pub(super) source: String,
    pub(super) nodes: Vec<Node>,
    pub(super) root: NodeId,
    pub(super) imports: Vec<ImportBinding>,
}

impl SourceUnit {
    /// Path relative to the scan root, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn imports(&self) -> &[ImportBinding] {
        &self.imports
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Source text covered by a node.
    pub fn text(&self, id: NodeId) -> &str {
        let span = self.span(id);
        self.source.get(span.start_byte..span.end_byte).unwrap_or("")
    }

    /// A source line (1-indexed) without its line terminator.
    pub fn line_text(&self, line: usize) -> &str {
        if line == 0 {
            return "";
        }
        self.source
            .lines()
            .nth(line - 1)
            .map(|l| l.trim_end_matches('\r'))
            .unwrap_or("")
    }

    /// Import bound under `alias`, ignoring dot and blank imports.
    pub fn import_for_alias(&self, alias: &str) -> Option<&ImportBinding> {
        self.imports
            .iter()
            .find(|i| i.alias == alias && matches!(i.kind, ImportKind::Default | ImportKind::Named))
    }

    /// Paths imported with `import . "path"`.
    pub fn dot_imports(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .filter(|i| i.kind == ImportKind::Dot)
            .map(|i| i.path.as_str())
    }

    /// Pre-order walk of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            let mut children = self.kind(n).children();
            children.reverse();
            stack.extend(children);
        }
        out
    }
}
