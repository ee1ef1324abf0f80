//! Fact structures extracted from the normalized tree.

use std::fmt;

use serde::Serialize;

use super::{CorsShape, FlowGraph, LiteralValue, NodeId, Pattern};

/// One step of an access path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PathSegment {
    /// `.name`
    Field(String),
    /// `.name(...)`, arguments ignored.
    Call(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Call(name) => write!(f, "{}()", name),
        }
    }
}

/// A variable followed by field and method selections: `r.Body`,
/// `w.Header().Set`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AccessPath {
    pub root: String,
    pub segments: Vec<PathSegment>,
}

impl AccessPath {
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            segments: Vec::new(),
        }
    }

    pub fn is_variable(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last_field(&self) -> Option<&str> {
        match self.segments.last() {
            Some(PathSegment::Field(name)) => Some(name),
            _ => None,
        }
    }

    /// Segments rendered the way selector table keys are written.
    pub fn segment_strings(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.to_string()).collect()
    }

    /// `"Header().Set"` -> `["Header()", "Set"]`.
    pub fn split_selector(selector: &str) -> Vec<String> {
        selector
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    /// Replace the root variable with `prefix`, keeping the segments.
    pub fn rebase(&self, prefix: &AccessPath) -> AccessPath {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        AccessPath {
            root: prefix.root.clone(),
            segments,
        }
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// The statically known shape of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueFact {
    Literal(LiteralValue),
    /// Unkeyed slice/array literal.
    Sequence(Vec<ValueFact>),
    /// A bare name, resolved lazily by the flow resolver.
    Identifier(String),
    /// A field/method selection rooted at a variable.
    Path(AccessPath),
    Call(NodeId),
    Construct(NodeId),
    Unknown,
}

impl ValueFact {
    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            ValueFact::Literal(value) => Some(value),
            _ => None,
        }
    }
}

/// One call argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgFact {
    pub node: NodeId,
    pub value: ValueFact,
}

/// Index into [`UnitFacts::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FunctionId(pub usize);

/// A call site.
#[derive(Debug, Clone, Serialize)]
pub struct CallFact {
    pub site: NodeId,
    /// Qualified name (`io.ReadAll`) or selector text (`w.Header().Set`).
    pub callee: String,
    /// Callee as an access path, when it is a selection.
    pub callee_path: Option<AccessPath>,
    pub pattern: Option<Pattern>,
    /// Operand of a method call (`w.Header()` for `w.Header().Set`).
    pub receiver: Option<AccessPath>,
    pub args: Vec<ArgFact>,
    /// Enclosing flow-graph statement; `None` at package level.
    pub statement: Option<NodeId>,
    pub function: Option<FunctionId>,
    /// Inside a `defer`: runs at function exit, not in place.
    pub deferred: bool,
    /// Targets the call's result is directly assigned to.
    pub assigned_to: Vec<AccessPath>,
    /// Result is dropped (`f()` or `_ = f()`).
    pub discarded: bool,
}

impl CallFact {
    pub fn arg(&self, index: usize) -> Option<&ArgFact> {
        self.args.get(index)
    }
}

/// A struct/record construction.
#[derive(Debug, Clone, Serialize)]
pub struct ConstructFact {
    pub site: NodeId,
    /// Qualified type name, when the type resolves through the imports.
    pub type_name: Option<String>,
    /// CORS layout, when the type is a known CORS options type.
    pub cors: Option<CorsShape>,
    /// Indices into [`UnitFacts::field_values`].
    pub fields: Vec<usize>,
    /// Call this construct is passed to directly, if any.
    pub passed_to: Option<NodeId>,
    pub statement: Option<NodeId>,
    pub function: Option<FunctionId>,
}

/// `Field: value` inside a construct.
#[derive(Debug, Clone, Serialize)]
pub struct FieldValueFact {
    pub construct: NodeId,
    pub field_name: String,
    pub value: ValueFact,
    pub value_node: NodeId,
}

/// A direct assignment to a variable or field.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionFact {
    pub target: AccessPath,
    /// Assignment node.
    pub site: NodeId,
    /// Right-hand side expression, if any.
    pub value: Option<NodeId>,
    pub value_fact: ValueFact,
    /// Position in a multi-value assignment fed by one expression
    /// (`v, ok := m[k]`); `None` for one-to-one assignments.
    pub tuple_index: Option<usize>,
    /// `+=` and friends: the old value flows into the new one.
    pub compound: bool,
    pub statement: Option<NodeId>,
    pub function: Option<FunctionId>,
}

/// A conditional statement and the expressions it branches on.
#[derive(Debug, Clone, Serialize)]
pub struct BranchFact {
    pub statement: NodeId,
    /// `if` condition, or switch tag followed by case values.
    pub conditions: Vec<NodeId>,
    pub function: Option<FunctionId>,
}

/// A function body and its flow graph.
#[derive(Debug, Clone)]
pub struct FunctionFacts {
    pub node: NodeId,
    pub name: Option<String>,
    pub receiver: Option<String>,
    pub params: Vec<String>,
    pub graph: FlowGraph,
}

/// Fact families a detector may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Call,
    Construct,
    FieldValue,
    Definition,
    Branch,
    FlowEdge,
}

/// Everything extracted from one unit, in source order.
#[derive(Debug, Clone, Default)]
pub struct UnitFacts {
    pub path: String,
    pub calls: Vec<CallFact>,
    pub constructs: Vec<ConstructFact>,
    pub field_values: Vec<FieldValueFact>,
    pub definitions: Vec<DefinitionFact>,
    pub branches: Vec<BranchFact>,
    pub functions: Vec<FunctionFacts>,
}

impl UnitFacts {
    pub fn call(&self, site: NodeId) -> Option<&CallFact> {
        self.calls.iter().find(|c| c.site == site)
    }

    pub fn construct(&self, site: NodeId) -> Option<&ConstructFact> {
        self.constructs.iter().find(|c| c.site == site)
    }

    pub fn function(&self, id: FunctionId) -> &FunctionFacts {
        &self.functions[id.0]
    }

    pub fn fields_of<'a>(&'a self, construct: &'a ConstructFact) -> impl Iterator<Item = &'a FieldValueFact> + 'a {
        construct.fields.iter().map(move |&i| &self.field_values[i])
    }

    /// Whether any fact of `kind` was extracted.
    pub fn has(&self, kind: FactKind) -> bool {
        match kind {
            FactKind::Call => !self.calls.is_empty(),
            FactKind::Construct => !self.constructs.is_empty(),
            FactKind::FieldValue => !self.field_values.is_empty(),
            FactKind::Definition => !self.definitions.is_empty(),
            FactKind::Branch => !self.branches.is_empty(),
            FactKind::FlowEdge => self.functions.iter().any(|f| f.graph.edge_count() > 0),
        }
    }

    /// Calls recognized as `pattern`-like by the predicate.
    pub fn calls_matching<'a>(
        &'a self,
        predicate: impl Fn(&Pattern) -> bool + 'a,
    ) -> impl Iterator<Item = &'a CallFact> + 'a {
        self.calls
            .iter()
            .filter(move |c| c.pattern.as_ref().map(&predicate).unwrap_or(false))
    }
}
