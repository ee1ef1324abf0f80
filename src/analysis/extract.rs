//! Single-pass fact extraction.
//!
//! [`FactExtractor::extract`] walks a unit's tree once in source order and
//! emits call, construct, field-value, definition and branch facts, building
//! a flow graph for each function body it enters. Calls and types that do not
//! resolve to a known API are still recorded, just without a pattern; nothing
//! here ever fails.

use std::collections::HashSet;

use super::{
    AccessPath, ArgFact, BranchFact, CallFact, ConstructFact, CorsShape, DefinitionFact, FieldValueFact,
    FlowGraph, FunctionFacts, FunctionId, KnownApis, NodeId, NodeKind, PathSegment, Pattern,
    SourceUnit, UnitFacts, ValueFact, AssignOp,
};

/// Extracts [`UnitFacts`] from a [`SourceUnit`].
pub struct FactExtractor<'a> {
    apis: &'a KnownApis,
}

impl<'a> FactExtractor<'a> {
    pub fn new(apis: &'a KnownApis) -> Self {
        Self { apis }
    }

    /// Extract all facts from a unit.
    pub fn extract(&self, unit: &SourceUnit) -> UnitFacts {
        let mut walk = Walk {
            unit,
            apis: self.apis,
            facts: UnitFacts {
                path: unit.path().to_string(),
                ..Default::default()
            },
            locals: Vec::new(),
        };
        walk.visit(
            unit.root(),
            Ctx {
                function: None,
                statement: None,
                deferred: false,
            },
        );
        tracing::trace!(
            path = unit.path(),
            calls = walk.facts.calls.len(),
            constructs = walk.facts.constructs.len(),
            functions = walk.facts.functions.len(),
            "extracted facts"
        );
        walk.facts
    }
}

/// Build the access path an expression denotes, if it is a selection chain
/// rooted at a name.
pub fn access_path(unit: &SourceUnit, id: NodeId) -> Option<AccessPath> {
    match unit.kind(id) {
        NodeKind::Identifier { name } => Some(AccessPath::variable(name.clone())),
        NodeKind::FieldAccess { operand, field } => {
            let mut path = access_path(unit, *operand)?;
            path.segments.push(PathSegment::Field(field.clone()));
            Some(path)
        }
        NodeKind::Call { callee, .. } => match unit.kind(*callee) {
            NodeKind::FieldAccess { operand, field } => {
                let mut path = access_path(unit, *operand)?;
                path.segments.push(PathSegment::Call(field.clone()));
                Some(path)
            }
            _ => None,
        },
        NodeKind::Unary { op, operand } if op == "&" || op == "*" => access_path(unit, *operand),
        _ => None,
    }
}

/// Describe an expression as a [`ValueFact`].
pub fn value_fact(unit: &SourceUnit, id: NodeId) -> ValueFact {
    match unit.kind(id) {
        NodeKind::Literal(value) => ValueFact::Literal(value.clone()),
        NodeKind::Identifier { name } => ValueFact::Identifier(name.clone()),
        NodeKind::CompositeConstruct {
            type_name,
            elements,
        } => {
            let sequence_type = type_name
                .as_deref()
                .map(|t| t.trim_start().starts_with('['))
                .unwrap_or(true);
            if sequence_type && elements.iter().all(|e| e.key.is_none()) {
                ValueFact::Sequence(elements.iter().map(|e| value_fact(unit, e.value)).collect())
            } else {
                ValueFact::Construct(id)
            }
        }
        NodeKind::Unary { op, operand } if op == "&" => value_fact(unit, *operand),
        NodeKind::FieldAccess { .. } => access_path(unit, id)
            .map(ValueFact::Path)
            .unwrap_or(ValueFact::Unknown),
        NodeKind::Call { .. } => ValueFact::Call(id),
        _ => ValueFact::Unknown,
    }
}

/// Qualify a type name as written (`cors.Options`, `*pkg.T`) through the
/// unit's imports.
pub fn qualify_type(unit: &SourceUnit, apis: &KnownApis, written: &str) -> Option<String> {
    let written = written.trim().trim_start_matches(['*', '&']);
    // Drop type arguments: `pkg.T[int]`.
    let written = written.split('[').next().unwrap_or(written);
    if written.is_empty() {
        return None;
    }
    match written.split_once('.') {
        Some((alias, name)) => unit
            .import_for_alias(alias)
            .map(|import| format!("{}.{}", import.path, name)),
        None => {
            for path in unit.dot_imports() {
                let candidate = format!("{}.{}", path, written);
                if apis.is_known_type(&candidate) {
                    return Some(candidate);
                }
            }
            Some(written.to_string())
        }
    }
}

/// Resolve a call's callee to a qualified name and pattern.
///
/// `locals` holds names bound in the enclosing function; a local shadows an
/// import alias of the same name.
pub fn resolve_callee(
    unit: &SourceUnit,
    apis: &KnownApis,
    callee: NodeId,
    locals: Option<&HashSet<String>>,
) -> (String, Option<AccessPath>, Option<Pattern>) {
    let is_local = |name: &str| locals.map(|l| l.contains(name)).unwrap_or(false);
    match unit.kind(callee) {
        NodeKind::Identifier { name } => {
            for path in unit.dot_imports() {
                let qualified = format!("{}.{}", path, name);
                if let Some(pattern) = apis.call(&qualified) {
                    return (qualified, None, Some(pattern));
                }
            }
            (name.clone(), None, apis.call(name))
        }
        NodeKind::FieldAccess { operand, field } => {
            if let NodeKind::Identifier { name: pkg } = unit.kind(*operand) {
                if !is_local(pkg) {
                    if let Some(import) = unit.import_for_alias(pkg) {
                        let qualified = format!("{}.{}", import.path, field);
                        let pattern = apis.call(&qualified);
                        return (qualified, None, pattern);
                    }
                }
            }
            let path = access_path(unit, callee);
            let pattern = path.as_ref().and_then(|p| apis.method(p));
            let name = path
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| unit.text(callee).to_string());
            (name, path, pattern)
        }
        _ => (unit.text(callee).to_string(), None, None),
    }
}

#[derive(Debug, Clone, Copy)]
struct Ctx {
    function: Option<FunctionId>,
    statement: Option<NodeId>,
    deferred: bool,
}

struct Walk<'u> {
    unit: &'u SourceUnit,
    apis: &'u KnownApis,
    facts: UnitFacts,
    /// Names bound inside each function (including enclosing functions).
    locals: Vec<HashSet<String>>,
}

impl<'u> Walk<'u> {
    fn visit(&mut self, id: NodeId, mut ctx: Ctx) {
        let unit = self.unit;
        let kind = unit.kind(id);

        if let NodeKind::Function {
            name,
            receiver,
            params,
            ..
        } = kind
        {
            let fid = self.enter_function(id, name, receiver, params, ctx.function);
            ctx = Ctx {
                function: Some(fid),
                statement: None,
                deferred: false,
            };
        } else if let Some(fid) = ctx.function {
            if self.facts.functions[fid.0].graph.contains(id) {
                ctx.statement = Some(id);
            }
        }

        match kind {
            NodeKind::Defer { .. } => ctx.deferred = true,
            NodeKind::Call { .. } => self.record_call(id, ctx),
            NodeKind::CompositeConstruct { .. } => self.record_construct(id, ctx),
            NodeKind::Assignment { .. } => self.record_assignment(id, ctx),
            NodeKind::If { cond, .. } => self.facts.branches.push(BranchFact {
                statement: id,
                conditions: vec![*cond],
                function: ctx.function,
            }),
            NodeKind::Switch { tag, cases, .. } => {
                let mut conditions: Vec<NodeId> = tag.iter().copied().collect();
                for case in cases {
                    if let NodeKind::Case { values, .. } = unit.kind(*case) {
                        conditions.extend(values);
                    }
                }
                self.facts.branches.push(BranchFact {
                    statement: id,
                    conditions,
                    function: ctx.function,
                });
            }
            _ => {}
        }

        for child in kind.children() {
            self.visit(child, ctx);
        }
    }

    fn enter_function(
        &mut self,
        id: NodeId,
        name: &Option<String>,
        receiver: &Option<String>,
        params: &[String],
        parent: Option<FunctionId>,
    ) -> FunctionId {
        let unit = self.unit;
        let apis = self.apis;

        let mut locals: HashSet<String> = parent
            .map(|p| self.locals[p.0].clone())
            .unwrap_or_default();
        locals.extend(params.iter().cloned());
        for n in unit.descendants(id) {
            if let NodeKind::Assignment {
                targets,
                op: AssignOp::Define | AssignOp::Range,
                ..
            } = unit.kind(n)
            {
                for t in targets {
                    if let Some(name) = unit.kind(*t).identifier() {
                        locals.insert(name.to_string());
                    }
                }
            }
        }

        let is_terminal = |expr: NodeId| match unit.kind(expr) {
            NodeKind::Call { callee, .. } => matches!(
                resolve_callee(unit, apis, *callee, None).2,
                Some(Pattern::Terminator)
            ),
            _ => false,
        };
        let graph = FlowGraph::build(unit, id, &is_terminal);

        let fid = FunctionId(self.facts.functions.len());
        self.facts.functions.push(FunctionFacts {
            node: id,
            name: name.clone(),
            receiver: receiver.clone(),
            params: params.to_vec(),
            graph,
        });
        self.locals.push(locals);
        fid
    }

    fn record_call(&mut self, id: NodeId, ctx: Ctx) {
        let unit = self.unit;
        let NodeKind::Call { callee, args } = unit.kind(id) else {
            return;
        };
        let locals = ctx.function.map(|f| &self.locals[f.0]);
        let (name, callee_path, pattern) = resolve_callee(unit, self.apis, *callee, locals);
        let receiver = match (&callee_path, unit.kind(*callee)) {
            (Some(_), NodeKind::FieldAccess { operand, .. }) => access_path(unit, *operand),
            _ => None,
        };
        if pattern.is_none() {
            tracing::trace!(path = unit.path(), callee = %name, "unresolved call");
        }

        let (assigned_to, discarded) = self.result_use(id);
        self.facts.calls.push(CallFact {
            site: id,
            callee: name,
            callee_path,
            pattern,
            receiver,
            args: args
                .iter()
                .map(|&a| ArgFact {
                    node: a,
                    value: value_fact(unit, a),
                })
                .collect(),
            statement: ctx.statement,
            function: ctx.function,
            deferred: ctx.deferred,
            assigned_to,
            discarded,
        });
    }

    /// Where a call's result goes: assignment targets, and whether it is
    /// thrown away.
    fn result_use(&self, call: NodeId) -> (Vec<AccessPath>, bool) {
        let unit = self.unit;
        let Some(parent) = unit.parent(call) else {
            return (Vec::new(), false);
        };
        match unit.kind(parent) {
            NodeKind::ExprStmt { .. } | NodeKind::Defer { .. } | NodeKind::Spawn { .. } => {
                (Vec::new(), true)
            }
            NodeKind::Assignment {
                targets, values, ..
            } => {
                let Some(position) = values.iter().position(|v| *v == call) else {
                    return (Vec::new(), false);
                };
                let target = if values.len() == targets.len() {
                    targets.get(position)
                } else {
                    targets.first()
                };
                match target.and_then(|t| access_path(unit, *t)) {
                    Some(path) if path.is_variable() && path.root == "_" => (Vec::new(), true),
                    Some(path) => (vec![path], false),
                    None => (Vec::new(), false),
                }
            }
            _ => (Vec::new(), false),
        }
    }

    fn record_construct(&mut self, id: NodeId, ctx: Ctx) {
        let unit = self.unit;
        let NodeKind::CompositeConstruct {
            type_name,
            elements,
        } = unit.kind(id)
        else {
            return;
        };

        let qualified = type_name
            .as_deref()
            .and_then(|t| qualify_type(unit, self.apis, t));
        let constructor = self.cors_constructor_of(id, ctx);
        // Options handed to a known constructor are checked even when their
        // written type does not resolve.
        let cors = qualified
            .as_deref()
            .and_then(|t| self.apis.cors_shape(t))
            .cloned()
            .or_else(|| constructor.as_ref().and_then(|(_, shape)| shape.clone()));

        let mut fields = Vec::new();
        for element in elements {
            let Some(key) = element.key else {
                continue;
            };
            let field_name = match unit.kind(key) {
                NodeKind::Identifier { name } => name.clone(),
                NodeKind::Literal(value) => match value.as_str() {
                    Some(s) => s.to_string(),
                    None => continue,
                },
                _ => continue,
            };
            fields.push(self.facts.field_values.len());
            self.facts.field_values.push(FieldValueFact {
                construct: id,
                field_name,
                value: value_fact(unit, element.value),
                value_node: element.value,
            });
        }

        self.facts.constructs.push(ConstructFact {
            site: id,
            type_name: qualified,
            cors,
            fields,
            passed_to: constructor.map(|(call, _)| call),
            statement: ctx.statement,
            function: ctx.function,
        });
    }

    /// The known CORS constructor `id` is passed to in its options position,
    /// looking through `&`, with the options layout that constructor takes.
    fn cors_constructor_of(&self, id: NodeId, ctx: Ctx) -> Option<(NodeId, Option<CorsShape>)> {
        let unit = self.unit;
        let mut current = id;
        let mut parent = unit.parent(current)?;
        if let NodeKind::Unary { op, .. } = unit.kind(parent) {
            if op == "&" {
                current = parent;
                parent = unit.parent(current)?;
            }
        }
        let NodeKind::Call { callee, args } = unit.kind(parent) else {
            return None;
        };
        let locals = ctx.function.map(|f| &self.locals[f.0]);
        let (name, _, pattern) = resolve_callee(unit, self.apis, *callee, locals);
        let Some(Pattern::CorsConstructor { arg }) = pattern else {
            return None;
        };
        if args.get(arg) != Some(&current) {
            return None;
        }
        Some((parent, self.apis.constructor_shape(&name).cloned()))
    }

    fn record_assignment(&mut self, id: NodeId, ctx: Ctx) {
        let unit = self.unit;
        let NodeKind::Assignment {
            targets,
            values,
            op,
        } = unit.kind(id)
        else {
            return;
        };
        let compound = matches!(op, AssignOp::Compound(_));
        let range = *op == AssignOp::Range;

        for (i, &target) in targets.iter().enumerate() {
            let Some(path) = access_path(unit, target) else {
                continue;
            };
            if path.is_variable() && path.root == "_" {
                continue;
            }
            let (value, tuple_index) = if range {
                (None, None)
            } else if values.len() == targets.len() {
                (Some(values[i]), None)
            } else if values.len() == 1 {
                (Some(values[0]), Some(i))
            } else {
                (None, None)
            };
            self.facts.definitions.push(DefinitionFact {
                target: path,
                site: id,
                value,
                value_fact: value
                    .map(|v| value_fact(unit, v))
                    .unwrap_or(ValueFact::Unknown),
                tuple_index,
                compound,
                statement: ctx.statement,
                function: ctx.function,
            });
        }
    }
}
