//! Go front-end using tree-sitter.
//!
//! Lowers a `tree-sitter-go` parse tree into the normalized node model:
//! - Functions, methods and function literals (receiver type and parameter names)
//! - Statements, including labeled statements, `goto`, `select` and type switches
//! - `var`/`const` specs as defining assignments, `range` clauses as range assignments
//! - Selector, call, index and composite-literal expressions
//! - String literals with quotes removed and escapes decoded
//!
//! Files with any syntax error are rejected rather than partially lowered.

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use crate::analysis::{
    AssignOp, Element, ImportBinding, JumpKind, LiteralValue, NodeId, NodeKind, NormalizeError,
    SourceUnit, Span, SwitchKind, SyntaxAdapter, UnitBuilder,
};

/// Tree-sitter query for extracting imports, including dot and blank ones.
const IMPORT_QUERY: &str = r#"
(import_spec
  name: (_)? @alias
  path: (_) @path
) @import
"#;

/// Go front-end.
pub struct GoAdapter {
    language: Language,
}

impl GoAdapter {
    /// Create a new Go front-end.
    pub fn new() -> Self {
        Self {
            language: tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Create a new parser for this call.
    fn create_parser(&self) -> Result<Parser, NormalizeError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| NormalizeError::Parser(e.to_string()))?;
        Ok(parser)
    }

    fn extract_imports(
        &self,
        root: Node,
        source: &str,
        builder: &mut UnitBuilder,
    ) -> Result<(), NormalizeError> {
        let query = Query::new(&self.language, IMPORT_QUERY)
            .map_err(|e| NormalizeError::Parser(e.to_string()))?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, source.as_bytes());

        while let Some(m) = matches.next() {
            let mut path = None;
            let mut alias = None;
            for capture in m.captures {
                let text = node_text(capture.node, source);
                match query.capture_names()[capture.index as usize] {
                    "path" => path = Some(unquote(text)),
                    "alias" => alias = Some(text),
                    _ => {}
                }
            }
            if let Some(path) = path.filter(|p| !p.is_empty()) {
                builder.import(ImportBinding::new(alias, &path));
            }
        }
        Ok(())
    }
}

impl Default for GoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxAdapter for GoAdapter {
    fn language_id(&self) -> &'static str {
        "go"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn normalize(&self, path: &str, source: &[u8]) -> Result<SourceUnit, NormalizeError> {
        let text = std::str::from_utf8(source).map_err(|_| NormalizeError::InvalidUtf8)?;
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| NormalizeError::Parser(format!("failed to parse Go source: {}", path)))?;

        let root = tree.root_node();
        if root.has_error() {
            let (line, column) = first_error(root)
                .map(|n| {
                    let p = n.start_position();
                    (p.row + 1, p.column + 1)
                })
                .unwrap_or((1, 1));
            return Err(NormalizeError::Syntax { line, column });
        }

        let mut lowering = Lowering {
            source: text,
            builder: UnitBuilder::new(path, self.language_id(), text),
        };
        self.extract_imports(root, text, &mut lowering.builder)?;
        let root_id = lowering.source_file(root);
        lowering.builder.finish(root_id)
    }
}

/// First error or missing node in pre-order.
fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Named, non-comment children with their field names.
fn fielded_children(node: Node) -> Vec<(Option<&'static str>, Node)> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() && child.kind() != "comment" {
                out.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

fn named_children(node: Node) -> Vec<Node> {
    fielded_children(node).into_iter().map(|(_, n)| n).collect()
}

fn children_by_field<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    fielded_children(node)
        .into_iter()
        .filter(|(f, _)| *f == Some(field))
        .map(|(_, n)| n)
        .collect()
}

/// Decode a Go string literal (interpreted or raw).
fn unquote(text: &str) -> String {
    if let Some(raw) = text.strip_prefix('`') {
        return raw.strip_suffix('`').unwrap_or(raw).replace('\r', "");
    }
    let inner = text.strip_prefix('"').unwrap_or(text);
    let inner = inner.strip_suffix('"').unwrap_or(inner);
    if !inner.contains('\\') {
        return inner.to_string();
    }

    let mut out = String::with_capacity(inner.len());
    let mut bytes: Vec<u8> = Vec::new();
    let mut chars = inner.chars().peekable();
    let flush = |bytes: &mut Vec<u8>, out: &mut String| {
        if !bytes.is_empty() {
            out.push_str(&String::from_utf8_lossy(bytes));
            bytes.clear();
        }
    };
    while let Some(c) = chars.next() {
        if c != '\\' {
            flush(&mut bytes, &mut out);
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            out.push('\\');
            break;
        };
        let simple = match escape {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0c'),
            'v' => Some('\x0b'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            '\'' => Some('\''),
            _ => None,
        };
        if let Some(s) = simple {
            flush(&mut bytes, &mut out);
            out.push(s);
            continue;
        }
        match escape {
            // \xHH and octal escapes denote bytes, which may form UTF-8 together.
            'x' => {
                let hex: String = (0..2).filter_map(|_| chars.next()).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(b) => bytes.push(b),
                    Err(_) => {
                        flush(&mut bytes, &mut out);
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            '0'..='7' => {
                let mut octal = escape.to_string();
                for _ in 0..2 {
                    if let Some(d) = chars.next_if(|d| d.is_digit(8)) {
                        octal.push(d);
                    }
                }
                match u8::from_str_radix(&octal, 8) {
                    Ok(b) => bytes.push(b),
                    Err(_) => {
                        flush(&mut bytes, &mut out);
                        out.push('\\');
                        out.push_str(&octal);
                    }
                }
            }
            'u' | 'U' => {
                flush(&mut bytes, &mut out);
                let width = if escape == 'u' { 4 } else { 8 };
                let hex: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push(escape);
                        out.push_str(&hex);
                    }
                }
            }
            other => {
                flush(&mut bytes, &mut out);
                out.push('\\');
                out.push(other);
            }
        }
    }
    flush(&mut bytes, &mut out);
    out
}

/// Lowering state for one file.
struct Lowering<'s> {
    source: &'s str,
    builder: UnitBuilder,
}

impl<'s> Lowering<'s> {
    fn text(&self, node: Node) -> &'s str {
        node_text(node, self.source)
    }

    fn push(&mut self, kind: NodeKind, node: Node) -> NodeId {
        self.builder.push(kind, Span::from_node(node))
    }

    fn opaque(&mut self, node: Node) -> NodeId {
        let children = named_children(node)
            .into_iter()
            .map(|c| self.expr(c))
            .collect();
        self.push(NodeKind::Opaque { children }, node)
    }

    fn source_file(&mut self, node: Node) -> NodeId {
        let mut decls = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "package_clause" | "import_declaration" | "type_declaration" => {}
                "function_declaration" | "method_declaration" => decls.push(self.function(child)),
                _ => decls.extend(self.stmt(child)),
            }
        }
        self.push(NodeKind::Root { decls }, node)
    }

    /// Function declaration, method declaration or function literal.
    fn function(&mut self, node: Node) -> NodeId {
        let name = match node.kind() {
            "func_literal" => None,
            _ => node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string()),
        };
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|list| named_children(list).into_iter().next())
            .and_then(|param| param.child_by_field_name("type"))
            .map(|t| {
                let text = self.text(t).trim_start_matches('*');
                text.split('[').next().unwrap_or(text).trim().to_string()
            });
        let params = node
            .child_by_field_name("parameters")
            .map(|list| {
                named_children(list)
                    .into_iter()
                    .flat_map(|p| children_by_field(p, "name"))
                    .map(|n| self.text(n).to_string())
                    .collect()
            })
            .unwrap_or_default();
        let body = node.child_by_field_name("body").map(|b| self.block(b));
        self.push(
            NodeKind::Function {
                name,
                receiver,
                params,
                body,
            },
            node,
        )
    }

    fn block(&mut self, node: Node) -> NodeId {
        let stmts = self.stmts_of(node, &[]);
        self.push(NodeKind::Block { stmts }, node)
    }

    /// Statements under `node`, skipping children in `skip_fields` and
    /// flattening statement lists.
    fn stmts_of(&mut self, node: Node, skip_fields: &[&str]) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (field, child) in fielded_children(node) {
            if field.map(|f| skip_fields.contains(&f)).unwrap_or(false) {
                continue;
            }
            if child.kind() == "statement_list" {
                out.extend(self.stmts_of(child, &[]));
            } else {
                out.extend(self.stmt(child));
            }
        }
        out
    }

    fn expr_list(&mut self, node: Option<Node>) -> Vec<NodeId> {
        match node {
            Some(n) if n.kind() == "expression_list" => named_children(n)
                .into_iter()
                .map(|c| self.expr(c))
                .collect(),
            Some(n) => vec![self.expr(n)],
            None => Vec::new(),
        }
    }

    fn field_expr(&mut self, node: Node, field: &str) -> Option<NodeId> {
        node.child_by_field_name(field).map(|n| self.expr(n))
    }

    /// The first statement a simple-statement slot lowers to.
    fn simple_stmt(&mut self, node: Option<Node>) -> Option<NodeId> {
        node.and_then(|n| self.stmt(n).into_iter().next())
    }

    fn label_of(&self, node: Node) -> Option<String> {
        named_children(node)
            .into_iter()
            .find(|c| c.kind() == "label_name")
            .map(|c| self.text(c).to_string())
    }

    fn stmt(&mut self, node: Node) -> Vec<NodeId> {
        let id = match node.kind() {
            "block" => self.block(node),
            "statement_list" => return self.stmts_of(node, &[]),
            "empty_statement" | "type_declaration" | "comment" => return Vec::new(),
            "var_declaration" | "const_declaration" | "var_spec_list" | "const_spec_list" => {
                return named_children(node)
                    .into_iter()
                    .flat_map(|c| self.stmt(c))
                    .collect();
            }
            "var_spec" | "const_spec" => {
                let targets = children_by_field(node, "name")
                    .into_iter()
                    .map(|n| self.expr(n))
                    .collect();
                let values = self.expr_list(node.child_by_field_name("value"));
                self.push(
                    NodeKind::Assignment {
                        targets,
                        values,
                        op: AssignOp::Define,
                    },
                    node,
                )
            }
            "expression_statement" => match named_children(node).into_iter().next() {
                Some(e) => {
                    let expr = self.expr(e);
                    self.push(NodeKind::ExprStmt { expr }, node)
                }
                None => return Vec::new(),
            },
            "send_statement" => {
                let expr = self.opaque(node);
                self.push(NodeKind::ExprStmt { expr }, node)
            }
            "short_var_declaration" | "assignment_statement" => {
                let targets = self.expr_list(node.child_by_field_name("left"));
                let values = self.expr_list(node.child_by_field_name("right"));
                let op = match node.child_by_field_name("operator").map(|o| self.text(o)) {
                    Some("=") => AssignOp::Assign,
                    Some(other) => AssignOp::Compound(other.to_string()),
                    None => AssignOp::Define,
                };
                self.push(
                    NodeKind::Assignment {
                        targets,
                        values,
                        op,
                    },
                    node,
                )
            }
            "inc_statement" | "dec_statement" => {
                let targets = named_children(node)
                    .into_iter()
                    .take(1)
                    .map(|c| self.expr(c))
                    .collect();
                let op = if node.kind() == "inc_statement" { "++" } else { "--" };
                self.push(
                    NodeKind::Assignment {
                        targets,
                        values: Vec::new(),
                        op: AssignOp::Compound(op.to_string()),
                    },
                    node,
                )
            }
            "receive_statement" => {
                let right = self.field_expr(node, "right");
                let left = node.child_by_field_name("left");
                match (left, right) {
                    (Some(left), Some(right)) => {
                        let targets = self.expr_list(Some(left));
                        let mut cursor = node.walk();
                        let defines = node.children(&mut cursor).any(|c| c.kind() == ":=");
                        let op = if defines { AssignOp::Define } else { AssignOp::Assign };
                        self.push(
                            NodeKind::Assignment {
                                targets,
                                values: vec![right],
                                op,
                            },
                            node,
                        )
                    }
                    (None, Some(expr)) => self.push(NodeKind::ExprStmt { expr }, node),
                    _ => self.opaque(node),
                }
            }
            "return_statement" => {
                let values = named_children(node)
                    .into_iter()
                    .flat_map(|c| self.expr_list(Some(c)))
                    .collect();
                self.push(NodeKind::Return { values }, node)
            }
            "go_statement" | "defer_statement" => {
                let call = match named_children(node).into_iter().next() {
                    Some(e) => self.expr(e),
                    None => self.opaque(node),
                };
                if node.kind() == "go_statement" {
                    self.push(NodeKind::Spawn { call }, node)
                } else {
                    self.push(NodeKind::Defer { call }, node)
                }
            }
            "if_statement" => {
                let init = self.simple_stmt(node.child_by_field_name("initializer"));
                let cond = match self.field_expr(node, "condition") {
                    Some(c) => c,
                    None => self.push(NodeKind::Opaque { children: vec![] }, node),
                };
                let then = match node.child_by_field_name("consequence") {
                    Some(b) => self.block(b),
                    None => self.push(NodeKind::Block { stmts: vec![] }, node),
                };
                let otherwise = node
                    .child_by_field_name("alternative")
                    .and_then(|alt| self.stmt(alt).into_iter().next());
                self.push(
                    NodeKind::If {
                        init,
                        cond,
                        then,
                        otherwise,
                    },
                    node,
                )
            }
            "for_statement" => self.for_statement(node),
            "expression_switch_statement" | "type_switch_statement" | "select_statement" => {
                self.switch(node)
            }
            "labeled_statement" => {
                let label = node
                    .child_by_field_name("label")
                    .map(|l| self.text(l).to_string())
                    .unwrap_or_default();
                let inner = fielded_children(node)
                    .into_iter()
                    .find(|(f, _)| *f != Some("label"))
                    .map(|(_, n)| n);
                let stmt = self.simple_stmt(inner);
                self.push(NodeKind::Labeled { label, stmt }, node)
            }
            "break_statement" | "continue_statement" | "goto_statement" => {
                let kind = match node.kind() {
                    "break_statement" => JumpKind::Break,
                    "continue_statement" => JumpKind::Continue,
                    _ => JumpKind::Goto,
                };
                let label = self.label_of(node);
                self.push(NodeKind::Jump { kind, label }, node)
            }
            "fallthrough_statement" => self.push(
                NodeKind::Jump {
                    kind: JumpKind::Fallthrough,
                    label: None,
                },
                node,
            ),
            // A bare expression in statement position (e.g. a simple-statement slot).
            _ => {
                let expr = self.expr(node);
                self.push(NodeKind::ExprStmt { expr }, node)
            }
        };
        vec![id]
    }

    fn for_statement(&mut self, node: Node) -> NodeId {
        let (mut init, mut cond, mut post) = (None, None, None);
        let mut body = None;
        for (field, child) in fielded_children(node) {
            if field == Some("body") {
                body = Some(self.block(child));
                continue;
            }
            match child.kind() {
                "for_clause" => {
                    init = self.simple_stmt(child.child_by_field_name("initializer"));
                    cond = self.field_expr(child, "condition");
                    post = self.simple_stmt(child.child_by_field_name("update"));
                }
                "range_clause" => {
                    let targets = self.expr_list(child.child_by_field_name("left"));
                    let values = self
                        .field_expr(child, "right")
                        .into_iter()
                        .collect();
                    cond = Some(self.push(
                        NodeKind::Assignment {
                            targets,
                            values,
                            op: AssignOp::Range,
                        },
                        child,
                    ));
                }
                _ => cond = Some(self.expr(child)),
            }
        }
        let body = match body {
            Some(b) => b,
            None => self.push(NodeKind::Block { stmts: vec![] }, node),
        };
        self.push(
            NodeKind::Loop {
                init,
                cond,
                post,
                body,
            },
            node,
        )
    }

    fn switch(&mut self, node: Node) -> NodeId {
        let kind = match node.kind() {
            "type_switch_statement" => SwitchKind::Type,
            "select_statement" => SwitchKind::Select,
            _ => SwitchKind::Expression,
        };
        let init = self.simple_stmt(node.child_by_field_name("initializer"));
        let tag = self.field_expr(node, "value");

        let mut cases = Vec::new();
        for child in named_children(node) {
            let case = match child.kind() {
                "expression_case" => {
                    let values = self.expr_list(child.child_by_field_name("value"));
                    let body = self.stmts_of(child, &["value"]);
                    NodeKind::Case {
                        values,
                        body,
                        is_default: false,
                    }
                }
                "type_case" => NodeKind::Case {
                    values: Vec::new(),
                    body: self.stmts_of(child, &["type"]),
                    is_default: false,
                },
                "communication_case" => {
                    let mut body: Vec<NodeId> = child
                        .child_by_field_name("communication")
                        .map(|c| self.stmt(c))
                        .unwrap_or_default();
                    body.extend(self.stmts_of(child, &["communication"]));
                    NodeKind::Case {
                        values: Vec::new(),
                        body,
                        is_default: false,
                    }
                }
                "default_case" => NodeKind::Case {
                    values: Vec::new(),
                    body: self.stmts_of(child, &[]),
                    is_default: true,
                },
                _ => continue,
            };
            cases.push(self.push(case, child));
        }

        self.push(
            NodeKind::Switch {
                kind,
                init,
                tag,
                cases,
            },
            node,
        )
    }

    fn expr(&mut self, node: Node) -> NodeId {
        match node.kind() {
            "identifier" | "field_identifier" | "package_identifier" | "type_identifier"
            | "blank_identifier" | "iota" => {
                let name = self.text(node).to_string();
                self.push(NodeKind::Identifier { name }, node)
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner),
                None => self.opaque(node),
            },
            "selector_expression" => {
                let (Some(operand), Some(field)) = (
                    node.child_by_field_name("operand"),
                    node.child_by_field_name("field"),
                ) else {
                    return self.opaque(node);
                };
                let operand = self.expr(operand);
                let field = self.text(field).to_string();
                self.push(NodeKind::FieldAccess { operand, field }, node)
            }
            "call_expression" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return self.opaque(node);
                };
                let callee = self.expr(function);
                let args = node
                    .child_by_field_name("arguments")
                    .map(|list| {
                        named_children(list)
                            .into_iter()
                            .map(|a| self.expr(a))
                            .collect()
                    })
                    .unwrap_or_default();
                self.push(NodeKind::Call { callee, args }, node)
            }
            "index_expression" => {
                let Some(operand) = node.child_by_field_name("operand") else {
                    return self.opaque(node);
                };
                let operand = self.expr(operand);
                let index = self.field_expr(node, "index");
                self.push(NodeKind::Index { operand, index }, node)
            }
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_default();
                let Some(operand) = self.field_expr(node, "operand") else {
                    return self.opaque(node);
                };
                self.push(NodeKind::Unary { op, operand }, node)
            }
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_default();
                let (Some(left), Some(right)) =
                    (self.field_expr(node, "left"), self.field_expr(node, "right"))
                else {
                    return self.opaque(node);
                };
                self.push(NodeKind::Binary { op, left, right }, node)
            }
            "composite_literal" => {
                let type_name = node
                    .child_by_field_name("type")
                    .map(|t| self.text(t).to_string());
                let elements = node
                    .child_by_field_name("body")
                    .map(|body| self.elements(body))
                    .unwrap_or_default();
                self.push(
                    NodeKind::CompositeConstruct {
                        type_name,
                        elements,
                    },
                    node,
                )
            }
            "literal_value" => {
                let elements = self.elements(node);
                self.push(
                    NodeKind::CompositeConstruct {
                        type_name: None,
                        elements,
                    },
                    node,
                )
            }
            "literal_element" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner),
                None => self.opaque(node),
            },
            "func_literal" => self.function(node),
            "interpreted_string_literal" | "raw_string_literal" => {
                let value = unquote(self.text(node));
                self.push(NodeKind::Literal(LiteralValue::Str(value)), node)
            }
            "int_literal" | "float_literal" | "imaginary_literal" => {
                let value = self.text(node).to_string();
                self.push(NodeKind::Literal(LiteralValue::Number(value)), node)
            }
            "rune_literal" => {
                let value = self.text(node).to_string();
                self.push(NodeKind::Literal(LiteralValue::Char(value)), node)
            }
            "true" => self.push(NodeKind::Literal(LiteralValue::Bool(true)), node),
            "false" => self.push(NodeKind::Literal(LiteralValue::Bool(false)), node),
            "nil" => self.push(NodeKind::Literal(LiteralValue::Nil), node),
            _ => self.opaque(node),
        }
    }

    fn elements(&mut self, body: Node) -> Vec<Element> {
        named_children(body)
            .into_iter()
            .map(|child| {
                if child.kind() == "keyed_element" {
                    let parts = named_children(child);
                    match parts.as_slice() {
                        [key, value, ..] => {
                            let key = self.expr(*key);
                            let value = self.expr(*value);
                            Element {
                                key: Some(key),
                                value,
                            }
                        }
                        _ => Element {
                            key: None,
                            value: self.opaque(child),
                        },
                    }
                } else {
                    Element {
                        key: None,
                        value: self.expr(child),
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ImportKind;

    fn normalize(source: &str) -> SourceUnit {
        GoAdapter::new()
            .normalize("main.go", source.as_bytes())
            .unwrap()
    }

    fn find<'a>(unit: &'a SourceUnit, pred: impl Fn(&NodeKind) -> bool) -> Vec<&'a NodeKind> {
        unit.descendants(unit.root())
            .into_iter()
            .map(|id| unit.kind(id))
            .filter(|k| pred(k))
            .collect()
    }

    #[test]
    fn test_imports() {
        let unit = normalize(
            r#"package main

import (
	"io"
	h "net/http"
	. "strings"
	_ "embed"
	"github.com/labstack/echo/v4/middleware"
)
"#,
        );
        let imports = unit.imports();
        assert_eq!(imports.len(), 5);
        assert_eq!(imports[0].alias, "io");
        assert_eq!(imports[1].alias, "h");
        assert_eq!(imports[1].kind, ImportKind::Named);
        assert_eq!(imports[2].kind, ImportKind::Dot);
        assert_eq!(imports[3].kind, ImportKind::Blank);
        assert_eq!(imports[4].alias, "middleware");
        assert_eq!(unit.import_for_alias("h").unwrap().path, "net/http");
        assert!(unit.import_for_alias("_").is_none());
    }

    #[test]
    fn test_method_receiver_and_params() {
        let unit = normalize(
            r#"package main

func (t *transport) RoundTrip(req *http.Request, a, b int) error {
	return nil
}
"#,
        );
        let funcs = find(&unit, |k| matches!(k, NodeKind::Function { .. }));
        assert_eq!(funcs.len(), 1);
        let NodeKind::Function {
            name,
            receiver,
            params,
            body,
        } = funcs[0]
        else {
            unreachable!()
        };
        assert_eq!(name.as_deref(), Some("RoundTrip"));
        assert_eq!(receiver.as_deref(), Some("transport"));
        assert_eq!(params, &vec!["req".to_string(), "a".to_string(), "b".to_string()]);
        assert!(body.is_some());
    }

    #[test]
    fn test_composite_literal_elements() {
        let unit = normalize(
            r#"package main

func f() {
	_ = cors.Options{
		AllowedOrigins:   []string{"*"},
		AllowCredentials: true,
	}
}
"#,
        );
        let constructs = find(&unit, |k| matches!(k, NodeKind::CompositeConstruct { .. }));
        assert_eq!(constructs.len(), 2);
        let NodeKind::CompositeConstruct {
            type_name,
            elements,
        } = constructs[0]
        else {
            unreachable!()
        };
        assert_eq!(type_name.as_deref(), Some("cors.Options"));
        assert_eq!(elements.len(), 2);
        let key = elements[0].key.map(|k| unit.kind(k).identifier());
        assert_eq!(key, Some(Some("AllowedOrigins")));
        assert_eq!(
            unit.kind(elements[1].value).literal(),
            Some(&LiteralValue::Bool(true))
        );
    }

    #[test]
    fn test_statements_lowered() {
        let unit = normalize(
            r#"package main

var limit = 10

func f(xs []int) {
	const origin = "*"
	for i, x := range xs {
		if x > limit {
			break
		}
		_ = i
	}
outer:
	for {
		select {
		case v := <-ch:
			_ = v
			continue outer
		default:
			goto done
		}
	}
done:
	defer cleanup()
	go work()
	n++
}
"#,
        );
        let ranges = find(&unit, |k| {
            matches!(
                k,
                NodeKind::Assignment {
                    op: AssignOp::Range,
                    ..
                }
            )
        });
        assert_eq!(ranges.len(), 1);
        assert_eq!(
            find(&unit, |k| matches!(k, NodeKind::Labeled { .. })).len(),
            2
        );
        assert_eq!(
            find(&unit, |k| matches!(
                k,
                NodeKind::Switch {
                    kind: SwitchKind::Select,
                    ..
                }
            ))
            .len(),
            1
        );
        assert_eq!(find(&unit, |k| matches!(k, NodeKind::Defer { .. })).len(), 1);
        assert_eq!(find(&unit, |k| matches!(k, NodeKind::Spawn { .. })).len(), 1);
        let jumps: Vec<JumpKind> = find(&unit, |k| matches!(k, NodeKind::Jump { .. }))
            .into_iter()
            .filter_map(|k| match k {
                NodeKind::Jump { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(jumps, vec![JumpKind::Break, JumpKind::Continue, JumpKind::Goto]);

        // Package-level var is a root-level definition.
        let NodeKind::Root { decls } = unit.kind(unit.root()) else {
            unreachable!()
        };
        assert!(matches!(
            unit.kind(decls[0]),
            NodeKind::Assignment {
                op: AssignOp::Define,
                ..
            }
        ));
    }

    #[test]
    fn test_string_unquote() {
        assert_eq!(unquote(r#""Access-Control-Allow-Origin""#), "Access-Control-Allow-Origin");
        assert_eq!(unquote(r#""a\tb\n""#), "a\tb\n");
        assert_eq!(unquote(r#""\x2a""#), "*");
        assert_eq!(unquote(r#""é""#), "é");
        assert_eq!(unquote("`raw\\n`"), "raw\\n");
    }

    #[test]
    fn test_syntax_error_rejected() {
        let err = GoAdapter::new()
            .normalize("bad.go", b"package main\n\nfunc f( {\n")
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Syntax { .. }));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = GoAdapter::new()
            .normalize("bad.go", &[0x70, 0xff, 0xfe])
            .unwrap_err();
        assert_eq!(err, NormalizeError::InvalidUtf8);
    }
}
