//! Arena construction for [`SourceUnit`]s.

use super::{ImportBinding, Node, NodeId, NodeKind, NormalizeError, SourceUnit, Span};

/// Builds a [`SourceUnit`] bottom-up.
///
/// Nodes are pushed children-first; [`finish`](Self::finish) fills in parent
/// links and rejects anything that is not a tree rooted at `root`.
pub struct UnitBuilder {
    path: String,
    language: String,
    source: String,
    nodes: Vec<Node>,
    imports: Vec<ImportBinding>,
}

impl UnitBuilder {
    pub fn new(path: impl Into<String>, language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            source: source.into(),
            nodes: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Add a node and return its id.
    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            span,
            parent: None,
        });
        id
    }

    pub fn import(&mut self, binding: ImportBinding) {
        self.imports.push(binding);
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.index()).map(|n| &n.kind)
    }

    /// Seal the unit.
    pub fn finish(mut self, root: NodeId) -> Result<SourceUnit, NormalizeError> {
        let len = self.nodes.len();
        if root.index() >= len {
            return Err(NormalizeError::MalformedTree(format!(
                "root {} out of range",
                root
            )));
        }

        for index in 0..len {
            let parent = self.nodes[index].id;
            for child in self.nodes[index].kind.children() {
                if child.index() >= len {
                    return Err(NormalizeError::MalformedTree(format!(
                        "{} references missing child {}",
                        parent, child
                    )));
                }
                if child == root || child == parent {
                    return Err(NormalizeError::MalformedTree(format!(
                        "cycle through {}",
                        child
                    )));
                }
                let slot = &mut self.nodes[child.index()].parent;
                if slot.is_some() {
                    return Err(NormalizeError::MalformedTree(format!(
                        "{} has more than one parent",
                        child
                    )));
                }
                *slot = Some(parent);
            }
        }

        // With unique parents, a walk from the root that revisits a node
        // has found a cycle.
        let mut seen = vec![false; len];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                return Err(NormalizeError::MalformedTree(format!(
                    "cycle through {}",
                    id
                )));
            }
            stack.extend(self.nodes[id.index()].kind.children());
        }

        Ok(SourceUnit {
            path: self.path,
            language: self.language,
            source: self.source,
            nodes: self.nodes,
            root,
            imports: self.imports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_sets_parents() {
        let mut b = UnitBuilder::new("a.go", "go", "");
        let ident = b.push(
            NodeKind::Identifier {
                name: "x".to_string(),
            },
            Span::default(),
        );
        let stmt = b.push(NodeKind::ExprStmt { expr: ident }, Span::default());
        let root = b.push(NodeKind::Root { decls: vec![stmt] }, Span::default());
        let unit = b.finish(root).unwrap();

        assert_eq!(unit.parent(ident), Some(stmt));
        assert_eq!(unit.parent(stmt), Some(root));
        assert_eq!(unit.parent(root), None);
        assert_eq!(unit.ancestors(ident).collect::<Vec<_>>(), vec![stmt, root]);
    }

    #[test]
    fn test_finish_rejects_shared_child() {
        let mut b = UnitBuilder::new("a.go", "go", "");
        let ident = b.push(
            NodeKind::Identifier {
                name: "x".to_string(),
            },
            Span::default(),
        );
        let s1 = b.push(NodeKind::ExprStmt { expr: ident }, Span::default());
        let s2 = b.push(NodeKind::ExprStmt { expr: ident }, Span::default());
        let root = b.push(NodeKind::Root { decls: vec![s1, s2] }, Span::default());
        assert!(matches!(
            b.finish(root),
            Err(NormalizeError::MalformedTree(_))
        ));
    }

    #[test]
    fn test_finish_rejects_missing_child() {
        let mut b = UnitBuilder::new("a.go", "go", "");
        let root = b.push(
            NodeKind::Root {
                decls: vec![NodeId(7)],
            },
            Span::default(),
        );
        assert!(b.finish(root).is_err());
    }

    #[test]
    fn test_finish_rejects_cycle() {
        let mut b = UnitBuilder::new("a.go", "go", "");
        // #0 -> #1 -> #0, root #2 -> #0
        b.push(
            NodeKind::ExprStmt { expr: NodeId(1) },
            Span::default(),
        );
        b.push(
            NodeKind::ExprStmt { expr: NodeId(0) },
            Span::default(),
        );
        let root = b.push(
            NodeKind::Root {
                decls: vec![NodeId(0)],
            },
            Span::default(),
        );
        assert!(b.finish(root).is_err());
    }
}
