//! Syntax normalization and fact extraction.
//!
//! This module turns source files into a language-independent tree and then
//! into flat "facts" the rules consume:
//! - Calls, resolved against a table of known library entry points
//! - Struct/record constructions and their field values
//! - Definitions (assignments) and branch conditions
//! - A control-flow graph per function, with dominators
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ Source Files    │────▶│ Front-ends   │────▶│ SourceUnit    │
//! └─────────────────┘     │ (Go)         │     │ (node arena)  │
//!                         └──────────────┘     └───────────────┘
//!                                                      │
//!                                                      ▼
//!                         ┌──────────────┐     ┌───────────────┐
//!                         │ Rules        │◀────│ UnitFacts     │
//!                         │              │     │ (+FlowGraphs) │
//!                         └──────────────┘     └───────────────┘
//! ```
//!
//! # Adding a New Language
//!
//! 1. Create a new module in `src/analysis/languages/`
//! 2. Implement the `SyntaxAdapter` trait, lowering into `UnitBuilder`
//! 3. Register the front-end in `languages/mod.rs`
//!
//! See `languages/go.rs` for a reference implementation.

mod apis;
mod builder;
mod cfg;
mod extract;
mod facts;
mod languages;
mod syntax;
mod traits;

pub use apis::{ApiOverrides, CorsShape, KnownApis, LimiterEntry, Pattern};
pub use builder::UnitBuilder;
pub use cfg::{FlowEdge, FlowGraph, FlowNode};
pub use extract::{access_path, qualify_type, resolve_callee, value_fact, FactExtractor};
pub use facts::{
    AccessPath, ArgFact, BranchFact, CallFact, ConstructFact, DefinitionFact, FactKind,
    FieldValueFact, FunctionFacts, FunctionId, PathSegment, UnitFacts, ValueFact,
};
#[cfg(feature = "tree-sitter")]
pub use languages::GoAdapter;
pub use languages::{adapter_for_extension, registered_extensions};
pub use syntax::{
    default_package_name, AssignOp, Element, ImportBinding, ImportKind, JumpKind, LiteralValue,
    Node, NodeId, NodeKind, Position, SourceUnit, Span, SwitchKind,
};
pub use traits::{NormalizeError, SyntaxAdapter};
