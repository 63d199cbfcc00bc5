//! # Schema Compiler Ground Truth
//!
//! Compiles a JSON view schema once into a tree of render closures. Data changes
//! re-run the closures; they never recompile.
//!
//! ## Evaluation Invariants
//!
//! 1. **Single Pass**: every schema node is visited once per compilation and gets a
//!    fresh scope identifier appended to its parent's scope path.
//!
//! 2. **Scope Isolation**: `let` bindings are visible to the node that declares them
//!    and everything beneath it, never to siblings. The nearest binding wins.
//!
//! 3. **Lookup Order**: a token resolves against
//!    1. Active iteration frames (innermost first)
//!    2. Scopes on the node's path (innermost first)
//!    3. The data root
//!
//!    Only data-root reads are tracked as dependencies.
//!
//! 4. **Balanced Frames**: each loop iteration pushes exactly one frame and pops it
//!    before the next iteration, whatever the body renders.
//!
//! 5. **Last Known Value**: a token that stops resolving keeps its previous value.
//!    A token that never resolved evaluates to `null`.
//!
//! 6. **Fresh Attributes**: every render builds a new attribute map.
//!
//! 7. **Malformed Nodes Render Nothing**: they are logged and skipped. Only
//!    expression syntax errors and unreadable inputs fail a compilation.

mod attrs;
mod backend;
mod bridge;
mod compiler;
mod conditional;
mod context;
mod error;
mod expr;
mod iteration;
mod node;
mod options;
mod reactive;
mod schema;
mod scope;
mod view;

#[cfg(test)]
mod render_tests;

pub use attrs::AttrsFn;
pub use backend::{
    AttrMap, ComponentLibrary, ComponentOrigin, ComponentRef, NodeTarget, RenderBackend, Rendered,
    RenderedNode, TreeBackend,
};
pub use bridge::render_schema_json;
#[cfg(feature = "napi")]
pub use bridge::render_schema_native;
pub use compiler::{RenderFn, SchemaCompiler};
pub use context::{EvalContext, EvalFn, Frame};
pub use error::{ExpressionError, SchemaError, ERR_EXPRESSION_SYNTAX, ERR_JSON, ERR_OPTIONS};
pub use expr::{
    display_string, parse_expression, truthy, BasicExpressionCompiler, BinaryOp, CompiledExpression,
    Expr, ExpressionCompiler, UnaryOp,
};
pub use iteration::{iteration_entries, MAX_NUMERIC_COUNT};
pub use options::CompileOptions;
pub use reactive::{DependencySet, Effect, Observable, Reactive};
pub use schema::{Children, LoopDescriptor, SchemaNode};
pub use scope::{find_value, Resolver, ScopeId, ScopePath, ScopeStore};
pub use view::{fingerprint, SchemaView};
