//! Schema compiler.
//!
//! One top-down pass over the schema. Every node gets a fresh scope identifier
//! appended to its parent's path, and compiles to a render closure. Data changes
//! never recompile; they re-run the closures.

use log::debug;
use serde_json::Value;
use std::rc::Rc;

use crate::backend::{ComponentLibrary, RenderBackend, Rendered, TreeBackend};
use crate::context::{EvalContext, EvalFn};
use crate::error::SchemaError;
use crate::expr::{BasicExpressionCompiler, ExpressionCompiler};
use crate::options::CompileOptions;
use crate::reactive::Reactive;
use crate::scope::{Resolver, ScopePath, ScopeStore};

/// Closure producing the current output of a compiled node or node list.
pub type RenderFn = Rc<dyn Fn(&mut EvalContext) -> Rendered>;

/// Everything the per-node compilers share during one pass.
#[derive(Clone)]
pub(crate) struct CompileEnv {
    pub(crate) options: CompileOptions,
    pub(crate) expressions: Rc<dyn ExpressionCompiler>,
    pub(crate) resolver: Resolver,
    pub(crate) backend: Rc<dyn RenderBackend>,
    pub(crate) library: Rc<ComponentLibrary>,
}

impl CompileEnv {
    /// Compile an expression whose tokens resolve against `path`.
    pub(crate) fn compile_expression(
        &self,
        path: &ScopePath,
        source: &str,
    ) -> Result<EvalFn, SchemaError> {
        let compiled = self.expressions.compile(source)?;
        let resolver = &self.resolver;
        Ok(compiled.provide(&mut |token: &str| resolver.token_getter(path, token)))
    }

    /// Sigil strings compile as expressions; anything else, sigil-less strings
    /// included, is a constant judged by truthiness.
    pub(crate) fn compile_condition(
        &self,
        path: &ScopePath,
        raw: &Value,
    ) -> Result<EvalFn, SchemaError> {
        match raw {
            Value::String(source) if self.options.is_dynamic(source) => {
                self.compile_expression(path, source)
            }
            constant => {
                let constant = constant.clone();
                Ok(Rc::new(move |_: &mut EvalContext| constant.clone()))
            }
        }
    }

    /// Arrays compile to a list closure, anything else to a single node.
    pub(crate) fn compile_schema(
        &self,
        raw: &Value,
        parent: &ScopePath,
    ) -> Result<RenderFn, SchemaError> {
        match raw {
            Value::Array(items) => self.compile_list(items, parent),
            node => self.compile_node(node, parent.child()),
        }
    }

    pub(crate) fn compile_list(
        &self,
        items: &[Value],
        parent: &ScopePath,
    ) -> Result<RenderFn, SchemaError> {
        let nodes = items
            .iter()
            .map(|item| self.compile_schema(item, parent))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rc::new(move |ctx: &mut EvalContext| {
            Rendered::List(nodes.iter().map(|node| node(ctx)).collect())
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles schemas against one data root, component library and scope store.
#[derive(Clone)]
pub struct SchemaCompiler {
    env: CompileEnv,
}

impl SchemaCompiler {
    /// Default options, [`TreeBackend`] and [`BasicExpressionCompiler`].
    pub fn new(data: Reactive, library: ComponentLibrary) -> Self {
        let options = CompileOptions::default();
        let expressions = Rc::new(BasicExpressionCompiler::with_sigil(options.sigil));
        Self::from_env(CompileEnv {
            options,
            expressions,
            resolver: Resolver::new(ScopeStore::new(), data),
            backend: Rc::new(TreeBackend),
            library: Rc::new(library),
        })
    }

    pub fn with_parts(
        data: Reactive,
        library: ComponentLibrary,
        options: CompileOptions,
        backend: Rc<dyn RenderBackend>,
        expressions: Rc<dyn ExpressionCompiler>,
    ) -> Result<Self, SchemaError> {
        options.validate()?;
        Ok(Self::from_env(CompileEnv {
            options,
            expressions,
            resolver: Resolver::new(ScopeStore::new(), data),
            backend,
            library: Rc::new(library),
        }))
    }

    /// Default backend and expression compiler with custom options.
    pub fn with_options(
        data: Reactive,
        library: ComponentLibrary,
        options: CompileOptions,
    ) -> Result<Self, SchemaError> {
        let expressions = Rc::new(BasicExpressionCompiler::with_sigil(options.sigil));
        Self::with_parts(data, library, options, Rc::new(TreeBackend), expressions)
    }

    fn from_env(env: CompileEnv) -> Self {
        Self { env }
    }

    /// Compile `schema` below the root scope.
    pub fn compile(&self, schema: &Value) -> Result<RenderFn, SchemaError> {
        self.compile_at(schema, &ScopePath::root())
    }

    pub fn compile_at(&self, schema: &Value, parent: &ScopePath) -> Result<RenderFn, SchemaError> {
        let render = self.env.compile_schema(schema, parent)?;
        debug!(
            "[SchemaNative] compiled schema, {} scope(s) carry bindings",
            self.env.resolver.store().len()
        );
        Ok(render)
    }

    /// Same configuration over an empty scope store and a cleared expression cache.
    /// Closures compiled earlier keep the old store.
    pub fn with_fresh_scopes(&self) -> Self {
        self.env.expressions.clear_cache();
        let mut env = self.env.clone();
        env.resolver = Resolver::new(ScopeStore::new(), self.env.resolver.data().clone());
        Self::from_env(env)
    }

    pub fn scopes(&self) -> &ScopeStore {
        self.env.resolver.store()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.env.resolver
    }

    pub fn data(&self) -> &Reactive {
        self.env.resolver.data()
    }

    pub fn options(&self) -> &CompileOptions {
        &self.env.options
    }

    #[cfg(test)]
    pub(crate) fn env_for_tests(&self) -> &CompileEnv {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_compiles_to_list() {
        let compiler = SchemaCompiler::new(Reactive::default(), ComponentLibrary::new());
        let render = compiler.compile(&json!(["a", "b"])).unwrap();
        let out = render(&mut EvalContext::new());
        assert_eq!(
            out,
            Rendered::List(vec![
                Rendered::Text("a".to_string()),
                Rendered::Text("b".to_string())
            ])
        );
    }

    #[test]
    fn test_expression_errors_propagate() {
        let compiler = SchemaCompiler::new(Reactive::default(), ComponentLibrary::new());
        let err = compiler
            .compile(&json!({ "$el": "p", "children": "$a +" }))
            .err()
            .unwrap();
        assert_eq!(err.code(), crate::error::ERR_EXPRESSION_SYNTAX);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = CompileOptions {
            sigil: 'x',
            ..CompileOptions::default()
        };
        assert!(
            SchemaCompiler::with_options(Reactive::default(), ComponentLibrary::new(), options)
                .is_err()
        );
    }

    #[test]
    fn test_fresh_scopes_clear_expression_cache() {
        let expressions = Rc::new(BasicExpressionCompiler::new());
        let compiler = SchemaCompiler::with_parts(
            Reactive::new(json!({ "a": 1 })),
            ComponentLibrary::new(),
            CompileOptions::default(),
            Rc::new(TreeBackend),
            expressions.clone(),
        )
        .unwrap();
        let render = compiler.compile(&json!({ "$el": "p", "children": "$a" })).unwrap();
        assert_eq!(expressions.cached(), 1);

        let fresh = compiler.with_fresh_scopes();
        assert_eq!(expressions.cached(), 0);
        assert_eq!(render(&mut EvalContext::new()).text_content(), "1");
        fresh.compile(&json!({ "$el": "p", "children": "$a" })).unwrap();
        assert_eq!(expressions.cached(), 1);
    }
}
