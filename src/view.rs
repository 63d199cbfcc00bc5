//! Live view over a compiled schema.
//!
//! Holds the render closure inside an [`Effect`] so that data mutations mark the
//! output stale and [`SchemaView::update`] re-renders only when something the last
//! render read has changed. Replacing the schema recompiles only when its
//! fingerprint differs.

use log::{debug, info};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::rc::Rc;

use crate::backend::{ComponentLibrary, RenderBackend, Rendered};
use crate::compiler::{RenderFn, SchemaCompiler};
use crate::error::SchemaError;
use crate::expr::ExpressionCompiler;
use crate::options::CompileOptions;
use crate::reactive::{Effect, Reactive};

/// SHA-256 hex digest of the schema's canonical JSON text.
pub fn fingerprint(schema: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn mount(data: &Reactive, render: RenderFn) -> Effect<Rendered> {
    Effect::new(data, move |ctx| render(ctx))
}

pub struct SchemaView {
    compiler: SchemaCompiler,
    effect: Effect<Rendered>,
    fingerprint: String,
    renders: u64,
}

impl SchemaView {
    pub fn new(schema: &Value, data: Reactive, library: ComponentLibrary) -> Result<Self, SchemaError> {
        Self::with_compiler(schema, SchemaCompiler::new(data, library))
    }

    pub fn with_options(
        schema: &Value,
        data: Reactive,
        library: ComponentLibrary,
        options: CompileOptions,
        backend: Rc<dyn RenderBackend>,
        expressions: Rc<dyn ExpressionCompiler>,
    ) -> Result<Self, SchemaError> {
        let compiler = SchemaCompiler::with_parts(data, library, options, backend, expressions)?;
        Self::with_compiler(schema, compiler)
    }

    /// Compile `schema` with a preconfigured compiler and render it once.
    pub fn with_compiler(schema: &Value, compiler: SchemaCompiler) -> Result<Self, SchemaError> {
        let render = compiler.compile(schema)?;
        let effect = mount(compiler.data(), render);
        Ok(Self {
            compiler,
            effect,
            fingerprint: fingerprint(schema),
            renders: 1,
        })
    }

    pub fn output(&self) -> &Rendered {
        self.effect.output()
    }

    /// Re-render if a mutation touched anything the last render read.
    /// Returns the new output, or `None` when nothing was stale.
    pub fn update(&mut self) -> Option<&Rendered> {
        if !self.effect.flush() {
            return None;
        }
        self.renders += 1;
        debug!("[SchemaNative] view re-rendered (render #{})", self.renders);
        Some(self.effect.output())
    }

    /// Swap in a new schema. An identical schema is a no-op and returns false.
    pub fn set_schema(&mut self, schema: &Value) -> Result<bool, SchemaError> {
        let next = fingerprint(schema);
        if next == self.fingerprint {
            return Ok(false);
        }
        let compiler = self.compiler.with_fresh_scopes();
        let render = compiler.compile(schema)?;
        self.effect = mount(compiler.data(), render);
        self.compiler = compiler;
        self.fingerprint = next;
        self.renders += 1;
        info!("[SchemaNative] schema replaced, recompiled");
        Ok(true)
    }

    pub fn data(&self) -> &Reactive {
        self.compiler.data()
    }

    pub fn compiler(&self) -> &SchemaCompiler {
        &self.compiler
    }

    /// Total renders, including the initial one and each recompilation.
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
