use crate::compiler::{CompileEnv, RenderFn};
use crate::context::EvalFn;
use crate::error::SchemaError;
use crate::schema::ConditionalNode;
use crate::scope::ScopePath;

/// Condition plus both branches of an `if`/`then`/`else` node.
pub(crate) struct CompiledConditional {
    pub(crate) condition: EvalFn,
    pub(crate) then: RenderFn,
    pub(crate) otherwise: Option<RenderFn>,
}

impl CompileEnv {
    /// Branches compile beneath the conditional's own scope path.
    pub(crate) fn compile_conditional(
        &self,
        path: &ScopePath,
        node: &ConditionalNode,
    ) -> Result<CompiledConditional, SchemaError> {
        Ok(CompiledConditional {
            condition: self.compile_condition(path, &node.condition)?,
            then: self.compile_schema(&node.then, path)?,
            otherwise: node
                .otherwise
                .as_ref()
                .map(|branch| self.compile_schema(branch, path))
                .transpose()?,
        })
    }
}
