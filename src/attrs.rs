//! Attribute compiler.
//!
//! A raw attribute map compiles to a closure that builds a brand-new [`AttrMap`]
//! on every call. Values may be literals, `$` expressions, attribute-level
//! `if`/`then`/`else` objects, nested maps or arrays, recursively.

use log::warn;
use serde_json::{Map, Value};
use std::rc::Rc;

use crate::backend::AttrMap;
use crate::compiler::CompileEnv;
use crate::context::{EvalContext, EvalFn};
use crate::error::SchemaError;
use crate::expr::truthy;
use crate::schema::{is_conditional_object, KEY_ELSE, KEY_IF, KEY_THEN};
use crate::scope::ScopePath;

pub type AttrsFn = Rc<dyn Fn(&mut EvalContext) -> Option<AttrMap>>;

enum CompiledAttr {
    Literal(Value),
    Dynamic(EvalFn),
    Conditional {
        condition: EvalFn,
        then: Box<CompiledAttr>,
        otherwise: Option<Box<CompiledAttr>>,
    },
    Map(Vec<(String, CompiledAttr)>),
    List(Vec<CompiledAttr>),
}

impl CompiledAttr {
    /// `None` means the attribute is left out of the produced map.
    fn eval(&self, ctx: &mut EvalContext) -> Option<Value> {
        match self {
            CompiledAttr::Literal(value) => Some(value.clone()),
            CompiledAttr::Dynamic(expr) => Some(expr(ctx)),
            CompiledAttr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if truthy(&condition(ctx)) {
                    then.eval(ctx)
                } else {
                    otherwise.as_ref().and_then(|branch| branch.eval(ctx))
                }
            }
            CompiledAttr::Map(entries) => Some(Value::Object(eval_entries(entries, ctx))),
            CompiledAttr::List(items) => Some(Value::Array(
                items.iter().filter_map(|item| item.eval(ctx)).collect(),
            )),
        }
    }
}

fn eval_entries(entries: &[(String, CompiledAttr)], ctx: &mut EvalContext) -> AttrMap {
    let mut out = AttrMap::new();
    for (name, attr) in entries {
        if let Some(value) = attr.eval(ctx) {
            out.insert(name.clone(), value);
        }
    }
    out
}

fn no_attrs() -> AttrsFn {
    Rc::new(|_: &mut EvalContext| None)
}

impl CompileEnv {
    pub(crate) fn compile_attrs(
        &self,
        path: &ScopePath,
        raw: Option<&Value>,
    ) -> Result<AttrsFn, SchemaError> {
        let Some(raw) = raw else {
            return Ok(no_attrs());
        };
        match raw {
            Value::Null => Ok(no_attrs()),
            // A conditional at the root yields whichever branch map is selected.
            Value::Object(map) if is_conditional_object(map) => {
                let selected = self.compile_attr_value(path, raw)?;
                Ok(Rc::new(move |ctx: &mut EvalContext| match selected.eval(ctx) {
                    Some(Value::Object(map)) => Some(map),
                    _ => None,
                }))
            }
            Value::Object(map) => {
                let entries = self.compile_attr_entries(path, map)?;
                Ok(Rc::new(move |ctx: &mut EvalContext| {
                    Some(eval_entries(&entries, ctx))
                }))
            }
            other => {
                warn!("[SchemaNative] ignoring non-object attributes: {}", other);
                Ok(no_attrs())
            }
        }
    }

    fn compile_attr_entries(
        &self,
        path: &ScopePath,
        map: &Map<String, Value>,
    ) -> Result<Vec<(String, CompiledAttr)>, SchemaError> {
        map.iter()
            .map(|(name, value)| Ok((name.clone(), self.compile_attr_value(path, value)?)))
            .collect()
    }

    fn compile_attr_value(&self, path: &ScopePath, raw: &Value) -> Result<CompiledAttr, SchemaError> {
        Ok(match raw {
            Value::String(source) if self.options.is_dynamic(source) => {
                CompiledAttr::Dynamic(self.compile_expression(path, source)?)
            }
            Value::Object(map) if is_conditional_object(map) => CompiledAttr::Conditional {
                condition: self.compile_condition(path, &map[KEY_IF])?,
                then: Box::new(self.compile_attr_value(path, &map[KEY_THEN])?),
                otherwise: match map.get(KEY_ELSE) {
                    Some(branch) => Some(Box::new(self.compile_attr_value(path, branch)?)),
                    None => None,
                },
            },
            Value::Object(map) => CompiledAttr::Map(self.compile_attr_entries(path, map)?),
            Value::Array(items) => CompiledAttr::List(
                items
                    .iter()
                    .map(|item| self.compile_attr_value(path, item))
                    .collect::<Result<_, _>>()?,
            ),
            literal => CompiledAttr::Literal(literal.clone()),
        })
    }
}
