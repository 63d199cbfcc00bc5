//! Loop compilation.
//!
//! A loop evaluates its collection, then for each entry pushes a frame binding the
//! value name (and key name, when declared), runs the body once and pops the
//! frame before moving on.

use log::{trace, warn};
use serde_json::Value;
use std::rc::Rc;

use crate::backend::Rendered;
use crate::compiler::{CompileEnv, RenderFn};
use crate::context::{EvalContext, EvalFn, Frame};
use crate::error::SchemaError;
use crate::schema::LoopDescriptor;
use crate::scope::ScopePath;

pub(crate) struct CompiledLoop {
    value_name: String,
    key_name: Option<String>,
    values: EvalFn,
    limit: Option<usize>,
}

/// Largest numeric count a loop accepts. Larger counts iterate nothing.
pub const MAX_NUMERIC_COUNT: usize = 1 << 20;

/// `(key, value)` pairs to iterate. Numbers count from zero; arrays and objects
/// enumerate their own entries; anything else yields nothing.
pub fn iteration_entries(values: &Value, limit: Option<usize>) -> Vec<(Value, Value)> {
    let limit = limit.unwrap_or(usize::MAX);
    match values {
        Value::Number(n) => {
            let count = n.as_f64().filter(|f| f.is_finite() && *f > 0.0).unwrap_or(0.0);
            if count.floor() > MAX_NUMERIC_COUNT as f64 {
                warn!("[SchemaNative] loop count {} is out of range, rendering nothing", n);
                return Vec::new();
            }
            let count = (count.floor() as usize).min(limit);
            (0..count)
                .map(|i| (Value::from(i), Value::from(i)))
                .collect()
        }
        Value::Array(items) => items
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, item)| (Value::from(i), item.clone()))
            .collect(),
        Value::Object(map) => map
            .iter()
            .take(limit)
            .map(|(key, item)| (Value::String(key.clone()), item.clone()))
            .collect(),
        other => {
            trace!("[SchemaNative] loop over non-iterable value {}", other);
            Vec::new()
        }
    }
}

impl CompileEnv {
    pub(crate) fn compile_loop(
        &self,
        path: &ScopePath,
        descriptor: &LoopDescriptor,
    ) -> Result<CompiledLoop, SchemaError> {
        let values = match &descriptor.values {
            Value::String(source) if self.options.is_dynamic(source) => {
                self.compile_expression(path, source)?
            }
            literal => {
                let literal = literal.clone();
                Rc::new(move |_: &mut EvalContext| literal.clone()) as EvalFn
            }
        };
        Ok(CompiledLoop {
            value_name: descriptor.value_name.clone(),
            key_name: descriptor.key_name.clone(),
            values,
            limit: self.options.loop_limit,
        })
    }
}

impl CompiledLoop {
    /// Repeat `body` once per entry.
    pub(crate) fn wrap(self, body: RenderFn) -> RenderFn {
        Rc::new(move |ctx: &mut EvalContext| {
            let values = (self.values)(ctx);
            let entries = iteration_entries(&values, self.limit);
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let mut frame = Frame::new();
                frame.insert(self.value_name.clone(), value);
                if let Some(key_name) = &self.key_name {
                    frame.insert(key_name.clone(), key);
                }
                out.push(ctx.with_frame(frame, |ctx| body(ctx)));
            }
            Rendered::List(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_count_is_zero_based() {
        let entries = iteration_entries(&json!(3), None);
        let values: Vec<_> = entries.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![json!(0), json!(1), json!(2)]);
        assert!(iteration_entries(&json!(-2), None).is_empty());
        assert_eq!(iteration_entries(&json!(2.9), None).len(), 2);
    }

    #[test]
    fn test_object_keys_in_insertion_order() {
        let entries = iteration_entries(&json!({ "b": 1, "a": 2 }), None);
        assert_eq!(
            entries,
            vec![(json!("b"), json!(1)), (json!("a"), json!(2))]
        );
    }

    #[test]
    fn test_scalars_iterate_nothing() {
        assert!(iteration_entries(&json!("abc"), None).is_empty());
        assert!(iteration_entries(&json!(true), None).is_empty());
        assert!(iteration_entries(&json!(null), None).is_empty());
    }

    #[test]
    fn test_out_of_range_count_iterates_nothing() {
        assert!(iteration_entries(&json!(1e20), None).is_empty());
        assert!(iteration_entries(&json!(u64::MAX), Some(3)).is_empty());
        assert!(iteration_entries(&json!(MAX_NUMERIC_COUNT + 1), None).is_empty());
        assert_eq!(iteration_entries(&json!(MAX_NUMERIC_COUNT), Some(4)).len(), 4);
    }

    #[test]
    fn test_limit_caps_entries() {
        assert_eq!(iteration_entries(&json!(1000), Some(5)).len(), 5);
        assert_eq!(iteration_entries(&json!([1, 2, 3]), Some(2)).len(), 2);
    }
}
