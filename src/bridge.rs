#[cfg(feature = "napi")]
use napi_derive::napi;
use serde_json::Value;

use crate::backend::ComponentLibrary;
use crate::compiler::SchemaCompiler;
use crate::error::SchemaError;
use crate::options::CompileOptions;
use crate::reactive::Reactive;
use crate::view::SchemaView;

/// One-shot render of JSON text inputs into the serialized [`crate::Rendered`] tree.
pub fn render_schema_json(
    schema_json: &str,
    data_json: &str,
    options_json: Option<&str>,
) -> Result<Value, SchemaError> {
    let schema: Value = serde_json::from_str(schema_json)?;
    let data: Value = serde_json::from_str(data_json)?;
    let options = match options_json {
        Some(json) => CompileOptions::from_json(json)?,
        None => CompileOptions::default(),
    };
    let compiler = SchemaCompiler::with_options(Reactive::new(data), ComponentLibrary::new(), options)?;
    let view = SchemaView::with_compiler(&schema, compiler)?;
    Ok(serde_json::to_value(view.output())?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn render_schema_native(
    schema_json: String,
    data_json: String,
    options_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    render_schema_json(&schema_json, &data_json, options_json.as_deref())
        .map_err(|e| napi::Error::from_reason(format!("[{}] {}", e.code(), e)))
}
