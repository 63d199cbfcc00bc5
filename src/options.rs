use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Knobs for a schema compilation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Prefix marking a string value as a dynamic expression.
    pub sigil: char,
    /// Log a warning for every schema node that compiles to nothing.
    pub warn_on_invalid: bool,
    /// Upper bound on iterations rendered by a single loop.
    pub loop_limit: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            sigil: '$',
            warn_on_invalid: true,
            loop_limit: None,
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let options: CompileOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.sigil.is_alphanumeric() || self.sigil.is_whitespace() || self.sigil == '_' {
            return Err(SchemaError::Options(format!(
                "sigil '{}' would be ambiguous with identifiers",
                self.sigil
            )));
        }
        Ok(())
    }

    /// True when `value` starts with the sigil and has something after it.
    /// A lone sigil stays literal.
    pub fn is_dynamic(&self, value: &str) -> bool {
        let mut chars = value.chars();
        chars.next() == Some(self.sigil) && chars.next().is_some()
    }
}
