use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_EXPRESSION_SYNTAX: &str = "S-ERR-EXPR-001";
pub const ERR_JSON: &str = "S-ERR-JSON-001";
pub const ERR_OPTIONS: &str = "S-ERR-OPTIONS-001";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_EXPRESSION_SYNTAX => {
            "Every dynamic value in a schema compiles to an expression before the first render."
        }
        ERR_JSON => "Schema, data and options inputs are well-formed JSON.",
        ERR_OPTIONS => "Compile options are validated before any schema is compiled.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Raised by an [`ExpressionCompiler`](crate::expr::ExpressionCompiler) when the
/// source text does not parse.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset} in `{source_text}`")]
pub struct ExpressionError {
    pub source_text: String,
    pub message: String,
    pub offset: usize,
}

impl ExpressionError {
    pub fn new(source_text: &str, message: impl Into<String>, offset: usize) -> Self {
        Self {
            source_text: source_text.to_string(),
            message: message.into(),
            offset,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors surfaced by schema compilation.
///
/// Malformed schema nodes are not errors: they compile to nothing. Only
/// expression syntax failures and unreadable inputs reach the caller.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid compile options: {0}")]
    Options(String),
}

impl SchemaError {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::Expression(_) => ERR_EXPRESSION_SYNTAX,
            SchemaError::Json(_) => ERR_JSON,
            SchemaError::Options(_) => ERR_OPTIONS,
        }
    }

    pub fn guarantee(&self) -> &'static str {
        get_guarantee(self.code())
    }
}
