use crate::error::CliResult;
use serde::Serialize;
use serde_json::Value;

/// What a subcommand leaves on stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Pretty-printed JSON, serialized straight from the result so struct
    /// field order is kept.
    Json(String),
    Text(String),
    Empty,
}

impl Output {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> CliResult<Self> {
        Ok(Output::Json(serde_json::to_string_pretty(value)?))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Output::Text(text.into())
    }

    /// The text to print, or `None` when there is nothing to print.
    pub fn render(&self) -> Option<&str> {
        match self {
            Output::Json(text) | Output::Text(text) => Some(text),
            Output::Empty => None,
        }
    }

    /// Parses JSON output back into a value; `None` for text or empty output.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Output::Json(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }
}
