#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns raw unit outputs into comparable values.

use crate::{
    constants::NO_OUTPUT_TYPE,
    literal::{self, Value, round2},
};

/// An answer before canonicalization.
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// Text as produced by the kernel.
    Text(String),
    /// A value that is already structured and is used as is.
    Structured(Value),
}

impl From<&str> for RawOutput {
    fn from(text: &str) -> Self {
        RawOutput::Text(text.to_string())
    }
}

impl From<String> for RawOutput {
    fn from(text: String) -> Self {
        RawOutput::Text(text)
    }
}

impl From<Value> for RawOutput {
    fn from(value: Value) -> Self {
        RawOutput::Structured(value)
    }
}

impl From<Option<&str>> for RawOutput {
    /// A unit without a result behaves like the literal `None`.
    fn from(text: Option<&str>) -> Self {
        match text {
            Some(text) => RawOutput::from(text),
            None => RawOutput::Structured(Value::None),
        }
    }
}

/// Canonicalizes an answer.
///
/// Text is parsed as a literal; text that is not a literal becomes an opaque
/// [`Value::Str`] holding the text verbatim. With `round_floats`, a float, or
/// the floats directly inside a list or tuple, are rounded to two decimals.
/// Structured input is returned unchanged.
pub fn canonicalize(raw: impl Into<RawOutput>, round_floats: bool) -> Value {
    let text = match raw.into() {
        RawOutput::Structured(value) => return value,
        RawOutput::Text(text) => text,
    };

    let Some(parsed) = literal::parse(&text) else {
        return Value::Str(text);
    };

    let round = |value: Value| match value {
        Value::Float(f) if round_floats => Value::Float(round2(f)),
        other => other,
    };

    match parsed {
        Value::Float(_) => round(parsed),
        Value::List(items) => Value::List(items.into_iter().map(round).collect()),
        Value::Tuple(items) => Value::Tuple(items.into_iter().map(round).collect()),
        other => other,
    }
}

/// Type name of the literal an output parses to, or `none`.
pub fn output_type_name(raw: Option<&str>) -> String {
    raw.and_then(literal::parse)
        .map(|value| value.type_name().to_string())
        .unwrap_or_else(|| NO_OUTPUT_TYPE.to_string())
}
