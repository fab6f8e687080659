//! Turns a tool call's raw argument text into a structured object.
//!
//! Models occasionally emit raw line breaks inside JSON string values,
//! which strict parsing rejects. A single repair pass escapes them.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Both parse attempts failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid tool arguments: {first}; after repair: {second}")]
pub struct ArgumentParseError {
    /// The argument text as the model produced it
    pub raw: String,
    /// Why the strict parse failed
    pub first: String,
    /// Why the repaired parse failed
    pub second: String,
}

/// Resolved tool arguments. Always a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl TryFrom<Value> for ToolArguments {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(format!("expected a JSON object, got {}", json_type(&other))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_object(text: &str) -> Result<ToolArguments, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    ToolArguments::try_from(value)
}

/// Normalize line endings to `\n`, then escape every `\n` as the two
/// characters backslash and `n`.
///
/// Line breaks between tokens are escaped too, so text that is both
/// pretty-printed and carries a raw line break inside a string stays
/// unparseable.
pub fn repair(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\\n")
}

/// Parse the argument text of one tool call.
///
/// Tries a strict parse, then one repaired parse. Empty text means the
/// tool takes no arguments and resolves to an empty object.
pub fn resolve_arguments(raw: &str) -> Result<ToolArguments, ArgumentParseError> {
    if raw.trim().is_empty() {
        return Ok(ToolArguments::default());
    }

    let first = match parse_object(raw) {
        Ok(args) => return Ok(args),
        Err(e) => e,
    };

    let repaired = repair(raw);
    match parse_object(&repaired) {
        Ok(args) => {
            tracing::debug!("Tool arguments parsed after escaping line breaks");
            Ok(args)
        }
        Err(second) => Err(ArgumentParseError {
            raw: raw.to_string(),
            first,
            second,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_object_parses() {
        let args = resolve_arguments(r#"{"path":"/etc/hosts","lines":10}"#).unwrap();
        assert_eq!(args.get("path"), Some(&Value::String("/etc/hosts".into())));
        assert_eq!(args.get("lines"), Some(&Value::from(10)));
    }

    #[test]
    fn raw_newline_in_string_is_repaired() {
        let raw = "{\"content\":\"line one\nline two\"}";
        assert!(serde_json::from_str::<Value>(raw).is_err());

        let args = resolve_arguments(raw).unwrap();
        assert_eq!(args.get("content"), Some(&Value::String("line one\nline two".into())));
    }

    #[test]
    fn carriage_returns_are_normalized_before_escaping() {
        let raw = "{\"content\":\"a\r\nb\rc\"}";
        let args = resolve_arguments(raw).unwrap();
        assert_eq!(args.get("content"), Some(&Value::String("a\nb\nc".into())));
    }

    #[test]
    fn repair_escapes_every_line_break() {
        assert_eq!(repair("a\r\nb\rc\nd"), "a\\nb\\nc\\nd");
    }

    #[test]
    fn empty_text_is_an_empty_object() {
        assert!(resolve_arguments("").unwrap().is_empty());
        assert!(resolve_arguments("  \n").unwrap().is_empty());
    }

    #[test]
    fn unrepairable_text_reports_both_attempts() {
        let err = resolve_arguments("{\"path\": ").unwrap_err();
        assert_eq!(err.raw, "{\"path\": ");
        assert!(!err.first.is_empty());
        assert!(!err.second.is_empty());
    }

    #[test]
    fn non_object_json_is_rejected() {
        let err = resolve_arguments("[1, 2, 3]").unwrap_err();
        assert!(err.first.contains("an array"), "{}", err.first);

        let err = resolve_arguments("\"just a string\"").unwrap_err();
        assert!(err.second.contains("a string"), "{}", err.second);
    }

    #[test]
    fn pretty_printed_text_with_raw_line_break_in_a_string_fails_both_attempts() {
        let raw = "{\n  \"text\": \"line one\nline two\"\n}";
        let err = resolve_arguments(raw).unwrap_err();
        assert_eq!(err.raw, raw);
        assert!(!err.first.is_empty());
        assert!(!err.second.is_empty());

        // Pretty-printing alone is fine: the strict parse accepts it.
        let args = resolve_arguments("{\n  \"text\": \"one line\"\n}").unwrap();
        assert_eq!(args.get("text"), Some(&Value::from("one line")));
    }

    #[test]
    fn serializes_as_plain_object() {
        let args = resolve_arguments(r#"{"q":"rust"}"#).unwrap();
        assert_eq!(serde_json::to_string(&args).unwrap(), r#"{"q":"rust"}"#);
    }
}
