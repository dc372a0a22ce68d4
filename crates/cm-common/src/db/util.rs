use serde_json::Value;

/// Parse a JSON column holding an array of strings (e.g. skills). Anything
/// that is not an array of strings maps to an empty list rather than an error,
/// matching how the upstream tables treat the column.
pub fn parse_string_array(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    }
}
