//! Mapping from SQL result values and configured names to Prometheus ones.

use crate::source::Value;

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`. Invalid
/// characters become underscores, runs of underscores collapse to one, and a
/// leading digit gets an underscore prefix.
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(
        name,
        |c| c.is_ascii_alphanumeric() || c == '_' || c == ':',
        true,
        "unnamed",
    )
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*`; names starting with `__`
/// are reserved and get a `z` prefix.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = sanitize(name, |c| c.is_ascii_alphanumeric() || c == '_', false, "label");
    if result.starts_with("__") {
        result.insert(0, 'z');
    }
    result
}

fn sanitize(name: &str, valid: impl Fn(char) -> bool, collapse: bool, fallback: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);

    for c in name.trim().chars() {
        if result.is_empty() && c.is_ascii_digit() {
            result.push('_');
        }
        if valid(c) {
            if !(collapse && c == '_' && result.ends_with('_')) {
                result.push(c);
            }
        } else if !result.ends_with('_') {
            result.push('_');
        }
    }

    while result.len() > 1 && result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() || result == "_" {
        return fallback.to_string();
    }
    result
}

/// Extract a numeric observation from a result value.
///
/// Text is parsed leniently so that drivers returning decimals as strings
/// still work. Returns `None` for nulls and unparseable text.
pub fn extract_numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
    }
}

/// Render a result value as a label value.
///
/// The result is unescaped; the registry escapes it when the series is keyed.
pub fn label_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Text(s) => s.clone(),
    }
}

/// Escape a label value for the text exposition format.
///
/// The encoder writes label values verbatim, so backslashes, double quotes
/// and line feeds must be escaped before a value becomes part of a series key.
pub fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}
