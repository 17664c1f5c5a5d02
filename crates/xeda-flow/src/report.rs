//! Plain-text rendering of flow results.

use serde_json::Value;

use crate::flow::FlowResults;

const KEY_WIDTH: usize = 32;
const TABLE_WIDTH: usize = 48;

/// Renders `results` as a two-column table.
///
/// `subset` restricts (and orders) the rows; keys it names that are absent
/// from the results are skipped.
pub fn format_results(results: &FlowResults, title: Option<&str>, subset: Option<&[&str]>) -> String {
    let rule = "=".repeat(TABLE_WIDTH);
    let mut out = String::new();
    if let Some(title) = title {
        out.push_str(&format!("{title:^TABLE_WIDTH$}\n"));
    }
    out.push_str(&rule);
    out.push('\n');

    let rows: Vec<(&str, &Value)> = match subset {
        Some(keys) => keys
            .iter()
            .filter_map(|key| results.get(key).map(|value| (*key, value)))
            .collect(),
        None => results
            .as_mapping()
            .iter()
            .map(|(key, value)| (key.as_str(), value))
            .collect(),
    };
    for (key, value) in rows {
        out.push_str(&format!("{key:<KEY_WIDTH$}{}\n", render_value(value)));
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Number(number) if number.is_f64() => number
            .as_f64()
            .map(|float| format!("{float:.3}"))
            .unwrap_or_else(|| number.to_string()),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
