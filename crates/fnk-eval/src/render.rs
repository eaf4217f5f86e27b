//! Final output rendering: delimiter-joined text or JSON.

use crate::record::Record;
use crate::value::Value;
use serde_json::ser::PrettyFormatter;
use serde_json::Serializer;

/// Fixed message emitted when JSON output is requested but the result
/// cannot be coerced into a mapping or a sequence.
pub const JSON_FAILURE: &str = "Output cannot be parsed as JSON.";

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Separator between rendered records in text mode.
    pub separator: String,
    pub json: bool,
    /// Spaces of indentation for JSON output; 0 renders compact.
    pub json_indent: usize,
    pub sort_keys: bool,
    /// Emit an empty line in place of each errored or filtered record so
    /// output lines stay aligned with input lines.
    pub placeholders: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            separator: "\n".to_string(),
            json: false,
            json_indent: 2,
            sort_keys: false,
            placeholders: false,
        }
    }
}

#[derive(Debug)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Renders the final record stream to a single stdout payload.
    /// Returns `None` when there is nothing to print.
    pub fn render(&self, records: &[Record]) -> Option<String> {
        if self.config.json {
            let values: Vec<&Value> = records
                .iter()
                .filter(|r| r.is_valid())
                .map(|r| &r.value)
                .collect();
            if values.is_empty() {
                return None;
            }
            return Some(self.render_json(&values));
        }

        let mut lines = Vec::new();
        for record in records {
            if record.is_valid() {
                lines.push(record.value.display());
            } else if self.config.placeholders {
                lines.push(String::new());
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join(&self.config.separator))
        }
    }

    /// Coercion order: mapping first, then sequence. A single textual
    /// value is parsed as JSON instead of being wrapped.
    fn render_json(&self, values: &[&Value]) -> String {
        let json = if let Some(object) = as_mapping(values) {
            object
        } else if let [Value::Str(text)] = values {
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(parsed) => parsed,
                Err(_) => return JSON_FAILURE.to_string(),
            }
        } else if values.len() == 1 {
            values[0].to_json()
        } else {
            serde_json::Value::Array(values.iter().map(|v| v.to_json()).collect())
        };

        let json = if self.config.sort_keys {
            sort_keys(json)
        } else {
            json
        };
        self.serialize(&json)
    }

    fn serialize(&self, json: &serde_json::Value) -> String {
        if self.config.json_indent == 0 {
            return serde_json::to_string(json).unwrap_or_else(|_| JSON_FAILURE.to_string());
        }
        let indent = " ".repeat(self.config.json_indent);
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = Serializer::with_formatter(&mut out, formatter);
        match serde::Serialize::serialize(json, &mut serializer) {
            Ok(()) => String::from_utf8(out).unwrap_or_else(|_| JSON_FAILURE.to_string()),
            Err(_) => JSON_FAILURE.to_string(),
        }
    }
}

/// A single map value, or a stream of key/value pairs, renders as one
/// JSON object.
fn as_mapping(values: &[&Value]) -> Option<serde_json::Value> {
    if let [Value::Map(entries)] = values {
        let mut object = serde_json::Map::new();
        for (key, value) in entries {
            object.insert(key.clone(), value.to_json());
        }
        return Some(serde_json::Value::Object(object));
    }

    if values.is_empty() {
        return None;
    }
    let mut object = serde_json::Map::new();
    for value in values {
        let (Value::List(pair) | Value::Tuple(pair)) = value else {
            return None;
        };
        let [key, item] = pair.as_slice() else {
            return None;
        };
        object.insert(key.display(), item.to_json());
    }
    Some(serde_json::Value::Object(object))
}

fn sort_keys(json: serde_json::Value) -> serde_json::Value {
    match json {
        serde_json::Value::Object(entries) => {
            let mut pairs: Vec<(String, serde_json::Value)> = entries.into_iter().collect();
            pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
            serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(values: Vec<Value>) -> Vec<Record> {
        values.into_iter().map(Record::synthetic).collect()
    }

    #[test]
    fn text_mode_joins_by_separator() {
        let renderer = Renderer::new(RenderConfig::default());
        let records = valid(vec![Value::Int(6), Value::Int(2), Value::Int(4)]);
        assert_eq!(renderer.render(&records).unwrap(), "6\n2\n4");
    }

    #[test]
    fn custom_separator() {
        let config = RenderConfig {
            separator: ", ".to_string(),
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![Value::Str("a".into()), Value::Str("b".into())]);
        assert_eq!(renderer.render(&records).unwrap(), "a, b");
    }

    #[test]
    fn empty_stream_renders_nothing() {
        let renderer = Renderer::new(RenderConfig::default());
        assert!(renderer.render(&[]).is_none());
    }

    #[test]
    fn placeholders_keep_line_positions() {
        let config = RenderConfig {
            placeholders: true,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let mut records = valid(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        records[1].filter_out("dropped".to_string());
        assert_eq!(renderer.render(&records).unwrap(), "1\n\n3");
    }

    #[test]
    fn json_stream_renders_as_array() {
        let config = RenderConfig {
            json: true,
            json_indent: 0,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![Value::Int(1), Value::Str("a".into())]);
        assert_eq!(renderer.render(&records).unwrap(), r#"[1,"a"]"#);
    }

    #[test]
    fn json_pairs_render_as_object() {
        let config = RenderConfig {
            json: true,
            json_indent: 0,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![
            Value::Tuple(vec![Value::Str("b".into()), Value::Int(2)]),
            Value::Tuple(vec![Value::Str("a".into()), Value::Int(1)]),
        ]);
        assert_eq!(renderer.render(&records).unwrap(), r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn json_sort_keys() {
        let config = RenderConfig {
            json: true,
            json_indent: 0,
            sort_keys: true,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![Value::Map(vec![
            ("b".to_string(), Value::Int(2)),
            ("a".to_string(), Value::Int(1)),
        ])]);
        assert_eq!(renderer.render(&records).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn json_parses_a_single_textual_value() {
        let config = RenderConfig {
            json: true,
            json_indent: 0,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![Value::Str(r#"{"x": 1}"#.into())]);
        assert_eq!(renderer.render(&records).unwrap(), r#"{"x":1}"#);
    }

    #[test]
    fn unparseable_text_yields_the_fixed_message() {
        let config = RenderConfig {
            json: true,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![Value::Str("not json".into())]);
        assert_eq!(renderer.render(&records).unwrap(), JSON_FAILURE);
    }

    #[test]
    fn json_indentation() {
        let config = RenderConfig {
            json: true,
            json_indent: 2,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(config);
        let records = valid(vec![Value::Map(vec![("a".to_string(), Value::Int(1))])]);
        assert_eq!(renderer.render(&records).unwrap(), "{\n  \"a\": 1\n}");
    }
}
