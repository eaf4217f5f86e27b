//! Input splitting and typed record construction.
//!
//! The [`Splitter`] turns the raw stdin text into raw records; the
//! [`RecordTyper`] then applies the configured per-field casts, optionally
//! sub-splitting each token into a fixed container of typed fields.

use crate::cast::{ContainerKind, FieldType, try_cast};
use crate::record::Record;
use crate::value::Value;
use anyhow::{Context, Result};

/// How the raw input stream is cut into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    /// Split on an explicit separator string. An empty separator splits
    /// into individual characters.
    Separator(String),
    /// Split on any run of whitespace.
    Whitespace,
    /// Parse the whole input as JSON; array elements (or object entries as
    /// key/value pairs) become records.
    Json,
    /// The whole input is one token.
    None,
}

#[derive(Debug, Clone)]
pub struct Splitter {
    pub mode: SplitMode,
    /// Characters trimmed from each textual token before casting.
    /// `None` disables trimming, `Some("")` trims whitespace.
    pub trim: Option<String>,
}

impl Splitter {
    pub fn new(mode: SplitMode) -> Self {
        Self { mode, trim: None }
    }

    /// Cuts `input` into raw records. Empty input yields zero records.
    pub fn split(&self, input: &str) -> Result<Vec<Record>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let records = match &self.mode {
            SplitMode::Separator(sep) if sep.is_empty() => input
                .chars()
                .map(|c| self.text_record(c.to_string()))
                .collect(),
            SplitMode::Separator(sep) => {
                // A trailing separator (the usual final newline) does not
                // produce an empty trailing record.
                let body = input.strip_suffix(sep.as_str()).unwrap_or(input);
                if body.is_empty() {
                    Vec::new()
                } else {
                    body.split(sep.as_str())
                        .map(|t| self.text_record(t.to_string()))
                        .collect()
                }
            }
            SplitMode::Whitespace => input
                .split_whitespace()
                .map(|t| self.text_record(t.to_string()))
                .collect(),
            SplitMode::Json => split_json(input)?,
            SplitMode::None => vec![self.text_record(input.to_string())],
        };
        Ok(records)
    }

    fn text_record(&self, token: String) -> Record {
        let token = match &self.trim {
            None => token,
            Some(set) if set.is_empty() => token.trim().to_string(),
            Some(set) => token
                .trim_matches(|c: char| set.contains(c))
                .to_string(),
        };
        Record::new(token.clone(), Value::Str(token))
    }
}

/// Malformed top-level JSON aborts the run; there is no per-record
/// recovery for it.
fn split_json(input: &str) -> Result<Vec<Record>> {
    let parsed: serde_json::Value =
        serde_json::from_str(input).context("input is not valid JSON")?;
    let records = match parsed {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| {
                let value = Value::from_json(&item);
                Record::new(value.display(), value)
            })
            .collect(),
        serde_json::Value::Object(entries) => entries
            .into_iter()
            .map(|(key, item)| {
                let value = Value::Tuple(vec![Value::Str(key), Value::from_json(&item)]);
                Record::new(value.display(), value)
            })
            .collect(),
        other => {
            let value = Value::from_json(&other);
            vec![Record::new(value.display(), value)]
        }
    };
    Ok(records)
}

/// Per-field cast configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RecordTyper {
    /// Declared type per position. Empty means "leave tokens as text".
    pub fields: Vec<FieldType>,
    /// Separator for cutting a token into sub-fields. `None` splits on
    /// whitespace when sub-splitting is in effect.
    pub field_separator: Option<String>,
    /// Container kind for multi-field records.
    pub container: ContainerKind,
    /// Cut each token into typed sub-fields.
    pub sub_split: bool,
}

impl RecordTyper {
    /// A typer that leaves every token as-is.
    pub fn untyped() -> Self {
        Self {
            fields: Vec::new(),
            field_separator: None,
            container: ContainerKind::List,
            sub_split: false,
        }
    }

    fn sub_splits(&self) -> bool {
        self.sub_split || self.fields.len() > 1 || self.field_separator.is_some()
    }

    /// Applies the configured casts to a raw record. Structured (JSON)
    /// values pass through untouched; failed casts substitute the declared
    /// type's default via [`try_cast`] instead of erroring the record.
    pub fn apply(&self, record: Record) -> Record {
        let Value::Str(token) = record.value.clone() else {
            return record;
        };
        if self.fields.is_empty() && !self.sub_splits() {
            return record;
        }

        let value = if self.sub_splits() {
            let parts: Vec<&str> = match &self.field_separator {
                Some(sep) if sep.is_empty() => return record,
                Some(sep) => token.split(sep.as_str()).collect(),
                None => token.split_whitespace().collect(),
            };
            let fields = parts
                .iter()
                .enumerate()
                .map(|(i, part)| try_cast(part, self.field_type(i)))
                .collect();
            self.container.assemble(fields)
        } else {
            try_cast(&token, self.field_type(0))
        };

        Record::new(record.init, value)
    }

    /// Positional type, falling back to the last declared one so a single
    /// annotation acts as the global type for every field.
    fn field_type(&self, index: usize) -> FieldType {
        match self.fields.get(index) {
            Some(ty) => *ty,
            None => self.fields.last().copied().unwrap_or(FieldType::Str),
        }
    }
}
