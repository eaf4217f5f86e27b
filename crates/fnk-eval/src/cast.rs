//! Field typing and the shared attempt-else-default cast combinator.
//!
//! Type and container names arriving from the command line (or from closure
//! parameter annotations) are resolved into the closed enums below exactly
//! once, during configuration validation. After that the pipeline never does
//! string-based type lookup.

use crate::value::Value;
use anyhow::{Result, bail};

/// Scalar or container type a field can be cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Set,
    Tuple,
    Map,
}

impl FieldType {
    pub fn from_name(name: &str) -> Result<FieldType> {
        match name {
            "str" | "string" | "text" => Ok(FieldType::Str),
            "int" | "integer" => Ok(FieldType::Int),
            "float" | "number" => Ok(FieldType::Float),
            "bool" | "boolean" => Ok(FieldType::Bool),
            "list" => Ok(FieldType::List),
            "set" => Ok(FieldType::Set),
            "tuple" => Ok(FieldType::Tuple),
            "dict" | "map" => Ok(FieldType::Map),
            other => bail!("'{}' is not a supported type", other),
        }
    }

    /// The fallback value substituted when a cast fails.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Str => Value::Str(String::new()),
            FieldType::Int => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::List => Value::List(Vec::new()),
            FieldType::Set => Value::Set(Vec::new()),
            FieldType::Tuple => Value::Tuple(Vec::new()),
            FieldType::Map => Value::Map(Vec::new()),
        }
    }
}

/// Container kind used when a token is sub-split into multiple typed fields,
/// and by the `collect` barrier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Set,
    Tuple,
    Map,
}

impl ContainerKind {
    /// Infers a container kind from its textual tag. Unknown or absent tags
    /// fall back to `List`.
    pub fn infer(tag: Option<&str>) -> ContainerKind {
        match tag.map(|t| t.trim().to_lowercase()).as_deref() {
            Some("{}") | Some("set") => ContainerKind::Set,
            Some("()") | Some("tuple") => ContainerKind::Tuple,
            Some("dict") | Some("map") => ContainerKind::Map,
            _ => ContainerKind::List,
        }
    }

    /// Wraps already-built field values in this container.
    pub fn assemble(&self, fields: Vec<Value>) -> Value {
        match self {
            ContainerKind::List => Value::List(fields),
            ContainerKind::Set => Value::set_from(fields),
            ContainerKind::Tuple => Value::Tuple(fields),
            ContainerKind::Map => Value::Map(
                fields
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
            ),
        }
    }
}

/// Strict cast of one textual field.
pub fn cast(raw: &str, ty: FieldType) -> Result<Value> {
    let value = Value::Str(raw.to_string());
    match ty {
        FieldType::Str => Ok(value),
        FieldType::Int => Ok(Value::Int(value.as_int()?)),
        FieldType::Float => Ok(Value::Float(value.as_float()?)),
        FieldType::Bool => Ok(Value::Bool(value.as_bool()?)),
        // Casting a bare string to a container wraps its characters.
        FieldType::List => Ok(Value::List(chars_of(raw))),
        FieldType::Set => Ok(Value::set_from(chars_of(raw))),
        FieldType::Tuple => Ok(Value::Tuple(chars_of(raw))),
        FieldType::Map => bail!("cannot cast '{}' to a map", raw),
    }
}

fn chars_of(raw: &str) -> Vec<Value> {
    raw.chars().map(|c| Value::Str(c.to_string())).collect()
}

/// The attempt-else-default combinator.
///
/// A failed cast substitutes the type's default value instead of erroring
/// the record. This keeps one malformed field from killing a run but can
/// mask data errors; it is the single shared implementation so the policy
/// stays auditable.
pub fn try_cast(raw: &str, ty: FieldType) -> Value {
    cast(raw, ty).unwrap_or_else(|_| ty.default_value())
}

/// Best-effort reinterpretation of an already-typed value, used by the
/// `any`/`all` aggregates. Strings are reparsed as literals when possible;
/// failure yields `Null` rather than an error.
pub fn try_literal(value: &Value) -> Value {
    match value {
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                Value::Int(n)
            } else if let Ok(n) = trimmed.parse::<f64>() {
                Value::Float(n)
            } else if let Ok(b) = trimmed.parse::<bool>() {
                Value::Bool(b)
            } else if trimmed.is_empty() {
                Value::Null
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}
