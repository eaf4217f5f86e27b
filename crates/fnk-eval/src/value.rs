use anyhow::{Result, bail};
use std::cmp::Ordering;

/// Runtime payload of a record.
///
/// `Int` and `Float` are distinct because per-field casts distinguish them;
/// arithmetic promotes to `Float` on mixed operands. `Set` keeps insertion
/// order and is deduplicated by [`Value::equals`], since `Value` is not
/// hashable across the numeric variants. `Map` preserves insertion order.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<Value>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Builds a set from an iterator, dropping equal duplicates while
    /// preserving first-seen order.
    pub fn set_from(values: impl IntoIterator<Item = Value>) -> Value {
        let mut out: Vec<Value> = Vec::new();
        for v in values {
            if !out.iter().any(|existing| existing.equals(&v)) {
                out.push(v);
            }
        }
        Value::Set(out)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Str(s) => !s.is_empty(),
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// The meta-empty content predicate used by `filter_map`.
    ///
    /// `Null` and the empty string have no content; a container has content
    /// iff every element does (so an empty container *has* content); every
    /// other value has content. The empty-container case is deliberate.
    pub fn has_content(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Str(s) => !s.is_empty(),
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => {
                v.iter().all(|e| e.has_content())
            }
            Value::Map(m) => m.iter().all(|(_, v)| v.has_content()),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
        }
    }

    /// Elements of a sequence-like value, if this is one.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    // ========================================================================
    // CONVERSIONS
    // ========================================================================

    pub fn as_str(&self) -> Result<String> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok("null".to_string()),
            _ => bail!("cannot convert {} to string", self.type_name()),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(n) => Ok(*n as i64),
            Value::Bool(b) => Ok(*b as i64),
            Value::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("cannot parse '{}' as integer", s)),
            _ => bail!("cannot convert {} to integer", self.type_name()),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(n) => Ok(*n),
            Value::Int(n) => Ok(*n as f64),
            Value::Bool(b) => Ok(*b as i64 as f64),
            Value::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("cannot parse '{}' as number", s)),
            _ => bail!("cannot convert {} to number", self.type_name()),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Str(s) => match s.trim() {
                "true" | "True" | "1" => Ok(true),
                "false" | "False" | "0" => Ok(false),
                _ => bail!("cannot parse '{}' as boolean", s),
            },
            _ => Ok(self.is_truthy()),
        }
    }

    // ========================================================================
    // COMPARISON
    // ========================================================================

    /// Structural equality with Int/Float cross-comparison.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b))
            | (Value::Set(a), Value::Set(b))
            | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            _ => false,
        }
    }

    /// Natural ordering for `sort`. Comparing values of incompatible kinds
    /// is an error surfaced to the caller; sorting a mixed stream is
    /// run-fatal.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (
                Value::Int(_) | Value::Float(_),
                Value::Int(_) | Value::Float(_),
            ) => {
                let a = self.as_float()?;
                let b = other.as_float()?;
                a.partial_cmp(&b)
                    .ok_or_else(|| anyhow::anyhow!("cannot order {} against {}", a, b))
            }
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        non_eq => return Ok(non_eq),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => bail!(
                "cannot compare {} with {}",
                self.type_name(),
                other.type_name()
            ),
        }
    }

    /// Membership test backing the `in` operator.
    pub fn contains_value(&self, needle: &Value) -> Result<bool> {
        match self {
            Value::Str(s) => {
                let sub = needle.as_str()?;
                Ok(s.contains(&sub))
            }
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => {
                Ok(v.iter().any(|e| e.equals(needle)))
            }
            Value::Map(m) => {
                let key = needle.as_str()?;
                Ok(m.iter().any(|(k, _)| *k == key))
            }
            _ => bail!("'in' is not supported on {}", self.type_name()),
        }
    }

    // ========================================================================
    // PROPERTY ACCESS
    // ========================================================================

    pub fn get_property(&self, name: &str) -> Result<Value> {
        match self {
            Value::Str(s) => match name {
                "length" => Ok(Value::Int(s.chars().count() as i64)),
                "upper" => Ok(Value::Str(s.to_uppercase())),
                "lower" => Ok(Value::Str(s.to_lowercase())),
                _ => bail!("unknown string property: {}", name),
            },
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => match name {
                "length" => Ok(Value::Int(v.len() as i64)),
                _ => bail!("unknown sequence property: {}", name),
            },
            Value::Map(m) => m
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| anyhow::anyhow!("key '{}' not found", name)),
            _ => bail!("cannot access property '{}' on {}", name, self.type_name()),
        }
    }

    // ========================================================================
    // METHOD CALLS
    // ========================================================================

    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self {
            Value::Str(s) => self.call_string_method(s, name, args),
            Value::Int(_) | Value::Float(_) => self.call_number_method(name, args),
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => {
                self.call_sequence_method(v, name, args)
            }
            Value::Map(m) => self.call_map_method(m, name, args),
            _ => bail!("cannot call method '{}' on {}", name, self.type_name()),
        }
    }

    fn call_string_method(&self, s: &str, name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "len" | "length" => {
                if !args.is_empty() {
                    bail!("len() expects no arguments, got {}", args.len());
                }
                Ok(Value::Int(s.chars().count() as i64))
            }

            "is_empty" => {
                if !args.is_empty() {
                    bail!("is_empty() expects no arguments, got {}", args.len());
                }
                Ok(Value::Bool(s.is_empty()))
            }

            "lower" | "to_lowercase" => {
                if !args.is_empty() {
                    bail!("lower() expects no arguments, got {}", args.len());
                }
                Ok(Value::Str(s.to_lowercase()))
            }

            "upper" | "to_uppercase" => {
                if !args.is_empty() {
                    bail!("upper() expects no arguments, got {}", args.len());
                }
                Ok(Value::Str(s.to_uppercase()))
            }

            "trim" => {
                if !args.is_empty() {
                    bail!("trim() expects no arguments, got {}", args.len());
                }
                Ok(Value::Str(s.trim().to_string()))
            }

            "replace" => {
                if args.len() != 2 {
                    bail!("replace() expects 2 arguments (from, to), got {}", args.len());
                }
                let from = args[0].as_str()?;
                let to = args[1].as_str()?;
                Ok(Value::Str(s.replace(&from, &to)))
            }

            "contains" => {
                if args.len() != 1 {
                    bail!("contains() expects 1 argument, got {}", args.len());
                }
                let needle = args[0].as_str()?;
                Ok(Value::Bool(s.contains(&needle)))
            }

            "starts_with" => {
                if args.len() != 1 {
                    bail!("starts_with() expects 1 argument, got {}", args.len());
                }
                let prefix = args[0].as_str()?;
                Ok(Value::Bool(s.starts_with(&prefix)))
            }

            "ends_with" => {
                if args.len() != 1 {
                    bail!("ends_with() expects 1 argument, got {}", args.len());
                }
                let suffix = args[0].as_str()?;
                Ok(Value::Bool(s.ends_with(&suffix)))
            }

            "matches" => {
                if args.len() != 1 {
                    bail!("matches() expects 1 argument, got {}", args.len());
                }
                let pattern = args[0].as_str()?;
                let regex = regex::Regex::new(&pattern)?;
                Ok(Value::Bool(regex.is_match(s)))
            }

            "split" => {
                if args.len() != 1 {
                    bail!("split() expects 1 argument, got {}", args.len());
                }
                let delimiter = args[0].as_str()?;
                let parts: Vec<Value> = s
                    .split(&delimiter)
                    .map(|p| Value::Str(p.to_string()))
                    .collect();
                Ok(Value::List(parts))
            }

            "to_int" => {
                if !args.is_empty() {
                    bail!("to_int() expects no arguments, got {}", args.len());
                }
                Ok(Value::Int(self.as_int()?))
            }

            "to_float" => {
                if !args.is_empty() {
                    bail!("to_float() expects no arguments, got {}", args.len());
                }
                Ok(Value::Float(self.as_float()?))
            }

            _ => bail!("unknown string method: {}", name),
        }
    }

    fn call_number_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        if !args.is_empty() {
            bail!("{}() expects no arguments, got {}", name, args.len());
        }
        match name {
            "abs" => match self {
                Value::Int(n) => Ok(Value::Int(n.abs())),
                _ => Ok(Value::Float(self.as_float()?.abs())),
            },
            "floor" => Ok(Value::Int(self.as_float()?.floor() as i64)),
            "ceil" => Ok(Value::Int(self.as_float()?.ceil() as i64)),
            "round" => Ok(Value::Int(self.as_float()?.round() as i64)),
            "to_int" => Ok(Value::Int(self.as_int()?)),
            "to_float" => Ok(Value::Float(self.as_float()?)),
            "to_str" => Ok(Value::Str(self.as_str()?)),
            _ => bail!("unknown number method: {}", name),
        }
    }

    fn call_sequence_method(&self, items: &[Value], name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "first" => items
                .first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("sequence is empty")),

            "last" => items
                .last()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("sequence is empty")),

            "len" | "length" => Ok(Value::Int(items.len() as i64)),

            "is_empty" => Ok(Value::Bool(items.is_empty())),

            "join" => {
                let separator = args
                    .first()
                    .map(|v| v.as_str())
                    .transpose()?
                    .unwrap_or_else(|| ", ".to_string());

                let strings: Vec<String> = items.iter().map(|v| v.display()).collect();
                Ok(Value::Str(strings.join(&separator)))
            }

            "reverse" => {
                let mut reversed = items.to_vec();
                reversed.reverse();
                Ok(Value::List(reversed))
            }

            "sort" => {
                let mut sorted = items.to_vec();
                let mut failed = None;
                sorted.sort_by(|a, b| match a.compare(b) {
                    Ok(ord) => ord,
                    Err(e) => {
                        failed.get_or_insert(e);
                        Ordering::Equal
                    }
                });
                if let Some(e) = failed {
                    return Err(e);
                }
                Ok(Value::List(sorted))
            }

            "contains" => {
                if args.len() != 1 {
                    bail!("contains() expects 1 argument, got {}", args.len());
                }
                Ok(Value::Bool(items.iter().any(|e| e.equals(&args[0]))))
            }

            "unique" => Ok(match Value::set_from(items.to_vec()) {
                Value::Set(v) => Value::List(v),
                _ => unreachable!(),
            }),

            // Closure-taking methods are dispatched by the evaluator, which
            // owns the variable bindings.
            "map" | "filter" | "find" | "any" | "all" => {
                bail!("{}() requires a closure argument", name)
            }

            _ => bail!("unknown sequence method: {}", name),
        }
    }

    fn call_map_method(&self, entries: &[(String, Value)], name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "len" | "length" => Ok(Value::Int(entries.len() as i64)),
            "keys" => Ok(Value::List(
                entries.iter().map(|(k, _)| Value::Str(k.clone())).collect(),
            )),
            "values" => Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect())),
            "get" => {
                if args.len() != 1 {
                    bail!("get() expects 1 argument, got {}", args.len());
                }
                let key = args[0].as_str()?;
                Ok(entries
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null))
            }
            _ => bail!("unknown map method: {}", name),
        }
    }

    // ========================================================================
    // JSON
    // ========================================================================

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Sets and tuples have no JSON counterpart and serialize as arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Null => serde_json::Value::Null,
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    // ========================================================================
    // DISPLAY
    // ========================================================================

    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}.0", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Set(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("({})", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}
