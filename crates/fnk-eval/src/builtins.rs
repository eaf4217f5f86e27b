use crate::value::Value;
use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub type BuiltinFn = fn(&[Value]) -> Result<Value>;

static BUILTIN_FUNCTIONS: Lazy<HashMap<&'static str, BuiltinFn>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("len", builtin_len as BuiltinFn);
    map.insert("min", builtin_min as BuiltinFn);
    map.insert("max", builtin_max as BuiltinFn);
    map.insert("sum", builtin_sum as BuiltinFn);
    map.insert("print", builtin_print as BuiltinFn);
    map.insert("eprint", builtin_eprint as BuiltinFn);
    map
});

/// Free functions callable from any stage expression, e.g. `len(_)`.
/// Also the resolution target for `--agg NAME` when `NAME` is not one of
/// the dedicated reducers.
#[derive(Clone, Default)]
pub struct BuiltinRegistry;

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        if let Some(func) = BUILTIN_FUNCTIONS.get(name) {
            Ok(Some(func(args)?))
        } else {
            Ok(None)
        }
    }

    pub fn has(&self, name: &str) -> bool {
        BUILTIN_FUNCTIONS.contains_key(name)
    }
}

/// One sequence argument means "over its elements"; several scalar
/// arguments mean "over the arguments". Shared by min/max/sum.
fn spread(args: &[Value]) -> Vec<Value> {
    if args.len() == 1 {
        if let Some(items) = args[0].elements() {
            return items.to_vec();
        }
    }
    args.to_vec()
}

pub fn builtin_len(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        bail!("len() takes exactly 1 argument, got {}", args.len());
    }
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(v) | Value::Set(v) | Value::Tuple(v) => Ok(Value::Int(v.len() as i64)),
        Value::Map(m) => Ok(Value::Int(m.len() as i64)),
        other => bail!("len() is not supported on {}", other.type_name()),
    }
}

pub fn builtin_min(args: &[Value]) -> Result<Value> {
    let items = spread(args);
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                if item.compare(&current)? == std::cmp::Ordering::Less {
                    item
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| anyhow::anyhow!("min() of an empty sequence"))
}

pub fn builtin_max(args: &[Value]) -> Result<Value> {
    let items = spread(args);
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                if item.compare(&current)? == std::cmp::Ordering::Greater {
                    item
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| anyhow::anyhow!("max() of an empty sequence"))
}

pub fn builtin_sum(args: &[Value]) -> Result<Value> {
    let items = spread(args);
    let mut acc = Value::Int(0);
    for item in items {
        acc = match (&acc, &item) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a + b),
            _ => Value::Float(acc.as_float()? + item.as_float()?),
        };
    }
    Ok(acc)
}

pub fn builtin_print(args: &[Value]) -> Result<Value> {
    let parts: Vec<String> = args.iter().map(|v| v.display()).collect();
    println!("{}", parts.join(" "));
    Ok(Value::Null)
}

pub fn builtin_eprint(args: &[Value]) -> Result<Value> {
    let parts: Vec<String> = args.iter().map(|v| v.display()).collect();
    eprintln!("{}", parts.join(" "));
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_of_string_and_list() {
        let reg = BuiltinRegistry::new();
        let r = reg.call("len", &[Value::Str("abc".into())]).unwrap().unwrap();
        assert!(r.equals(&Value::Int(3)));

        let r = reg
            .call("len", &[Value::List(vec![Value::Int(1), Value::Int(2)])])
            .unwrap()
            .unwrap();
        assert!(r.equals(&Value::Int(2)));
    }

    #[test]
    fn min_max_spread_over_sequence() {
        let seq = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert!(builtin_min(&[seq.clone()]).unwrap().equals(&Value::Int(1)));
        assert!(builtin_max(&[seq]).unwrap().equals(&Value::Int(3)));
    }

    #[test]
    fn sum_promotes_to_float_on_mixed() {
        let seq = Value::List(vec![Value::Int(1), Value::Float(0.5)]);
        assert!(builtin_sum(&[seq]).unwrap().equals(&Value::Float(1.5)));
    }

    #[test]
    fn min_of_empty_is_error() {
        assert!(builtin_min(&[Value::List(vec![])]).is_err());
    }

    #[test]
    fn unknown_builtin_returns_none() {
        let reg = BuiltinRegistry::new();
        assert!(reg.call("mystery", &[]).unwrap().is_none());
        assert!(!reg.has("mystery"));
        assert!(reg.has("len"));
    }
}
