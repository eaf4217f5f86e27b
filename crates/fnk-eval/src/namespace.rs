use crate::value::Value;
use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use std::collections::HashMap;

type ModuleFn = fn(&str, &[Value]) -> Result<Option<Value>>;

#[derive(Debug)]
struct ModuleDef {
    constant: fn(&str) -> Option<Value>,
    call: ModuleFn,
}

static MODULES: Lazy<HashMap<&'static str, ModuleDef>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "math",
        ModuleDef {
            constant: math_constant,
            call: math_call,
        },
    );
    map.insert(
        "env",
        ModuleDef {
            constant: env_constant,
            call: env_call,
        },
    );
    map
});

/// Names visible to stage expressions: imported modules, user constants
/// and values written back by pop stages. The per-record variable is
/// bound by the evaluator on top of this, never stored here.
#[derive(Debug, Default)]
pub struct Namespace {
    vars: HashMap<String, Value>,
    modules: HashMap<String, &'static str>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles both `math` and `m=math` import forms.
    pub fn import(&mut self, statement: &str) -> Result<()> {
        let (alias, target) = match statement.split_once('=') {
            Some((a, t)) => (a.trim(), t.trim()),
            None => (statement.trim(), statement.trim()),
        };
        if alias.is_empty() || target.is_empty() {
            bail!("invalid import '{}'", statement);
        }
        let Some((key, _)) = MODULES.get_key_value(target) else {
            bail!("'{}' is not an importable module", target);
        };
        self.modules.insert(alias.to_string(), *key);
        Ok(())
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name) || self.modules.contains_key(name)
    }

    pub fn is_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module_constant(&self, alias: &str, name: &str) -> Result<Value> {
        let def = self.resolve(alias)?;
        match (def.constant)(name) {
            Some(value) => Ok(value),
            None => bail!("module '{}' has no constant '{}'", alias, name),
        }
    }

    pub fn call_module(&self, alias: &str, func: &str, args: &[Value]) -> Result<Value> {
        let def = self.resolve(alias)?;
        match (def.call)(func, args)? {
            Some(value) => Ok(value),
            None => bail!("module '{}' has no function '{}'", alias, func),
        }
    }

    fn resolve(&self, alias: &str) -> Result<&'static ModuleDef> {
        let Some(key) = self.modules.get(alias) else {
            bail!("'{}' is not an imported module", alias);
        };
        Ok(&MODULES[key])
    }
}

fn math_constant(name: &str) -> Option<Value> {
    let value = match name {
        "pi" => std::f64::consts::PI,
        "e" => std::f64::consts::E,
        "tau" => std::f64::consts::TAU,
        "inf" => f64::INFINITY,
        "nan" => f64::NAN,
        _ => return None,
    };
    Some(Value::Float(value))
}

fn math_call(func: &str, args: &[Value]) -> Result<Option<Value>> {
    fn one(func: &str, args: &[Value]) -> Result<f64> {
        if args.len() != 1 {
            bail!("math.{}() takes exactly 1 argument, got {}", func, args.len());
        }
        args[0].as_float()
    }

    let value = match func {
        "sqrt" => {
            let x = one(func, args)?;
            if x < 0.0 {
                bail!("math.sqrt() of a negative number");
            }
            Value::Float(x.sqrt())
        }
        "pow" => {
            if args.len() != 2 {
                bail!("math.pow() takes exactly 2 arguments, got {}", args.len());
            }
            Value::Float(args[0].as_float()?.powf(args[1].as_float()?))
        }
        "abs" => match &args[..] {
            [Value::Int(n)] => Value::Int(n.abs()),
            _ => Value::Float(one(func, args)?.abs()),
        },
        "floor" => Value::Int(one(func, args)?.floor() as i64),
        "ceil" => Value::Int(one(func, args)?.ceil() as i64),
        "round" => Value::Int(one(func, args)?.round() as i64),
        "log" => {
            let x = one(func, args)?;
            if x <= 0.0 {
                bail!("math.log() of a non-positive number");
            }
            Value::Float(x.ln())
        }
        "min" => return crate::builtins::builtin_min(args).map(Some),
        "max" => return crate::builtins::builtin_max(args).map(Some),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Environment variables read as `env.NAME`.
fn env_constant(name: &str) -> Option<Value> {
    std::env::var(name).ok().map(Value::Str)
}

fn env_call(func: &str, args: &[Value]) -> Result<Option<Value>> {
    let value = match func {
        "get" => {
            if args.is_empty() || args.len() > 2 {
                bail!("env.get() takes 1 or 2 arguments, got {}", args.len());
            }
            let name = args[0].as_str()?;
            match std::env::var(&name) {
                Ok(v) => Value::Str(v),
                Err(_) => args.get(1).cloned().unwrap_or(Value::Null),
            }
        }
        "has" => {
            if args.len() != 1 {
                bail!("env.has() takes exactly 1 argument, got {}", args.len());
            }
            Value::Bool(std::env::var(args[0].as_str()?).is_ok())
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_aliased_imports() {
        let mut ns = Namespace::new();
        ns.import("math").unwrap();
        ns.import("m = math").unwrap();
        assert!(ns.is_module("math"));
        assert!(ns.is_module("m"));
        assert!(!ns.is_module("env"));
    }

    #[test]
    fn unknown_module_is_an_error() {
        let mut ns = Namespace::new();
        let err = ns.import("random").unwrap_err();
        assert!(err.to_string().contains("not an importable module"));
    }

    #[test]
    fn math_constants_and_functions() {
        let mut ns = Namespace::new();
        ns.import("math").unwrap();
        let pi = ns.module_constant("math", "pi").unwrap();
        assert!(pi.equals(&Value::Float(std::f64::consts::PI)));

        let r = ns.call_module("math", "sqrt", &[Value::Int(9)]).unwrap();
        assert!(r.equals(&Value::Float(3.0)));

        let r = ns.call_module("math", "floor", &[Value::Float(2.7)]).unwrap();
        assert!(r.equals(&Value::Int(2)));
    }

    #[test]
    fn math_errors() {
        let mut ns = Namespace::new();
        ns.import("math").unwrap();
        assert!(ns.call_module("math", "sqrt", &[Value::Int(-1)]).is_err());
        assert!(ns.call_module("math", "nope", &[]).is_err());
    }

    #[test]
    fn env_variables_as_constants() {
        let mut ns = Namespace::new();
        ns.import("env").unwrap();
        unsafe { std::env::set_var("FNK_NS_TEST", "yes") };
        let r = ns.module_constant("env", "FNK_NS_TEST").unwrap();
        assert!(r.equals(&Value::Str("yes".into())));
        assert!(ns.module_constant("env", "FNK_NS_TEST_UNSET").is_err());
    }

    #[test]
    fn env_get_with_default() {
        let mut ns = Namespace::new();
        ns.import("env").unwrap();
        let r = ns
            .call_module(
                "env",
                "get",
                &[
                    Value::Str("FNK_TEST_SURELY_UNSET".into()),
                    Value::Str("fallback".into()),
                ],
            )
            .unwrap();
        assert!(r.equals(&Value::Str("fallback".into())));
    }

    #[test]
    fn defined_values_are_visible() {
        let mut ns = Namespace::new();
        ns.define("total", Value::Int(7));
        assert!(ns.get("total").unwrap().equals(&Value::Int(7)));
        assert!(ns.contains("total"));
        assert!(!ns.contains("other"));
    }
}
