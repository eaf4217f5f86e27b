//! Expression evaluation over [`Value`]s.
//!
//! An [`Evaluator`] borrows the shared [`Namespace`] (imports, constants,
//! values written back by pop stages) and keeps its own local bindings for
//! closure parameters. Stage expressions are compiled once into a
//! [`CompiledExpr`] and invoked per record.

use crate::bail_span;
use crate::builtins::BuiltinRegistry;
use crate::namespace::Namespace;
use crate::value::Value;
use anyhow::Result;
use fnk_syntax::ast::{BinaryOp, ClosureDef, Expression, UnaryOp};
use fnk_syntax::parser::parse_closure;
use std::collections::HashMap;

/// A parsed stage expression ready to be applied to records.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    def: ClosureDef,
}

impl CompiledExpr {
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            def: parse_closure(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.def.source
    }

    pub fn params(&self) -> usize {
        self.def.params.len()
    }

    pub fn annotations(&self) -> Vec<Option<fnk_syntax::ast::TypeName>> {
        self.def.annotations()
    }

    /// Applies the expression to `args`, binding parameters positionally.
    ///
    /// A bare expression (no parameter list) receives a single argument
    /// bound to the representation variable. A multi-parameter expression
    /// given a single sequence argument destructures it.
    pub fn call(&self, ev: &mut Evaluator<'_>, repr: &str, args: &[Value]) -> Result<Value> {
        let mut bindings: Vec<(String, Value)> = Vec::new();

        if self.def.params.is_empty() {
            if args.len() != 1 {
                bail_span!(
                    self.def.body.span(),
                    "expression takes 1 value, got {}",
                    args.len()
                );
            }
            bindings.push((repr.to_string(), args[0].clone()));
        } else if self.def.params.len() == args.len() {
            for (param, arg) in self.def.params.iter().zip(args) {
                bindings.push((param.name.clone(), arg.clone()));
            }
        } else if args.len() == 1 {
            let Some(items) = args[0].elements() else {
                bail_span!(
                    self.def.body.span(),
                    "cannot destructure {} into {} parameters",
                    args[0].type_name(),
                    self.def.params.len()
                );
            };
            if items.len() != self.def.params.len() {
                bail_span!(
                    self.def.body.span(),
                    "expression takes {} values, got {}",
                    self.def.params.len(),
                    items.len()
                );
            }
            for (param, item) in self.def.params.iter().zip(items) {
                bindings.push((param.name.clone(), item.clone()));
            }
        } else {
            bail_span!(
                self.def.body.span(),
                "expression takes {} values, got {}",
                self.def.params.len(),
                args.len()
            );
        }

        ev.with_bindings(bindings, |ev| ev.eval_expression(&self.def.body))
    }
}

/// Evaluates [`Expression`] trees against a [`Namespace`].
pub struct Evaluator<'a> {
    namespace: &'a Namespace,
    builtins: BuiltinRegistry,
    locals: HashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(namespace: &'a Namespace) -> Self {
        Self {
            namespace,
            builtins: BuiltinRegistry::new(),
            locals: HashMap::new(),
        }
    }

    /// Runs `f` with extra local bindings, restoring the previous state
    /// afterwards so nested closures cannot leak parameters.
    fn with_bindings<T>(
        &mut self,
        bindings: Vec<(String, Value)>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut saved: Vec<(String, Option<Value>)> = Vec::with_capacity(bindings.len());
        for (name, value) in bindings {
            saved.push((name.clone(), self.locals.insert(name, value)));
        }
        let result = f(self);
        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.locals.insert(name, value);
                }
                None => {
                    self.locals.remove(&name);
                }
            }
        }
        result
    }

    pub fn eval_expression(&mut self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::String(s, _) => Ok(Value::Str(s.clone())),
            Expression::Int(n, _) => Ok(Value::Int(*n)),
            Expression::Float(n, _) => Ok(Value::Float(*n)),
            Expression::Bool(b, _) => Ok(Value::Bool(*b)),
            Expression::Null(_) => Ok(Value::Null),
            Expression::Identifier(name, span) => {
                if let Some(value) = self.locals.get(name) {
                    return Ok(value.clone());
                }
                if let Some(value) = self.namespace.get(name) {
                    return Ok(value.clone());
                }
                bail_span!(span, "variable '{}' is not defined", name)
            }
            Expression::Array(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expression(item)?);
                }
                Ok(Value::List(values))
            }
            Expression::Binary {
                left,
                op,
                right,
                span,
            } => self.eval_binary_op(left, *op, right, span),
            Expression::Unary { op, expr, span } => {
                let value = self.eval_expression(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Minus => match value {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        Value::Float(n) => Ok(Value::Float(-n)),
                        other => {
                            bail_span!(span, "cannot negate {}", other.type_name())
                        }
                    },
                }
            }
            Expression::PropertyAccess {
                receiver,
                property,
                span,
            } => {
                if let Expression::Identifier(name, _) = receiver.as_ref() {
                    if !self.locals.contains_key(name) && self.namespace.is_module(name) {
                        return self
                            .namespace
                            .module_constant(name, property)
                            .map_err(|e| respan(e, span));
                    }
                }
                let value = self.eval_expression(receiver)?;
                value.get_property(property).map_err(|e| respan(e, span))
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
                span,
            } => self.eval_method_call(receiver, method, args, span),
            Expression::Call {
                function,
                args,
                span,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expression(arg)?);
                }
                match self.builtins.call(function, &values) {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => bail_span!(span, "function '{}' is not defined", function),
                    Err(e) => Err(respan(e, span)),
                }
            }
            Expression::IndexAccess {
                receiver,
                index,
                span,
            } => {
                let value = self.eval_expression(receiver)?;
                let index = self.eval_expression(index)?;
                eval_index(&value, &index, span)
            }
            Expression::IfExpr {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                if self.eval_expression(condition)?.is_truthy() {
                    self.eval_expression(then_expr)
                } else {
                    self.eval_expression(else_expr)
                }
            }
            Expression::Closure { span, .. } => {
                bail_span!(span, "a closure is only valid as a method argument")
            }
        }
    }

    fn eval_binary_op(
        &mut self,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
        span: &fnk_syntax::error::Span,
    ) -> Result<Value> {
        // Short-circuit before evaluating the right side.
        match op {
            BinaryOp::And => {
                let lhs = self.eval_expression(left)?;
                if !lhs.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let rhs = self.eval_expression(right)?;
                return Ok(Value::Bool(rhs.is_truthy()));
            }
            BinaryOp::Or => {
                let lhs = self.eval_expression(left)?;
                if lhs.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let rhs = self.eval_expression(right)?;
                return Ok(Value::Bool(rhs.is_truthy()));
            }
            _ => {}
        }

        let lhs = self.eval_expression(left)?;
        let rhs = self.eval_expression(right)?;

        match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs.equals(&rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!lhs.equals(&rhs))),
            BinaryOp::Lt => {
                let ord = lhs.compare(&rhs).map_err(|e| respan(e, span))?;
                Ok(Value::Bool(ord == std::cmp::Ordering::Less))
            }
            BinaryOp::Le => {
                let ord = lhs.compare(&rhs).map_err(|e| respan(e, span))?;
                Ok(Value::Bool(ord != std::cmp::Ordering::Greater))
            }
            BinaryOp::Gt => {
                let ord = lhs.compare(&rhs).map_err(|e| respan(e, span))?;
                Ok(Value::Bool(ord == std::cmp::Ordering::Greater))
            }
            BinaryOp::Ge => {
                let ord = lhs.compare(&rhs).map_err(|e| respan(e, span))?;
                Ok(Value::Bool(ord != std::cmp::Ordering::Less))
            }
            BinaryOp::In => {
                let found = rhs.contains_value(&lhs).map_err(|e| respan(e, span))?;
                Ok(Value::Bool(found))
            }
            BinaryOp::Add => eval_add(&lhs, &rhs, span),
            BinaryOp::Sub => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
                _ => numeric(&lhs, &rhs, span, "-", |a, b| a - b),
            },
            BinaryOp::Mul => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
                (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                    if *n < 0 {
                        bail_span!(span, "cannot repeat a string a negative number of times")
                    }
                    Ok(Value::Str(s.repeat(*n as usize)))
                }
                _ => numeric(&lhs, &rhs, span, "*", |a, b| a * b),
            },
            BinaryOp::Div => {
                let b = rhs.as_float().map_err(|e| respan(e, span))?;
                if b == 0.0 {
                    bail_span!(span, "division by zero")
                }
                let a = lhs.as_float().map_err(|e| respan(e, span))?;
                Ok(Value::Float(a / b))
            }
            BinaryOp::Mod => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => {
                    if *b == 0 {
                        bail_span!(span, "division by zero")
                    }
                    Ok(Value::Int(a.rem_euclid(*b)))
                }
                _ => {
                    let b = rhs.as_float().map_err(|e| respan(e, span))?;
                    if b == 0.0 {
                        bail_span!(span, "division by zero")
                    }
                    let a = lhs.as_float().map_err(|e| respan(e, span))?;
                    Ok(Value::Float(a.rem_euclid(b)))
                }
            },
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_method_call(
        &mut self,
        receiver: &Expression,
        method: &str,
        args: &[Expression],
        span: &fnk_syntax::error::Span,
    ) -> Result<Value> {
        // `math.sqrt(2)` style module calls. A local binding with the same
        // name shadows the module alias.
        if let Expression::Identifier(name, _) = receiver {
            if !self.locals.contains_key(name) && self.namespace.is_module(name) {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expression(arg)?);
                }
                return self
                    .namespace
                    .call_module(name, method, &values)
                    .map_err(|e| respan(e, span));
            }
        }

        let value = self.eval_expression(receiver)?;

        // Sequence methods that take a closure are dispatched here because
        // the closure body needs the evaluator, not just the value.
        if let [Expression::Closure { param, body, .. }] = args {
            if matches!(method, "map" | "filter" | "find" | "any" | "all") {
                let Some(items) = value.elements() else {
                    bail_span!(span, ".{}() is not supported on {}", method, value.type_name());
                };
                let items = items.to_vec();
                return self.eval_closure_method(&value, &items, method, param, body, span);
            }
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expression(arg)?);
        }
        value.call_method(method, &values).map_err(|e| respan(e, span))
    }

    fn eval_closure_method(
        &mut self,
        receiver: &Value,
        items: &[Value],
        method: &str,
        param: &str,
        body: &Expression,
        span: &fnk_syntax::error::Span,
    ) -> Result<Value> {
        let apply = |ev: &mut Self, item: &Value| -> Result<Value> {
            ev.with_bindings(vec![(param.to_string(), item.clone())], |ev| {
                ev.eval_expression(body)
            })
        };

        match method {
            "map" => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(apply(self, item)?);
                }
                Ok(rebuild(receiver, out))
            }
            "filter" => {
                let mut out = Vec::new();
                for item in items {
                    if apply(self, item)?.is_truthy() {
                        out.push(item.clone());
                    }
                }
                Ok(rebuild(receiver, out))
            }
            "find" => {
                for item in items {
                    if apply(self, item)?.is_truthy() {
                        return Ok(item.clone());
                    }
                }
                Ok(Value::Null)
            }
            "any" => {
                for item in items {
                    if apply(self, item)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "all" => {
                for item in items {
                    if !apply(self, item)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            _ => bail_span!(span, "unknown method '{}'", method),
        }
    }
}

/// Rebuilds a sequence result in the same container kind as the receiver.
fn rebuild(receiver: &Value, items: Vec<Value>) -> Value {
    match receiver {
        Value::Set(_) => Value::set_from(items),
        Value::Tuple(_) => Value::Tuple(items),
        _ => Value::List(items),
    }
}

fn eval_add(lhs: &Value, rhs: &Value, span: &fnk_syntax::error::Span) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Tuple(out))
        }
        _ => numeric(lhs, rhs, span, "+", |a, b| a + b),
    }
}

fn numeric(
    lhs: &Value,
    rhs: &Value,
    span: &fnk_syntax::error::Span,
    op: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    let (Ok(a), Ok(b)) = (lhs.as_float(), rhs.as_float()) else {
        bail_span!(
            span,
            "cannot apply '{}' to {} and {}",
            op,
            lhs.type_name(),
            rhs.type_name()
        );
    };
    Ok(Value::Float(f(a, b)))
}

fn eval_index(value: &Value, index: &Value, span: &fnk_syntax::error::Span) -> Result<Value> {
    match value {
        Value::Map(entries) => {
            let key = index.as_str().map_err(|e| respan(e, span))?;
            for (k, v) in entries {
                if *k == key {
                    return Ok(v.clone());
                }
            }
            bail_span!(span, "key '{}' not found", key)
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(index, chars.len(), span)?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
            let i = resolve_index(index, items.len(), span)?;
            Ok(items[i].clone())
        }
        other => bail_span!(span, "cannot index into {}", other.type_name()),
    }
}

/// Negative indices count from the end.
fn resolve_index(index: &Value, len: usize, span: &fnk_syntax::error::Span) -> Result<usize> {
    let Value::Int(i) = index else {
        bail_span!(span, "index must be an integer, got {}", index.type_name());
    };
    let resolved = if *i < 0 { *i + len as i64 } else { *i };
    if resolved < 0 || resolved as usize >= len {
        bail_span!(span, "index {} out of range for length {}", i, len)
    }
    Ok(resolved as usize)
}

fn respan(err: anyhow::Error, span: &fnk_syntax::error::Span) -> anyhow::Error {
    match err.downcast::<crate::error::EvalError>() {
        Ok(mut eval_err) => {
            if eval_err.span.is_none() {
                eval_err.span = Some(*span);
            }
            anyhow::anyhow!(eval_err)
        }
        Err(other) => anyhow::anyhow!(crate::error::EvalError::spanned(other.to_string(), span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, value: Value) -> Result<Value> {
        let ns = Namespace::new();
        let expr = CompiledExpr::compile(source)?;
        let mut ev = Evaluator::new(&ns);
        expr.call(&mut ev, "_", &[value])
    }

    #[test]
    fn bare_expression_binds_repr_variable() {
        let r = eval("_ * 2", Value::Int(21)).unwrap();
        assert!(r.equals(&Value::Int(42)));
    }

    #[test]
    fn named_parameter() {
        let r = eval("|x| -> x + 1", Value::Int(1)).unwrap();
        assert!(r.equals(&Value::Int(2)));
    }

    #[test]
    fn two_parameters_destructure_a_pair() {
        let pair = Value::Tuple(vec![Value::Str("k".into()), Value::Int(3)]);
        let r = eval("|k, v| -> k + ':' + v.to_str()", pair).unwrap();
        assert!(r.equals(&Value::Str("k:3".into())));
    }

    #[test]
    fn binary_fold_closure() {
        let ns = Namespace::new();
        let expr = CompiledExpr::compile("|acc, x| -> acc + x").unwrap();
        let mut ev = Evaluator::new(&ns);
        let r = expr.call(&mut ev, "_", &[Value::Int(10), Value::Int(5)]).unwrap();
        assert!(r.equals(&Value::Int(15)));
    }

    #[test]
    fn arithmetic_promotion_and_division() {
        let r = eval("_ + 0.5", Value::Int(1)).unwrap();
        assert!(r.equals(&Value::Float(1.5)));
        let r = eval("_ / 2", Value::Int(5)).unwrap();
        assert!(r.equals(&Value::Float(2.5)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = eval("1 / _", Value::Int(0)).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn comparison_and_logic() {
        let r = eval("_ > 2 and _ < 10", Value::Int(5)).unwrap();
        assert!(r.equals(&Value::Bool(true)));
        let r = eval("not (_ == 5)", Value::Int(5)).unwrap();
        assert!(r.equals(&Value::Bool(false)));
    }

    #[test]
    fn in_operator() {
        let haystack = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let ns = Namespace::new();
        let expr = CompiledExpr::compile("2 in _").unwrap();
        let mut ev = Evaluator::new(&ns);
        let r = expr.call(&mut ev, "_", &[haystack]).unwrap();
        assert!(r.equals(&Value::Bool(true)));
    }

    #[test]
    fn if_then_else() {
        let r = eval("if _ > 0 then 'pos' else 'neg'", Value::Int(-3)).unwrap();
        assert!(r.equals(&Value::Str("neg".into())));
    }

    #[test]
    fn closure_methods_on_sequences() {
        let seq = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let r = eval("_.map(|x| -> x * x)", seq.clone()).unwrap();
        assert!(r.equals(&Value::List(vec![
            Value::Int(1),
            Value::Int(4),
            Value::Int(9)
        ])));

        let r = eval("_.filter(|x| -> x > 1)", seq.clone()).unwrap();
        assert!(r.equals(&Value::List(vec![Value::Int(2), Value::Int(3)])));

        let r = eval("_.any(|x| -> x == 2)", seq.clone()).unwrap();
        assert!(r.equals(&Value::Bool(true)));

        let r = eval("_.find(|x| -> x > 5)", seq).unwrap();
        assert!(r.equals(&Value::Null));
    }

    #[test]
    fn closure_parameter_does_not_leak() {
        let seq = Value::List(vec![Value::Int(1)]);
        let err = eval("_.map(|x| -> x)[0] + x", seq).unwrap_err();
        assert!(err.to_string().contains("'x' is not defined"));
    }

    #[test]
    fn module_constant_and_call() {
        let mut ns = Namespace::new();
        ns.import("math").unwrap();
        let expr = CompiledExpr::compile("math.sqrt(_) + math.pi").unwrap();
        let mut ev = Evaluator::new(&ns);
        let r = expr.call(&mut ev, "_", &[Value::Int(4)]).unwrap();
        assert!(r.equals(&Value::Float(2.0 + std::f64::consts::PI)));
    }

    #[test]
    fn namespace_values_are_visible() {
        let mut ns = Namespace::new();
        ns.define("threshold", Value::Int(10));
        let expr = CompiledExpr::compile("_ > threshold").unwrap();
        let mut ev = Evaluator::new(&ns);
        let r = expr.call(&mut ev, "_", &[Value::Int(11)]).unwrap();
        assert!(r.equals(&Value::Bool(true)));
    }

    #[test]
    fn undefined_variable_carries_a_span() {
        let err = eval("missing + 1", Value::Int(1)).unwrap_err();
        let eval_err = err.downcast_ref::<crate::error::EvalError>().unwrap();
        assert!(eval_err.span.is_some());
    }

    #[test]
    fn indexing_with_negative_index() {
        let seq = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let r = eval("_[-1]", seq).unwrap();
        assert!(r.equals(&Value::Int(3)));
    }

    #[test]
    fn builtin_call() {
        let seq = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let r = eval("len(_)", seq).unwrap();
        assert!(r.equals(&Value::Int(2)));
    }
}
