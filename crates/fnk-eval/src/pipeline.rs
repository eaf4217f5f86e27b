//! The stage pipeline state machine.
//!
//! Stages run in the exact order configured. Consecutive per-record stages
//! (map/filter/filter_map/exec/print) form a group: each record runs
//! through the whole group before the next record starts, and exits the
//! group at the first error or filter. Barrier stages (collect, expand,
//! sort, fold, aggregate, pop, push) see the entire surviving stream.

use crate::cast::{ContainerKind, try_literal};
use crate::error::EvalError;
use crate::evaluator::{CompiledExpr, Evaluator};
use crate::namespace::Namespace;
use crate::record::Record;
use crate::value::Value;
use anyhow::{Result, bail};
use colored::Colorize;
use fnk_syntax::error::format_error_with_source;

/// One configured pipeline step.
#[derive(Debug, Clone)]
pub enum Stage {
    Map(CompiledExpr),
    Filter(CompiledExpr),
    /// Maps the expression, then keeps only records whose result has
    /// content under [`Value::has_content`].
    FilterMap(CompiledExpr),
    /// Writes each surviving value to stdout as it passes through.
    Print,
    /// Barrier: folds the surviving stream into one container record.
    Collect(ContainerKind),
    /// Barrier: splits each iterable record back into element records.
    Expand,
    /// Evaluates `expr` with the whole surviving collection bound to the
    /// representation variable and stores the result in the namespace.
    Pop { name: String, expr: CompiledExpr },
    /// Replaces the stream with the single named namespace value.
    Push { name: String },
    /// Side-effecting per-record statement; the value is discarded.
    Exec(CompiledExpr),
    Sort(SortKey),
    Fold {
        expr: CompiledExpr,
        seed: Option<Value>,
    },
    Aggregate(String),
}

#[derive(Debug, Clone)]
pub enum SortKey {
    Natural,
    /// The literal key `reverse`: descending natural order.
    Reverse,
    Expr(CompiledExpr),
}

impl Stage {
    fn is_per_record(&self) -> bool {
        matches!(
            self,
            Stage::Map(_) | Stage::Filter(_) | Stage::FilterMap(_) | Stage::Print | Stage::Exec(_)
        )
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Stage::Map(_) => "map",
            Stage::Filter(_) => "filter",
            Stage::FilterMap(_) => "filter_map",
            Stage::Print => "print",
            Stage::Collect(_) => "collect",
            Stage::Expand => "expand",
            Stage::Pop { .. } => "pop",
            Stage::Push { .. } => "push",
            Stage::Exec(_) => "exec",
            Stage::Sort(_) => "sort",
            Stage::Fold { .. } => "fold",
            Stage::Aggregate(_) => "aggregate",
        }
    }

    fn expr_source(&self) -> &str {
        match self {
            Stage::Map(e) | Stage::Filter(e) | Stage::FilterMap(e) | Stage::Exec(e) => e.source(),
            Stage::Pop { expr, .. } => expr.source(),
            Stage::Fold { expr, .. } => expr.source(),
            Stage::Sort(SortKey::Expr(e)) => e.source(),
            Stage::Sort(SortKey::Reverse) => "reverse",
            Stage::Aggregate(name) => name,
            _ => "",
        }
    }
}

/// What a full run leaves behind.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The final stream, in order. Errored and filtered records that no
    /// barrier consumed are still here so the caller can route them to
    /// stderr or emit placeholders in position.
    pub records: Vec<Record>,
    /// Terminal records a barrier stage removed from the stream.
    pub consumed: Vec<Record>,
}

impl PipelineOutcome {
    /// Surviving values, in order.
    pub fn values(&self) -> Vec<&Value> {
        self.records
            .iter()
            .filter(|r| r.is_valid())
            .map(|r| &r.value)
            .collect()
    }

    /// Every errored or filtered record, wherever it ended up.
    pub fn terminal(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .chain(self.consumed.iter())
            .filter(|r| !r.is_valid())
    }
}

#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    namespace: Namespace,
    repr: String,
    debug: bool,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>, namespace: Namespace, repr: impl Into<String>) -> Self {
        Self {
            stages,
            namespace,
            repr: repr.into(),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn run(mut self, records: Vec<Record>) -> Result<PipelineOutcome> {
        let mut stream = records;
        let mut consumed = Vec::new();

        let stages = std::mem::take(&mut self.stages);
        let mut i = 0;
        while i < stages.len() {
            if stages[i].is_per_record() {
                let mut j = i;
                while j < stages.len() && stages[j].is_per_record() {
                    j += 1;
                }
                self.run_group(&stages[i..j], &mut stream)?;
                i = j;
            } else {
                self.run_barrier(&stages[i], &mut stream, &mut consumed)?;
                i += 1;
            }
        }

        Ok(PipelineOutcome {
            records: stream,
            consumed,
        })
    }

    /// Threads each record through a contiguous run of per-record stages.
    /// A record exits the group at its first error or filter.
    fn run_group(&mut self, group: &[Stage], stream: &mut [Record]) -> Result<()> {
        for record in stream.iter_mut() {
            for stage in group {
                if !record.is_valid() {
                    break;
                }
                self.apply_per_record(stage, record)?;
            }
        }
        Ok(())
    }

    fn apply_per_record(&mut self, stage: &Stage, record: &mut Record) -> Result<()> {
        match stage {
            Stage::Map(expr) => match self.eval(expr, &record.value) {
                Ok(value) => {
                    self.trace(stage, &record.value, &value);
                    record.value = value;
                }
                Err(err) => self.error_out(record, stage, err),
            },
            Stage::Filter(expr) => match self.eval(expr, &record.value) {
                Ok(result) => {
                    if !result.is_truthy() {
                        record.filter_out(format!(
                            "Filtered: {}; Init: {}; Stage: filter {}",
                            record.value.display(),
                            record.init,
                            stage.expr_source()
                        ));
                    }
                }
                Err(err) => self.error_out(record, stage, err),
            },
            Stage::FilterMap(expr) => match self.eval(expr, &record.value) {
                Ok(result) => {
                    if result.has_content() {
                        self.trace(stage, &record.value, &result);
                        record.value = result;
                    } else {
                        record.filter_out(format!(
                            "Filtered: {}; Init: {}; Stage: filter_map {}",
                            record.value.display(),
                            record.init,
                            stage.expr_source()
                        ));
                    }
                }
                Err(err) => self.error_out(record, stage, err),
            },
            Stage::Print => {
                println!("{}", record.value.display());
            }
            Stage::Exec(expr) => {
                if let Err(err) = self.eval(expr, &record.value) {
                    self.error_out(record, stage, err);
                }
            }
            _ => unreachable!("barrier stage in a per-record group"),
        }
        Ok(())
    }

    fn run_barrier(
        &mut self,
        stage: &Stage,
        stream: &mut Vec<Record>,
        consumed: &mut Vec<Record>,
    ) -> Result<()> {
        match stage {
            Stage::Collect(kind) => {
                let values = self.drain_valid(stream, consumed);
                *stream = vec![Record::synthetic(kind.assemble(values))];
            }
            Stage::Expand => {
                let records = std::mem::take(stream);
                for record in records {
                    if !record.is_valid() {
                        consumed.push(record);
                        continue;
                    }
                    match &record.value {
                        Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                            stream.extend(items.iter().cloned().map(Record::synthetic));
                        }
                        Value::Map(entries) => {
                            stream.extend(entries.iter().map(|(k, v)| {
                                Record::synthetic(Value::Tuple(vec![
                                    Value::Str(k.clone()),
                                    v.clone(),
                                ]))
                            }));
                        }
                        other => {
                            bail!("cannot expand {}", other.type_name())
                        }
                    }
                }
            }
            Stage::Pop { name, expr } => {
                let values: Vec<Value> = stream
                    .iter()
                    .filter(|r| r.is_valid())
                    .map(|r| r.value.clone())
                    .collect();
                let mut ev = Evaluator::new(&self.namespace);
                let result = expr.call(&mut ev, &self.repr, &[Value::List(values)])?;
                self.namespace.define(name.clone(), result);
            }
            Stage::Push { name } => {
                let Some(value) = self.namespace.get(name) else {
                    bail!("'{}' is not defined in the namespace", name);
                };
                let value = value.clone();
                consumed.extend(stream.drain(..));
                *stream = vec![Record::synthetic(value)];
            }
            Stage::Sort(key) => self.sort_stream(key, stream, consumed)?,
            Stage::Fold { expr, seed } => {
                let values = self.drain_valid(stream, consumed);
                let mut acc = seed.clone();
                for value in values {
                    acc = Some(match acc {
                        None => value,
                        Some(current) => {
                            let mut ev = Evaluator::new(&self.namespace);
                            expr.call(&mut ev, &self.repr, &[current, value])?
                        }
                    });
                }
                let Some(result) = acc else {
                    bail!("fold over an empty stream with no seed");
                };
                *stream = vec![Record::synthetic(result)];
            }
            Stage::Aggregate(name) => {
                let values = self.drain_valid(stream, consumed);
                let result = self.aggregate(name, values)?;
                *stream = vec![Record::synthetic(result)];
            }
            _ => unreachable!("per-record stage used as a barrier"),
        }
        Ok(())
    }

    /// Pulls the surviving values out of the stream, routing terminal
    /// records to `consumed`.
    fn drain_valid(&self, stream: &mut Vec<Record>, consumed: &mut Vec<Record>) -> Vec<Value> {
        let mut values = Vec::with_capacity(stream.len());
        for record in stream.drain(..) {
            if record.is_valid() {
                values.push(record.value);
            } else {
                consumed.push(record);
            }
        }
        values
    }

    fn sort_stream(
        &self,
        key: &SortKey,
        stream: &mut Vec<Record>,
        consumed: &mut Vec<Record>,
    ) -> Result<()> {
        let records = std::mem::take(stream);
        let mut keyed: Vec<(Value, Record)> = Vec::with_capacity(records.len());
        for record in records {
            if !record.is_valid() {
                consumed.push(record);
                continue;
            }
            let sort_key = match key {
                SortKey::Natural | SortKey::Reverse => record.value.clone(),
                SortKey::Expr(expr) => {
                    let mut ev = Evaluator::new(&self.namespace);
                    expr.call(&mut ev, &self.repr, &[record.value.clone()])?
                }
            };
            keyed.push((sort_key, record));
        }

        // sort_by cannot propagate errors, so the first incomparable pair
        // is remembered and surfaced afterwards.
        let mut sort_err: Option<anyhow::Error> = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let ord = match a.compare(b) {
                Ok(ord) => ord,
                Err(err) => {
                    sort_err.get_or_insert(err);
                    std::cmp::Ordering::Equal
                }
            };
            if matches!(key, SortKey::Reverse) {
                ord.reverse()
            } else {
                ord
            }
        });
        if let Some(err) = sort_err {
            return Err(err);
        }

        *stream = keyed.into_iter().map(|(_, record)| record).collect();
        Ok(())
    }

    fn aggregate(&self, name: &str, values: Vec<Value>) -> Result<Value> {
        match name {
            "concat" => {
                let parts: Vec<String> = values.iter().map(|v| v.display()).collect();
                Ok(Value::Str(parts.concat()))
            }
            "sum" => crate::builtins::builtin_sum(&[Value::List(values)]),
            "product" => {
                let mut acc = Value::Int(1);
                for value in values {
                    acc = match (&acc, &value) {
                        (Value::Int(a), Value::Int(b)) => Value::Int(a * b),
                        _ => Value::Float(acc.as_float()? * value.as_float()?),
                    };
                }
                Ok(acc)
            }
            "any" => Ok(Value::Bool(
                values.iter().any(|v| try_literal(v).is_truthy()),
            )),
            "all" => Ok(Value::Bool(
                values.iter().all(|v| try_literal(v).is_truthy()),
            )),
            "stats" => stats_report(&values),
            other => {
                let registry = crate::builtins::BuiltinRegistry::new();
                match registry.call(other, &[Value::List(values)])? {
                    Some(result) => Ok(result),
                    None => bail!("'{}' is not supported", other),
                }
            }
        }
    }

    fn eval(&self, expr: &CompiledExpr, value: &Value) -> Result<Value> {
        let mut ev = Evaluator::new(&self.namespace);
        expr.call(&mut ev, &self.repr, std::slice::from_ref(value))
    }

    fn error_out(&self, record: &mut Record, stage: &Stage, err: anyhow::Error) {
        if self.debug {
            if let Some(eval_err) = err.downcast_ref::<EvalError>() {
                eprintln!(
                    "{}",
                    format_error_with_source(
                        &eval_err.message,
                        stage.expr_source(),
                        eval_err.span
                    )
                    .dimmed()
                );
            }
        }
        record.fail(format!(
            "Error: {}; Init: {}; Stage: {} {}",
            err,
            record.init,
            stage.kind_name(),
            stage.expr_source()
        ));
    }

    fn trace(&self, stage: &Stage, before: &Value, after: &Value) {
        if self.debug {
            eprintln!(
                "{}",
                format!(
                    "[trace] {} {}: {} -> {}",
                    stage.kind_name(),
                    stage.expr_source(),
                    before.display(),
                    after.display()
                )
                .dimmed()
            );
        }
    }
}

/// Fixed-format multi-line statistics report. Run-fatal on non-numeric
/// input or fewer than two values (sample stdev and variance need two).
fn stats_report(values: &[Value]) -> Result<Value> {
    if values.len() < 2 {
        bail!("stats needs at least two values, got {}", values.len());
    }
    let mut nums = Vec::with_capacity(values.len());
    for value in values {
        match value.as_float() {
            Ok(n) => nums.push(n),
            Err(_) => bail!("stats over non-numeric data: {}", value.display()),
        }
    }

    let n = nums.len() as f64;
    let mean = nums.iter().sum::<f64>() / n;

    let mut sorted = nums.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    // Most frequent value; first occurrence wins ties.
    let mut mode = nums[0];
    let mut best_count = 0;
    for &candidate in &nums {
        let count = nums.iter().filter(|&&x| x == candidate).count();
        if count > best_count {
            best_count = count;
            mode = candidate;
        }
    }

    let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);

    let fmt = |x: f64| Value::Float(x).display();
    Ok(Value::Str(format!(
        "Mean   -> {}\nMedian -> {}\nMode   -> {}\nStdev  -> {}\nVar    -> {}",
        fmt(mean),
        fmt(median),
        fmt(mode),
        fmt(var.sqrt()),
        fmt(var)
    )))
}
