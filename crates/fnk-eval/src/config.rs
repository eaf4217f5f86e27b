//! Run configuration and its one-time validation.
//!
//! The CLI fills a [`PipelineConfig`] with raw strings; [`resolve`] turns
//! it into compiled stages, a splitter, a record typer and a renderer.
//! Everything that can fail by configuration (unknown stage kinds, bad
//! type or container names, unparseable expressions, reserved-name
//! collisions) fails here, before any input is read.

use crate::cast::{ContainerKind, FieldType};
use crate::evaluator::{CompiledExpr, Evaluator};
use crate::namespace::Namespace;
use crate::pipeline::{Pipeline, SortKey, Stage};
use crate::render::{RenderConfig, Renderer};
use crate::split::{RecordTyper, SplitMode, Splitter};
use anyhow::{Context, Result, anyhow, bail};
use fnk_syntax::ast::TypeName;
use fnk_syntax::error::{ParseError, format_error_with_source};

/// One stage exactly as the user wrote it.
#[derive(Debug, Clone)]
pub struct RawStage {
    pub kind: String,
    pub expr: Option<String>,
}

impl RawStage {
    pub fn new(kind: impl Into<String>, expr: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            expr,
        }
    }
}

/// Raw configuration handed over by the CLI, order-preserving.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub stages: Vec<RawStage>,

    // Splitting
    pub input_separator: Option<String>,
    pub whitespace_split: bool,
    pub json_input: bool,
    pub no_split: bool,
    /// Trim each token; empty string means whitespace.
    pub standardize_input: Option<String>,
    pub field_separator: Option<String>,
    /// Explicit cast type names; overrides annotations on the first stage.
    pub types: Vec<String>,
    /// Container tag for multi-field records (`set`, `()`, ...).
    pub container: Option<String>,

    // Namespace
    pub imports: Vec<String>,
    /// `name=literal` pairs.
    pub constants: Vec<String>,
    pub repr: Option<String>,

    // Output
    pub output_separator: Option<String>,
    pub json_output: bool,
    pub json_indent: Option<usize>,
    pub sort_keys: bool,

    // Diagnostics
    pub show_filtered: bool,
    pub hide_exceptions: bool,
    pub placeholders: bool,
    pub debug: bool,

    /// Seed literal for a `fold` stage.
    pub fold_seed: Option<String>,
}

/// A fully validated run, ready to consume input.
#[derive(Debug)]
pub struct ResolvedRun {
    pub splitter: Splitter,
    pub typer: RecordTyper,
    pub pipeline: Pipeline,
    pub renderer: Renderer,
    pub show_filtered: bool,
    pub hide_exceptions: bool,
}

const REPR_DEFAULT: &str = "_";

pub fn resolve(config: PipelineConfig) -> Result<ResolvedRun> {
    let repr = config.repr.clone().unwrap_or_else(|| REPR_DEFAULT.to_string());

    let mut namespace = Namespace::new();
    for import in &config.imports {
        namespace.import(import)?;
    }
    for constant in &config.constants {
        let Some((name, literal)) = constant.split_once('=') else {
            bail!("invalid constant '{}', expected name=literal", constant);
        };
        let name = name.trim();
        if name == repr {
            bail!("'{}' is reserved for the current record", repr);
        }
        let value = eval_literal(&namespace, &repr, literal)
            .with_context(|| format!("invalid constant '{}'", constant))?;
        namespace.define(name, value);
    }
    if namespace.contains(&repr) {
        bail!("'{}' is reserved for the current record", repr);
    }

    let fold_seed = match &config.fold_seed {
        Some(literal) => Some(
            eval_literal(&namespace, &repr, literal)
                .with_context(|| format!("invalid fold seed '{}'", literal))?,
        ),
        None => None,
    };

    let default_container = ContainerKind::infer(config.container.as_deref());
    let mut stages = Vec::with_capacity(config.stages.len());
    let mut first_annotations: Option<Vec<Option<TypeName>>> = None;
    for raw in &config.stages {
        let stage = resolve_stage(raw, default_container, &fold_seed)?;
        if first_annotations.is_none() {
            if let Stage::Map(e) | Stage::Filter(e) | Stage::FilterMap(e) = &stage {
                if e.params() > 0 {
                    first_annotations = Some(e.annotations());
                }
            }
        }
        stages.push(stage);
    }

    let typer = resolve_typer(&config, default_container, first_annotations)?;
    let splitter = resolve_splitter(&config);
    let renderer = Renderer::new(RenderConfig {
        separator: config.output_separator.clone().unwrap_or_else(|| "\n".to_string()),
        json: config.json_output,
        json_indent: config.json_indent.unwrap_or(2),
        sort_keys: config.sort_keys,
        placeholders: config.placeholders,
    });

    Ok(ResolvedRun {
        splitter,
        typer,
        pipeline: Pipeline::new(stages, namespace, repr).with_debug(config.debug),
        renderer,
        show_filtered: config.show_filtered,
        hide_exceptions: config.hide_exceptions,
    })
}

fn eval_literal(namespace: &Namespace, repr: &str, literal: &str) -> Result<crate::value::Value> {
    let expr = CompiledExpr::compile(literal)?;
    let mut ev = Evaluator::new(namespace);
    // Literals may reference earlier constants and imports, but there is
    // no current record yet.
    expr.call(&mut ev, repr, &[crate::value::Value::Null])
}

/// Compiles a stage expression, rendering a caret diagnostic into the
/// error when the parser can point at the offending token.
fn compile_stage_expr(kind: &str, source: &str) -> Result<CompiledExpr> {
    CompiledExpr::compile(source).map_err(|err| {
        let span = err.downcast_ref::<ParseError>().and_then(ParseError::span);
        anyhow!(
            "invalid expression for stage '{}'\n{}",
            kind,
            format_error_with_source(&err.to_string(), source, span)
        )
    })
}

fn resolve_stage(
    raw: &RawStage,
    default_container: ContainerKind,
    fold_seed: &Option<crate::value::Value>,
) -> Result<Stage> {
    let expr = || -> Result<CompiledExpr> {
        let Some(source) = &raw.expr else {
            bail!("stage '{}' requires an expression", raw.kind);
        };
        compile_stage_expr(&raw.kind, source)
    };

    let stage = match raw.kind.as_str() {
        "map" | "m" => Stage::Map(expr()?),
        "filter" | "f" => Stage::Filter(expr()?),
        "filter_map" | "filtermap" | "fmap" => Stage::FilterMap(expr()?),
        "print" | "p" => Stage::Print,
        "collect" | "c" => {
            let kind = match raw.expr.as_deref() {
                Some(tag) => ContainerKind::infer(Some(tag)),
                None => default_container,
            };
            Stage::Collect(kind)
        }
        "expand" | "e" => Stage::Expand,
        "pop" => {
            let Some(source) = &raw.expr else {
                bail!("stage 'pop' requires 'name <- expression'");
            };
            let Some((name, body)) = source.split_once("<-") else {
                bail!("stage 'pop' requires 'name <- expression'");
            };
            Stage::Pop {
                name: name.trim().to_string(),
                expr: compile_stage_expr("pop", body.trim())?,
            }
        }
        "push" => {
            let Some(name) = &raw.expr else {
                bail!("stage 'push' requires a namespace name");
            };
            Stage::Push {
                name: name.trim().to_string(),
            }
        }
        "exec" | "apply" | "x" => Stage::Exec(expr()?),
        "sort" | "s" => match raw.expr.as_deref().map(str::trim) {
            None | Some("") => Stage::Sort(SortKey::Natural),
            Some("reverse") => Stage::Sort(SortKey::Reverse),
            Some(source) => Stage::Sort(SortKey::Expr(compile_stage_expr("sort", source)?)),
        },
        "fold" | "reduce" => Stage::Fold {
            expr: expr()?,
            seed: fold_seed.clone(),
        },
        "agg" | "aggregate" => {
            let Some(name) = &raw.expr else {
                bail!("stage 'agg' requires a reducer name");
            };
            Stage::Aggregate(name.trim().to_string())
        }
        other => bail!("'{}' is not supported", other),
    };
    Ok(stage)
}

/// Cast types come from the explicit `--type` names when given, otherwise
/// from the annotations on the first map/filter stage's parameter list.
fn resolve_typer(
    config: &PipelineConfig,
    default_container: ContainerKind,
    annotations: Option<Vec<Option<TypeName>>>,
) -> Result<RecordTyper> {
    let mut typer = RecordTyper::untyped();
    typer.field_separator = config.field_separator.clone();
    typer.container = default_container;

    if !config.types.is_empty() {
        typer.fields = config
            .types
            .iter()
            .map(|name| FieldType::from_name(name))
            .collect::<Result<Vec<_>>>()?;
        typer.sub_split = config.types.len() > 1;
        return Ok(typer);
    }

    let Some(annotations) = annotations else {
        return Ok(typer);
    };

    // A single `list[int]`-style annotation means "sub-split and cast
    // every field to the element type".
    if let [Some(TypeName {
        name,
        element: Some(element),
    })] = annotations.as_slice()
    {
        typer.container = ContainerKind::infer(Some(name));
        typer.fields = vec![FieldType::from_name(element)?];
        typer.sub_split = true;
        return Ok(typer);
    }

    let mut fields = Vec::with_capacity(annotations.len());
    for annotation in &annotations {
        let ty = match annotation {
            Some(TypeName { name, .. }) => FieldType::from_name(name)?,
            None => FieldType::Str,
        };
        fields.push(ty);
    }
    typer.sub_split = fields.len() > 1;
    typer.fields = fields;
    Ok(typer)
}

fn resolve_splitter(config: &PipelineConfig) -> Splitter {
    let mode = if config.json_input {
        SplitMode::Json
    } else if config.no_split {
        SplitMode::None
    } else if config.whitespace_split {
        SplitMode::Whitespace
    } else {
        SplitMode::Separator(
            config
                .input_separator
                .clone()
                .unwrap_or_else(|| "\n".to_string()),
        )
    };
    let mut splitter = Splitter::new(mode);
    splitter.trim = config.standardize_input.clone();
    splitter
}
