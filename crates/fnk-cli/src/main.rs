//! # fnk
//!
//! Reads records from stdin, threads them through the configured stage
//! pipeline and writes the result to stdout. Stage flags may repeat and
//! their command-line order is the pipeline order.

use anyhow::{Context, Result};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use colored::*;
use fnk::{PipelineConfig, RawStage, Status, resolve};
use std::io::Read;

#[derive(Parser)]
#[command(name = "fnk")]
#[command(about = "Transform text streams with small per-record expressions", long_about = None)]
#[command(version)]
struct Cli {
    // Stages, in command-line order.
    /// Map each record through an expression
    #[arg(short, long, value_name = "EXPR", action = ArgAction::Append)]
    map: Vec<String>,

    /// Keep only records for which the expression is truthy
    #[arg(short, long, value_name = "EXPR", action = ArgAction::Append)]
    filter: Vec<String>,

    /// Map, then drop records whose result has no content
    #[arg(long = "filter-map", value_name = "EXPR", action = ArgAction::Append)]
    filter_map: Vec<String>,

    /// Print each surviving record at this point in the pipeline
    #[arg(short, long, action = ArgAction::Count)]
    print: u8,

    /// Collect the stream into one container record (list, set, tuple)
    #[arg(short, long, value_name = "CONTAINER", action = ArgAction::Append, num_args = 0..=1, default_missing_value = "")]
    collect: Vec<String>,

    /// Split a collected record back into one record per element
    #[arg(short, long, action = ArgAction::Count)]
    expand: u8,

    /// Evaluate 'name <- expr' over the whole stream and remember it
    #[arg(long, value_name = "NAME <- EXPR", action = ArgAction::Append)]
    pop: Vec<String>,

    /// Replace the stream with a remembered value
    #[arg(long, value_name = "NAME", action = ArgAction::Append)]
    push: Vec<String>,

    /// Run an expression per record for its side effect
    #[arg(short = 'x', long, value_name = "EXPR", action = ArgAction::Append)]
    exec: Vec<String>,

    /// Sort the stream (no key: natural order; 'reverse': descending)
    #[arg(long, value_name = "KEY", action = ArgAction::Append, num_args = 0..=1, default_missing_value = "")]
    sort: Vec<String>,

    /// Left-reduce the stream with a binary expression
    #[arg(long, value_name = "EXPR", action = ArgAction::Append)]
    fold: Vec<String>,

    /// Seed value for --fold
    #[arg(long, value_name = "LITERAL")]
    seed: Option<String>,

    /// Reduce the stream with a named reducer (concat, sum, product, any, all, stats, ...)
    #[arg(short = 'a', long, value_name = "NAME", action = ArgAction::Append)]
    agg: Vec<String>,

    // Input splitting
    /// Record separator (default: newline; empty: per character)
    #[arg(short, long, value_name = "SEP")]
    separator: Option<String>,

    /// Split input on whitespace runs
    #[arg(short, long)]
    whitespace: bool,

    /// Parse the whole input as JSON
    #[arg(short = 'j', long = "json-input")]
    json_input: bool,

    /// Treat the whole input as one record
    #[arg(long = "no-split")]
    no_split: bool,

    /// Trim these characters from each record (no value: whitespace)
    #[arg(long = "standardize-input", value_name = "CHARS", num_args = 0..=1, default_missing_value = "")]
    standardize_input: Option<String>,

    /// Separator for cutting a record into typed fields
    #[arg(short = 'F', long = "field-separator", value_name = "SEP")]
    field_separator: Option<String>,

    /// Cast type per field (str, int, float, bool, ...)
    #[arg(short = 't', long = "type", value_name = "TYPE", action = ArgAction::Append)]
    types: Vec<String>,

    /// Container for multi-field records (list, set, tuple, map)
    #[arg(long, value_name = "TAG")]
    container: Option<String>,

    // Namespace
    /// Import a builtin module, optionally renamed (math, m=math, env)
    #[arg(short = 'i', long = "import", value_name = "MODULE", action = ArgAction::Append)]
    imports: Vec<String>,

    /// Define a constant as name=literal
    #[arg(long = "var", value_name = "NAME=LITERAL", action = ArgAction::Append)]
    vars: Vec<String>,

    /// Name of the current-record variable inside expressions
    #[arg(long, value_name = "NAME")]
    repr: Option<String>,

    // Output
    /// Separator between output records (default: newline)
    #[arg(short = 'o', long = "output-separator", value_name = "SEP")]
    output_separator: Option<String>,

    /// Render the result as JSON
    #[arg(short = 'J', long = "json-output")]
    json_output: bool,

    /// JSON indentation width (0: compact)
    #[arg(long = "json-indent", value_name = "N")]
    json_indent: Option<usize>,

    /// Sort JSON object keys
    #[arg(long = "sort-keys")]
    sort_keys: bool,

    // Diagnostics
    /// Report filtered records on stderr
    #[arg(long = "show-filtered")]
    show_filtered: bool,

    /// Suppress per-record error reports on stderr
    #[arg(long = "hide-exceptions")]
    hide_exceptions: bool,

    /// Emit an empty output line for each errored or filtered record
    #[arg(long)]
    placeholders: bool,

    /// Trace each map through a stage on stderr
    #[arg(long)]
    debug: bool,
}

fn main() {
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    if let Err(err) = run(cli, &matches) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn run(cli: Cli, matches: &ArgMatches) -> Result<()> {
    let config = build_config(&cli, matches);
    let resolved = resolve(config)?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    let records = resolved.splitter.split(&input)?;
    let records: Vec<_> = records
        .into_iter()
        .map(|r| resolved.typer.apply(r))
        .collect();
    let outcome = resolved.pipeline.run(records)?;

    for record in outcome.terminal() {
        let Some(diagnostic) = &record.diagnostic else {
            continue;
        };
        match record.status {
            Status::Filtered if resolved.show_filtered => {
                eprintln!("{}", diagnostic.yellow());
            }
            Status::Error if !resolved.hide_exceptions => {
                eprintln!("{}", diagnostic.red());
            }
            _ => {}
        }
    }

    if let Some(output) = resolved.renderer.render(&outcome.records) {
        println!("{}", output);
    }
    Ok(())
}

/// Rebuilds the pipeline order from argument indices: clap groups repeated
/// options by flag, but the stage list must follow the command line.
fn build_config(cli: &Cli, matches: &ArgMatches) -> PipelineConfig {
    let mut stages: Vec<(usize, RawStage)> = Vec::new();

    let mut exprs = |id: &str, kind: &str, values: &[String]| {
        let indices = matches.indices_of(id).into_iter().flatten();
        for (idx, value) in indices.zip(values) {
            let expr = if value.is_empty() {
                None
            } else {
                Some(value.clone())
            };
            stages.push((idx, RawStage::new(kind, expr)));
        }
    };
    exprs("map", "map", &cli.map);
    exprs("filter", "filter", &cli.filter);
    exprs("filter_map", "filter_map", &cli.filter_map);
    exprs("collect", "collect", &cli.collect);
    exprs("pop", "pop", &cli.pop);
    exprs("push", "push", &cli.push);
    exprs("exec", "exec", &cli.exec);
    exprs("sort", "sort", &cli.sort);
    exprs("fold", "fold", &cli.fold);
    exprs("agg", "agg", &cli.agg);

    let mut flags = |id: &str, kind: &str, count: u8| {
        let indices = matches.indices_of(id).into_iter().flatten();
        for idx in indices.take(count as usize) {
            stages.push((idx, RawStage::new(kind, None)));
        }
    };
    flags("print", "print", cli.print);
    flags("expand", "expand", cli.expand);

    stages.sort_by_key(|(idx, _)| *idx);

    PipelineConfig {
        stages: stages.into_iter().map(|(_, stage)| stage).collect(),
        input_separator: cli.separator.clone(),
        whitespace_split: cli.whitespace,
        json_input: cli.json_input,
        no_split: cli.no_split,
        standardize_input: cli.standardize_input.clone(),
        field_separator: cli.field_separator.clone(),
        types: cli.types.clone(),
        container: cli.container.clone(),
        imports: cli.imports.clone(),
        constants: cli.vars.clone(),
        repr: cli.repr.clone(),
        output_separator: cli.output_separator.clone(),
        json_output: cli.json_output,
        json_indent: cli.json_indent,
        sort_keys: cli.sort_keys,
        show_filtered: cli.show_filtered,
        hide_exceptions: cli.hide_exceptions,
        placeholders: cli.placeholders,
        debug: cli.debug,
        fold_seed: cli.seed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(args: &[&str]) -> PipelineConfig {
        let matches = Cli::command().get_matches_from(args);
        let cli = Cli::from_arg_matches(&matches).unwrap();
        build_config(&cli, &matches)
    }

    #[test]
    fn stage_order_follows_the_command_line() {
        let config = config_for(&[
            "fnk", "--filter", "_ > 1", "--map", "_ * 2", "--filter", "_ < 10",
        ]);
        let kinds: Vec<&str> = config.stages.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["filter", "map", "filter"]);
        assert_eq!(config.stages[1].expr.as_deref(), Some("_ * 2"));
        assert_eq!(config.stages[2].expr.as_deref(), Some("_ < 10"));
    }

    #[test]
    fn flag_stages_interleave_with_expression_stages() {
        let config = config_for(&["fnk", "--collect", "--print", "--expand"]);
        let kinds: Vec<&str> = config.stages.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["collect", "print", "expand"]);
        assert_eq!(config.stages[0].expr, None);
    }

    #[test]
    fn collect_takes_an_optional_container_tag() {
        let config = config_for(&["fnk", "--collect", "set"]);
        assert_eq!(config.stages[0].expr.as_deref(), Some("set"));
    }

    #[test]
    fn sort_without_key_is_natural_order() {
        let config = config_for(&["fnk", "--sort"]);
        assert_eq!(config.stages[0].kind, "sort");
        assert_eq!(config.stages[0].expr, None);
    }

    #[test]
    fn split_and_output_flags_carry_over() {
        let config = config_for(&[
            "fnk",
            "-w",
            "-t",
            "int",
            "--json-output",
            "--json-indent",
            "4",
            "--var",
            "k=2",
        ]);
        assert!(config.whitespace_split);
        assert_eq!(config.types, vec!["int"]);
        assert!(config.json_output);
        assert_eq!(config.json_indent, Some(4));
        assert_eq!(config.constants, vec!["k=2"]);
    }
}
