use anyhow::Result;
use fnk_eval::{PipelineConfig, RawStage, resolve};

/// Runs a full configured pass over `input` and returns the stdout
/// payload (None when nothing survives).
fn run(config: PipelineConfig, input: &str) -> Result<Option<String>> {
    let resolved = resolve(config)?;
    let records = resolved.splitter.split(input)?;
    let records: Vec<_> = records
        .into_iter()
        .map(|r| resolved.typer.apply(r))
        .collect();
    let outcome = resolved.pipeline.run(records)?;
    Ok(resolved.renderer.render(&outcome.records))
}

fn stages(pairs: &[(&str, &str)]) -> Vec<RawStage> {
    pairs
        .iter()
        .map(|(kind, expr)| {
            let expr = if expr.is_empty() {
                None
            } else {
                Some(expr.to_string())
            };
            RawStage::new(*kind, expr)
        })
        .collect()
}

#[test]
fn test_map_doubles_in_order() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("map", "|x: int| -> x * 2")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "3\n1\n2")?.unwrap(), "6\n2\n4");
    Ok(())
}

#[test]
fn test_filter_keeps_even_records() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("filter", "|x: int| -> x % 2 == 0")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "1\n2\n3\n4")?.unwrap(), "2\n4");
    Ok(())
}

#[test]
fn test_filtered_records_carry_diagnostics() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("filter", "|x: int| -> x % 2 == 0")]),
        ..PipelineConfig::default()
    };
    let resolved = resolve(config)?;
    let records: Vec<_> = resolved
        .splitter
        .split("1\n2\n3\n4")?
        .into_iter()
        .map(|r| resolved.typer.apply(r))
        .collect();
    let outcome = resolved.pipeline.run(records)?;
    let diags: Vec<String> = outcome
        .terminal()
        .map(|r| r.diagnostic.clone().unwrap())
        .collect();
    assert_eq!(diags.len(), 2);
    assert!(diags[0].contains("Filtered: 1"));
    assert!(diags[1].contains("Filtered: 3"));
    assert!(diags[0].contains("Stage: filter"));
    Ok(())
}

#[test]
fn test_json_input_concat_aggregate() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("agg", "concat")]),
        json_input: true,
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, r#"["a","bb","ccc"]"#)?.unwrap(), "abbccc");
    Ok(())
}

#[test]
fn test_division_by_zero_isolates_one_record() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("map", "|x: int| -> 10 / x")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "2\n0\n5")?.unwrap(), "5.0\n2.0");
    Ok(())
}

#[test]
fn test_collect_expand_identity() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("collect", ""), ("expand", "")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "a\nb\nc")?.unwrap(), "a\nb\nc");
    Ok(())
}

#[test]
fn test_set_collect_drops_duplicates() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("collect", "set"), ("expand", "")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "a\nb\na")?.unwrap(), "a\nb");
    Ok(())
}

#[test]
fn test_sort_natural_and_reverse() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("sort", "")]),
        types: vec!["int".to_string()],
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "3\n1\n2")?.unwrap(), "1\n2\n3");

    let config = PipelineConfig {
        stages: stages(&[("sort", "reverse")]),
        types: vec!["int".to_string()],
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "3\n1\n2")?.unwrap(), "3\n2\n1");
    Ok(())
}

#[test]
fn test_sort_by_key_is_stable() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("sort", "_.len()")]),
        ..PipelineConfig::default()
    };
    // bb and dd share a key and keep their input order.
    assert_eq!(run(config, "bb\na\ndd\nc")?.unwrap(), "a\nc\nbb\ndd");
    Ok(())
}

#[test]
fn test_fold_with_seed() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("fold", "|acc, x| -> acc + x")]),
        types: vec!["int".to_string()],
        fold_seed: Some("100".to_string()),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "1\n2\n3")?.unwrap(), "106");
    Ok(())
}

#[test]
fn test_fold_without_seed_over_empty_input_is_fatal() {
    let config = PipelineConfig {
        stages: stages(&[("fold", "|acc, x| -> acc + x")]),
        ..PipelineConfig::default()
    };
    assert!(run(config, "").is_err());
}

#[test]
fn test_chained_groups_preserve_survivor_count() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[
            ("map", "|x: int| -> x + 1"),
            ("filter", "_ > 2"),
            ("map", "_ * 10"),
        ]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "1\n2\n3")?.unwrap(), "30\n40");
    Ok(())
}

#[test]
fn test_typed_sub_split_into_tuples() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("map", "|name: str, age: int| -> age")]),
        field_separator: Some(",".to_string()),
        container: Some("tuple".to_string()),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "ann,34\nbob,2")?.unwrap(), "34\n2");
    Ok(())
}

#[test]
fn test_filter_map_drops_contentless_results() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("filter_map", "_.trim()")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "  a \n   \nb")?.unwrap(), "a\nb");
    Ok(())
}

#[test]
fn test_pop_and_push_share_the_namespace() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("pop", "n <- _.len()"), ("push", "n")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "a\nb\nc")?.unwrap(), "3");
    Ok(())
}

#[test]
fn test_imports_and_constants_in_expressions() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("map", "|x: float| -> math.floor(x * scale)")]),
        imports: vec!["math".to_string()],
        constants: vec!["scale=10".to_string()],
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "1.26\n0.5")?.unwrap(), "12\n5");
    Ok(())
}

#[test]
fn test_placeholders_keep_line_correspondence() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("filter", "|x: int| -> x > 1")]),
        placeholders: true,
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "1\n2\n3")?.unwrap(), "\n2\n3");
    Ok(())
}

#[test]
fn test_json_output_of_pairs() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[]),
        json_input: true,
        json_output: true,
        json_indent: Some(0),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, r#"{"b":2,"a":1}"#)?.unwrap(), r#"{"b":2,"a":1}"#);
    Ok(())
}

#[test]
fn test_json_output_sort_keys() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[]),
        json_input: true,
        json_output: true,
        json_indent: Some(0),
        sort_keys: true,
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, r#"{"b":2,"a":1}"#)?.unwrap(), r#"{"a":1,"b":2}"#);
    Ok(())
}

#[test]
fn test_whitespace_split_mode() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("map", "|x: int| -> x + 1")]),
        whitespace_split: true,
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, " 1\t2 \n3 ")?.unwrap(), "2\n3\n4");
    Ok(())
}

#[test]
fn test_empty_input_produces_no_output() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("map", "_ + 1")]),
        ..PipelineConfig::default()
    };
    assert_eq!(run(config, "")?, None);
    Ok(())
}

#[test]
fn test_aggregate_stats_report() -> Result<()> {
    let config = PipelineConfig {
        stages: stages(&[("agg", "stats")]),
        types: vec!["int".to_string()],
        ..PipelineConfig::default()
    };
    let out = run(config, "1\n2\n2")?.unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("Mean   -> "));
    assert!(lines[1].starts_with("Median -> "));
    assert!(lines[2].starts_with("Mode   -> "));
    assert!(lines[3].starts_with("Stdev  -> "));
    assert!(lines[4].starts_with("Var    -> "));
    Ok(())
}

#[test]
fn test_stats_over_a_single_value_is_fatal() {
    let config = PipelineConfig {
        stages: stages(&[("agg", "stats")]),
        types: vec!["int".to_string()],
        ..PipelineConfig::default()
    };
    assert!(run(config, "5").is_err());
}

#[test]
fn test_malformed_json_input_is_fatal() {
    let config = PipelineConfig {
        stages: stages(&[]),
        json_input: true,
        ..PipelineConfig::default()
    };
    assert!(run(config, "{oops").is_err());
}
