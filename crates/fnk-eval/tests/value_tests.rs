use anyhow::Result;
use fnk_eval::value::Value;

#[test]
fn test_value_truthy() {
    assert!(Value::Bool(true).is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Str("hello".to_string()).is_truthy());
    assert!(!Value::Str(String::new()).is_truthy());
    assert!(Value::Int(1).is_truthy());
    assert!(!Value::Int(0).is_truthy());
    assert!(!Value::Float(0.0).is_truthy());
    assert!(!Value::Null.is_truthy());
    assert!(!Value::List(vec![]).is_truthy());
    assert!(Value::List(vec![Value::Int(0)]).is_truthy());
}

#[test]
fn test_has_content_scalars() {
    assert!(!Value::Null.has_content());
    assert!(!Value::Str(String::new()).has_content());
    assert!(Value::Str(" ".to_string()).has_content());
    assert!(Value::Int(0).has_content());
    assert!(Value::Float(0.0).has_content());
    assert!(Value::Bool(false).has_content());
}

#[test]
fn test_has_content_containers() {
    // An empty container has content; a container with any contentless
    // child does not.
    assert!(Value::List(vec![]).has_content());
    assert!(Value::List(vec![Value::Int(1)]).has_content());
    assert!(!Value::List(vec![Value::Int(1), Value::Null]).has_content());
    assert!(!Value::List(vec![Value::Str(String::new())]).has_content());
    assert!(
        !Value::List(vec![Value::List(vec![Value::Null])]).has_content()
    );
    assert!(Value::Map(vec![("k".to_string(), Value::Int(1))]).has_content());
    assert!(!Value::Map(vec![("k".to_string(), Value::Null)]).has_content());
}

#[test]
fn test_int_float_cross_equality() {
    assert!(Value::Int(2).equals(&Value::Float(2.0)));
    assert!(!Value::Int(2).equals(&Value::Float(2.5)));
    assert!(!Value::Int(2).equals(&Value::Str("2".to_string())));
}

#[test]
fn test_compare_orders_numbers_and_strings() -> Result<()> {
    use std::cmp::Ordering;
    assert_eq!(Value::Int(1).compare(&Value::Int(2))?, Ordering::Less);
    assert_eq!(Value::Int(3).compare(&Value::Float(2.5))?, Ordering::Greater);
    assert_eq!(
        Value::Str("a".to_string()).compare(&Value::Str("b".to_string()))?,
        Ordering::Less
    );
    assert!(Value::Int(1).compare(&Value::Str("a".to_string())).is_err());
    Ok(())
}

#[test]
fn test_string_methods() -> Result<()> {
    let s = Value::Str("Hello World".to_string());
    assert!(s.call_method("lower", &[])?.equals(&Value::Str("hello world".into())));
    assert!(s.call_method("contains", &[Value::Str("World".into())])?.equals(&Value::Bool(true)));
    assert!(
        s.call_method("replace", &[Value::Str("World".into()), Value::Str("there".into())])?
            .equals(&Value::Str("Hello there".into()))
    );
    let parts = s.call_method("split", &[Value::Str(" ".into())])?;
    assert!(parts.equals(&Value::List(vec![
        Value::Str("Hello".into()),
        Value::Str("World".into())
    ])));
    Ok(())
}

#[test]
fn test_string_matches_regex() -> Result<()> {
    let s = Value::Str("v1.2.3".to_string());
    let r = s.call_method("matches", &[Value::Str(r"^v\d+\.\d+\.\d+$".into())])?;
    assert!(r.equals(&Value::Bool(true)));
    Ok(())
}

#[test]
fn test_numeric_conversions() -> Result<()> {
    assert!(Value::Str("42".into()).call_method("to_int", &[])?.equals(&Value::Int(42)));
    assert!(Value::Int(3).call_method("to_float", &[])?.equals(&Value::Float(3.0)));
    assert!(Value::Float(2.7).call_method("floor", &[])?.equals(&Value::Int(2)));
    assert!(Value::Str("x".into()).call_method("to_int", &[]).is_err());
    Ok(())
}

#[test]
fn test_sequence_methods() -> Result<()> {
    let seq = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
    assert!(seq.call_method("len", &[])?.equals(&Value::Int(3)));
    assert!(seq.call_method("first", &[])?.equals(&Value::Int(3)));
    assert!(seq.call_method("last", &[])?.equals(&Value::Int(2)));
    assert!(seq.call_method("sort", &[])?.equals(&Value::List(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(3)
    ])));
    assert!(seq.call_method("contains", &[Value::Int(2)])?.equals(&Value::Bool(true)));
    Ok(())
}

#[test]
fn test_join_stringifies_elements() -> Result<()> {
    let seq = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
    let joined = seq.call_method("join", &[Value::Str("-".into())])?;
    assert!(joined.equals(&Value::Str("1-a".into())));
    Ok(())
}

#[test]
fn test_display_formats() {
    assert_eq!(Value::Float(2.0).display(), "2.0");
    assert_eq!(Value::Float(2.5).display(), "2.5");
    assert_eq!(Value::Int(2).display(), "2");
    assert_eq!(
        Value::Tuple(vec![Value::Str("a".into()), Value::Int(1)]).display(),
        "(a, 1)"
    );
    assert_eq!(
        Value::Set(vec![Value::Int(1), Value::Int(2)]).display(),
        "{1, 2}"
    );
}

#[test]
fn test_set_from_deduplicates_in_order() {
    let set = Value::set_from(vec![
        Value::Int(2),
        Value::Int(1),
        Value::Int(2),
        Value::Float(1.0),
    ]);
    assert!(set.equals(&Value::Set(vec![Value::Int(2), Value::Int(1)])));
}

#[test]
fn test_map_property_and_methods() -> Result<()> {
    let map = Value::Map(vec![
        ("name".to_string(), Value::Str("ann".into())),
        ("age".to_string(), Value::Int(34)),
    ]);
    assert!(map.get_property("name")?.equals(&Value::Str("ann".into())));
    assert!(map.call_method("len", &[])?.equals(&Value::Int(2)));
    let keys = map.call_method("keys", &[])?;
    assert!(keys.equals(&Value::List(vec![
        Value::Str("name".into()),
        Value::Str("age".into())
    ])));
    Ok(())
}

#[test]
fn test_unknown_method_is_an_error() {
    let s = Value::Str("x".to_string());
    assert!(s.call_method("frobnicate", &[]).is_err());
}
