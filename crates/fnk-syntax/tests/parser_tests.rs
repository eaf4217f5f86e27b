use fnk_syntax::ast::{BinaryOp, Expression, UnaryOp};
use fnk_syntax::{parse_closure, parse_expression};

#[test]
fn bare_expression_compiles_to_zero_param_closure() {
    let def = parse_closure("_ * 2 + 1").unwrap();
    assert!(def.params.is_empty());
    assert_eq!(def.source, "_ * 2 + 1");
}

#[test]
fn annotations_are_positional() {
    let def = parse_closure("|a: str, b: int, c| -> a").unwrap();
    let annotations = def.annotations();
    assert_eq!(annotations.len(), 3);
    assert_eq!(annotations[0].as_ref().unwrap().name, "str");
    assert_eq!(annotations[1].as_ref().unwrap().name, "int");
    assert!(annotations[2].is_none());
}

#[test]
fn logical_operators_nest_correctly() {
    // or binds looser than and
    let expr = parse_expression("true and false or true").unwrap();
    match expr {
        Expression::Binary { op, left, .. } => {
            assert_eq!(op, BinaryOp::Or);
            assert!(matches!(
                *left,
                Expression::Binary {
                    op: BinaryOp::And,
                    ..
                }
            ));
        }
        other => panic!("expected or at the root, got {:?}", other),
    }
}

#[test]
fn unary_minus_and_not() {
    let expr = parse_expression("-_").unwrap();
    assert!(matches!(
        expr,
        Expression::Unary {
            op: UnaryOp::Minus,
            ..
        }
    ));

    let expr = parse_expression("not (_ == 0)").unwrap();
    assert!(matches!(
        expr,
        Expression::Unary {
            op: UnaryOp::Not,
            ..
        }
    ));
}

#[test]
fn property_access_without_parens() {
    let expr = parse_expression("_.length").unwrap();
    match expr {
        Expression::PropertyAccess { property, .. } => assert_eq!(property, "length"),
        other => panic!("expected property access, got {:?}", other),
    }
}

#[test]
fn method_call_with_arguments() {
    let expr = parse_expression("_.replace(\"a\", \"b\")").unwrap();
    match expr {
        Expression::MethodCall { method, args, .. } => {
            assert_eq!(method, "replace");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected method call, got {:?}", other),
    }
}

#[test]
fn module_function_call_parses_as_method_on_identifier() {
    let expr = parse_expression("math.sqrt(_)").unwrap();
    match expr {
        Expression::MethodCall {
            receiver, method, ..
        } => {
            assert!(matches!(*receiver, Expression::Identifier(ref n, _) if n == "math"));
            assert_eq!(method, "sqrt");
        }
        other => panic!("expected method call, got {:?}", other),
    }
}

#[test]
fn nested_index_and_method() {
    let expr = parse_expression("_[0].upper()").unwrap();
    match expr {
        Expression::MethodCall { receiver, .. } => {
            assert!(matches!(*receiver, Expression::IndexAccess { .. }));
        }
        other => panic!("expected method call, got {:?}", other),
    }
}

#[test]
fn fold_style_binary_closure() {
    let def = parse_closure("|acc, x| -> acc + x").unwrap();
    assert_eq!(def.params.len(), 2);
    assert!(matches!(
        def.body,
        Expression::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));
}

#[test]
fn error_reports_offending_token() {
    let err = parse_expression("1 + + 2").unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("'+'"), "unexpected message: {}", msg);
}

#[test]
fn spans_cover_whole_binary_expression() {
    let expr = parse_expression("_ + 10").unwrap();
    let span = expr.span();
    assert_eq!(span.start, 0);
    assert_eq!(span.end, 6);
}
