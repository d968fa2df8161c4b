use super::*;
use crate::ast::*;

fn parse(source: &str) -> Module {
    parse_program(source).expect("source should parse")
}

fn only_expr(source: &str) -> Expr {
    match parse(source).body.as_slice() {
        [Stmt::Expr { value }] => value.clone(),
        other => panic!("expected a single expression statement, got {:?}", other),
    }
}

#[test]
fn test_create_parser() {
    let mut parser = create_parser("python").unwrap();
    assert_eq!(parser.name(), "python");
    let module = parser.parse_program("x = 1\n").unwrap();
    assert_eq!(module.body.len(), 1);

    assert!(matches!(
        create_parser("moo"),
        Err(ParseError::UnknownParser(kind)) if kind == "moo"
    ));
}

#[test]
fn test_parse_assignment_and_subscript() {
    let module = parse("x = a[1]\n");
    assert_eq!(
        module.body,
        vec![Stmt::Assign {
            targets: vec![Expr::name("x")],
            value: Expr::subscript(Expr::name("a"), Expr::int(1)),
        }]
    );
}

#[test]
fn test_parse_chained_assignment() {
    match parse("a = b = 3\n").body.as_slice() {
        [Stmt::Assign { targets, value }] => {
            assert_eq!(targets, &vec![Expr::name("a"), Expr::name("b")]);
            assert_eq!(value, &Expr::int(3));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_slices() {
    let expr = only_expr("s[1:]\n");
    assert_eq!(
        expr,
        Expr::subscript(
            Expr::name("s"),
            Expr::Slice {
                lower: Some(Box::new(Expr::int(1))),
                upper: None,
                step: None,
            }
        )
    );

    match only_expr("s[::-1]\n") {
        Expr::Subscript { slice, .. } => match *slice {
            Expr::Slice { lower, upper, step } => {
                assert!(lower.is_none());
                assert!(upper.is_none());
                assert!(matches!(
                    step.as_deref(),
                    Some(Expr::UnaryOp {
                        op: UnaryOp::USub,
                        ..
                    })
                ));
            }
            other => panic!("expected slice, got {:?}", other),
        },
        other => panic!("expected subscript, got {:?}", other),
    }
}

#[test]
fn test_parse_tuple_subscript() {
    match only_expr("m[1, 2]\n") {
        Expr::Subscript { slice, .. } => {
            assert_eq!(*slice, Expr::tuple(vec![Expr::int(1), Expr::int(2)]))
        }
        other => panic!("expected subscript, got {:?}", other),
    }
}

#[test]
fn test_parse_negative_constant_is_unary() {
    assert_eq!(
        only_expr("-1\n"),
        Expr::UnaryOp {
            op: UnaryOp::USub,
            operand: Box::new(Expr::int(1)),
        }
    );
}

#[test]
fn test_parse_function_definition() {
    let module = parse("def f(a: int, b=2, *rest, key=None, **kw) -> int:\n    return a\n");
    let Stmt::FunctionDef(def) = &module.body[0] else {
        panic!("expected function definition");
    };
    assert_eq!(def.name, "f");
    assert_eq!(def.args.args.len(), 2);
    assert_eq!(def.args.args[0].annotation, Some(Expr::name("int")));
    assert_eq!(def.args.defaults, vec![Expr::int(2)]);
    assert_eq!(def.args.vararg.as_ref().map(|a| a.arg.as_str()), Some("rest"));
    assert_eq!(def.args.kwonlyargs[0].arg, "key");
    assert_eq!(def.args.kw_defaults.len(), 1);
    assert_eq!(def.args.kwarg.as_ref().map(|a| a.arg.as_str()), Some("kw"));
    assert_eq!(def.returns, Some(Expr::name("int")));
    assert_eq!(def.body, vec![Stmt::Return { value: Some(Expr::name("a")) }]);
}

#[test]
fn test_parse_generic_annotation() {
    let module = parse("def f(xs: List[int]) -> Dict[str, int]:\n    pass\n");
    let Stmt::FunctionDef(def) = &module.body[0] else {
        panic!("expected function definition");
    };
    assert_eq!(
        def.args.args[0].annotation,
        Some(Expr::subscript(Expr::name("List"), Expr::name("int")))
    );
    assert_eq!(
        def.returns,
        Some(Expr::subscript(
            Expr::name("Dict"),
            Expr::tuple(vec![Expr::name("str"), Expr::name("int")])
        ))
    );
}

#[test]
fn test_parse_elif_chain() {
    let module = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
    let Stmt::If { orelse, .. } = &module.body[0] else {
        panic!("expected if");
    };
    match orelse.as_slice() {
        [Stmt::If { test, orelse, .. }] => {
            assert_eq!(test, &Expr::name("b"));
            assert_eq!(orelse.len(), 1);
        }
        other => panic!("expected nested if, got {:?}", other),
    }
}

#[test]
fn test_parse_boolean_operators_flatten() {
    match only_expr("a or b or c\n") {
        Expr::BoolOp { op, values } => {
            assert_eq!(op, BoolOp::Or);
            assert_eq!(values.len(), 3);
        }
        other => panic!("expected bool op, got {:?}", other),
    }
    match only_expr("(a or b) or c\n") {
        Expr::BoolOp { values, .. } => assert_eq!(values.len(), 2),
        other => panic!("expected bool op, got {:?}", other),
    }
}

#[test]
fn test_parse_comparison_chain() {
    match only_expr("1 < x <= 3 and y not in z and w is not None\n") {
        Expr::BoolOp { values, .. } => {
            assert!(matches!(&values[0], Expr::Compare { ops, .. } if ops == &vec![CmpOp::Lt, CmpOp::LtE]));
            assert!(matches!(&values[1], Expr::Compare { ops, .. } if ops == &vec![CmpOp::NotIn]));
            assert!(matches!(&values[2], Expr::Compare { ops, .. } if ops == &vec![CmpOp::IsNot]));
        }
        other => panic!("expected bool op, got {:?}", other),
    }
}

#[test]
fn test_parse_strings() {
    assert_eq!(only_expr("'a\\tb'\n"), Expr::string("a\tb"));
    assert_eq!(only_expr("r'a\\tb'\n"), Expr::string("a\\tb"));
    assert_eq!(only_expr("'ab' \"cd\"\n"), Expr::string("abcd"));
    assert_eq!(only_expr("'\\x41\\u00e9'\n"), Expr::string("Aé"));
    assert_eq!(only_expr("'''multi\nline'''\n"), Expr::string("multi\nline"));
}

#[test]
fn test_parse_fstring() {
    match only_expr("f'{x!r:>4} and {{y}}'\n") {
        Expr::JoinedStr { values } => {
            assert_eq!(values.len(), 2);
            assert_eq!(
                values[0],
                FStringPart::Formatted {
                    value: Box::new(Expr::name("x")),
                    conversion: Some('r'),
                    format_spec: Some(">4".to_string()),
                }
            );
            assert_eq!(values[1], FStringPart::Literal(" and {y}".to_string()));
        }
        other => panic!("expected f-string, got {:?}", other),
    }
}

#[test]
fn test_parse_numbers() {
    assert_eq!(only_expr("1_000\n"), Expr::int(1000));
    assert_eq!(only_expr("0x1f\n"), Expr::int(31));
    assert_eq!(
        only_expr("2.5\n"),
        Expr::Constant {
            value: Constant::Float(2.5)
        }
    );
}

#[test]
fn test_parse_try_except() {
    let module = parse("try:\n    x = 1\nexcept (ValueError, TypeError) as e:\n    pass\nexcept:\n    pass\nfinally:\n    y = 2\n");
    let Stmt::Try {
        handlers,
        finalbody,
        ..
    } = &module.body[0]
    else {
        panic!("expected try");
    };
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0].name.as_deref(), Some("e"));
    assert!(matches!(handlers[0].exc_type, Some(Expr::Tuple { .. })));
    assert!(handlers[1].exc_type.is_none());
    assert_eq!(finalbody.len(), 1);
}

#[test]
fn test_parse_imports() {
    let module = parse("import os.path as p\nfrom typing import List, Dict\nfrom . import sibling\n");
    assert_eq!(
        module.body[0],
        Stmt::Import {
            names: vec![Alias {
                name: "os.path".to_string(),
                asname: Some("p".to_string()),
            }],
        }
    );
    assert!(matches!(
        &module.body[1],
        Stmt::ImportFrom { module: Some(m), names, level: 0 } if m == "typing" && names.len() == 2
    ));
    assert!(matches!(
        &module.body[2],
        Stmt::ImportFrom { module: None, level: 1, .. }
    ));
}

#[test]
fn test_parse_comprehensions() {
    match only_expr("[x * y for x in a if x for y in b]\n") {
        Expr::ListComp { generators, .. } => {
            assert_eq!(generators.len(), 2);
            assert_eq!(generators[0].ifs.len(), 1);
        }
        other => panic!("expected list comprehension, got {:?}", other),
    }
    assert!(matches!(
        only_expr("{k: v for k, v in d}\n"),
        Expr::DictComp { .. }
    ));
}

#[test]
fn test_parse_call_arguments() {
    match only_expr("f(1, *rest, key=2, **opts)\n") {
        Expr::Call { args, keywords, .. } => {
            assert_eq!(args.len(), 2);
            assert!(matches!(args[1], Expr::Starred { .. }));
            assert_eq!(keywords[0].arg.as_deref(), Some("key"));
            assert_eq!(keywords[1].arg, None);
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_comments_are_skipped() {
    let module = parse("# leading\nx = 1  # trailing\n# between\ny = 2\n");
    assert_eq!(module.body.len(), 2);
}

#[test]
fn test_syntax_error_reports_position() {
    match parse_program("x = (1,\ny = 2\n") {
        Err(ParseError::Syntax { line, .. }) => assert!(line >= 1),
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_unsupported_constructs_fail_loudly() {
    for source in [
        "class A:\n    pass\n",
        "with open('f') as f:\n    pass\n",
        "async def f():\n    pass\n",
        "x = b'bytes'\n",
        "x = 1j\n",
        "def g():\n    yield 1\n",
    ] {
        assert!(
            matches!(parse_program(source), Err(ParseError::Unsupported { .. })),
            "{source:?} should be rejected"
        );
    }
}
