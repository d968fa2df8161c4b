// Unparser output checked against what CPython's ast.unparse prints

use super::*;
use crate::parser::parse_program;
use pretty_assertions::assert_eq;

fn unparse(source: &str) -> String {
    parse_program(source)
        .expect("source should parse")
        .to_source()
}

#[test]
fn test_tuples_and_loop_targets() {
    assert_eq!(
        unparse("x = (1, 2)\nfor i, c in enumerate(s):\n    print(i, c)\n"),
        "x = (1, 2)\nfor i, c in enumerate(s):\n    print(i, c)"
    );
    assert_eq!(
        unparse("t = 1,\nfor (a, b) in x: pass\n"),
        "t = (1,)\nfor a, b in x:\n    pass"
    );
}

#[test]
fn test_function_signature() {
    assert_eq!(
        unparse("def f(a, b=2, *args, c, d=4, **kw) -> int:\n    return a[1:-1:2] + b\n"),
        "def f(a, b=2, *args, c, d=4, **kw) -> int:\n    return a[1:-1:2] + b"
    );
}

#[test]
fn test_blank_line_between_functions() {
    assert_eq!(
        unparse("x = 1\ndef f():\n    return x\ndef g():\n    pass\n"),
        "x = 1\n\ndef f():\n    return x\n\ndef g():\n    pass"
    );
}

#[test]
fn test_operator_precedence() {
    assert_eq!(
        unparse("y = a if b else (c if d else e)\nz = -x ** 2\nw = (-x) ** 2\nv = not a == b\n"),
        "y = a if b else c if d else e\nz = -x ** 2\nw = (-x) ** 2\nv = not a == b"
    );
    assert_eq!(
        unparse("x = -1\ny = x[-1]\nz = 2 ** -1\nw = (a, b)[0]\n"),
        "x = -1\ny = x[-1]\nz = 2 ** (-1)\nw = (a, b)[0]"
    );
    assert_eq!(
        unparse("a = (x + y) * z - (p - q)\n"),
        "a = (x + y) * z - (p - q)"
    );
}

#[test]
fn test_boolean_and_comparison_chains() {
    assert_eq!(
        unparse("x = a or b or c\ny = (a or b) or c\nz = a and (b or c)\nq = 1 < x <= 3 != y\nr = a not in b and c is not None\n"),
        "x = a or b or c\ny = (a or b) or c\nz = a and (b or c)\nq = 1 < x <= 3 != y\nr = a not in b and c is not None"
    );
}

#[test]
fn test_elif_collapsing() {
    assert_eq!(
        unparse("if a:\n    pass\nelif b:\n    x = 1\nelse:\n    x = 2\n"),
        "if a:\n    pass\nelif b:\n    x = 1\nelse:\n    x = 2"
    );
}

#[test]
fn test_try_and_string_quotes() {
    assert_eq!(
        unparse("try:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    raise ValueError('bad') from e\nfinally:\n    print(\"it's\")\n"),
        "try:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    raise ValueError('bad') from e\nfinally:\n    print(\"it's\")"
    );
}

#[test]
fn test_displays_and_comprehensions() {
    assert_eq!(
        unparse("a = b = [i * 2 for i in range(10) if i % 2 == 0]\nd = {k: v for k, v in x.items()}\ns = {1, 2}\n"),
        "a = b = [i * 2 for i in range(10) if i % 2 == 0]\nd = {k: v for k, v in x.items()}\ns = {1, 2}"
    );
    assert_eq!(
        unparse("print(sum(x for x in range(3)))\n"),
        "print(sum((x for x in range(3))))"
    );
}

#[test]
fn test_subscripts_and_lambdas() {
    assert_eq!(
        unparse("x[1, 2] = 3\ny = x[()]\nz = x[1,]\nl = lambda: 0\nm = lambda a, *b: a\n"),
        "x[1, 2] = 3\ny = x[()]\nz = x[1,]\nl = lambda: 0\nm = lambda a, *b: a"
    );
}

#[test]
fn test_integer_attribute_spacing() {
    assert_eq!(
        unparse("print((1).real, 1.5.real)\n"),
        "print(1 .real, 1.5.real)"
    );
}

#[test]
fn test_literals() {
    assert_eq!(
        unparse("s = 'a' 'b'\nf = f'{x!r:>10} and {y}'\ng = 1e16 + 1e-05 + 0.1 + 3.0\n"),
        "s = 'ab'\nf = f'{x!r:>10} and {y}'\ng = 1e+16 + 1e-05 + 0.1 + 3.0"
    );
}

#[test]
fn test_docstring_and_annotations() {
    assert_eq!(
        unparse("def g():\n    '''Doc string.'''\n    global count\n    return\n"),
        "def g():\n    \"\"\"Doc string.\"\"\"\n    global count\n    return"
    );
    assert_eq!(
        unparse("x: int = 5\ny: List[int]\nfrom typing import List\nimport os.path as p\nfrom . import a\n"),
        "x: int = 5\ny: List[int]\nfrom typing import List\nimport os.path as p\nfrom . import a"
    );
}

#[test]
fn test_synthesized_nodes() {
    let shifted = Expr::if_exp(
        Expr::call(
            Expr::name("isinstance"),
            vec![
                Expr::name("s"),
                Expr::tuple(vec![Expr::name("list"), Expr::name("tuple")]),
            ],
        ),
        Expr::subscript(
            Expr::name("s"),
            Expr::binop(Expr::name("i"), Operator::Sub, Expr::int(1)),
        ),
        Expr::subscript(Expr::name("s"), Expr::name("i")),
    );
    assert_eq!(
        shifted.to_source(),
        "s[i - 1] if isinstance(s, (list, tuple)) else s[i]"
    );

    let empty_set = Expr::Set { elts: vec![] };
    assert_eq!(empty_set.to_source(), "{*()}");
}

#[test]
fn test_output_reparses_to_same_tree() {
    let source = "def f(xs):\n    total = 0\n    for i, x in enumerate(xs):\n        if x > 0 and i % 2:\n            total += x ** 2\n        elif not x:\n            continue\n    return total, -total\n";
    let first = parse_program(source).unwrap();
    let second = parse_program(&first.to_source()).unwrap();
    assert_eq!(first, second);
}
