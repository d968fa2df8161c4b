use super::review::{program_hash, uses_fault_markers};
use super::*;
use crate::ast::{Expr, Stmt};
use crate::interpreter::{ExceptionKind, Interpreter, PyException};
use pretty_assertions::assert_eq;

fn rewrite_body(source: &str) -> String {
    let rewritten = rewrite_for_one_based_indexing(source).expect("rewrite should succeed");
    rewritten
        .strip_prefix(PRELUDE)
        .expect("rewritten program starts with the prelude")
        .to_string()
}

fn exec(program: &str) -> Result<String, PyException> {
    let module = parse_program(program).expect("rewritten program should parse");
    let mut interp = Interpreter::default();
    interp.exec_module(&module)?;
    Ok(interp.take_output())
}

fn run_perturbed(source: &str) -> Result<String, PyException> {
    let program = rewrite_for_one_based_indexing(source).expect("rewrite should succeed");
    exec(&program)
}

fn perturbed_output(source: &str) -> String {
    match run_perturbed(source) {
        Ok(output) => output,
        Err(err) => panic!("perturbed program raised {}: {}", err.kind.name(), err.message),
    }
}

#[test]
fn test_subscript_read_text() {
    assert_eq!(
        rewrite_body("print(s[1])"),
        "print(s[1 - (1 if 1 > 0 else 0 if 1 < 0 else 1 / 0)] if isinstance(s, (list, tuple, str)) else s[1])"
    );
}

#[test]
fn test_subscript_store_text() {
    assert_eq!(
        rewrite_body("s[i] = v"),
        "\
if isinstance(s, (list, tuple, str)):
    s[i - (1 if i > 0 else 0 if i < 0 else 1 / 0)] = v
else:
    s[i] = v"
    );
}

#[test]
fn test_slice_step_is_not_shifted() {
    let body = rewrite_body("x = s[a::k]");
    assert!(body.contains("s[a - (1 if a > 0 else 0 if a < 0 else 1 / 0)::k]"));
    assert!(body.ends_with("else s[a::k]"));
}

#[test]
fn test_sequence_indexing_is_one_based() {
    let source = "\
print((7, 8, 9)[1], ['abc', 'def', 'ghi'][3], 'abcde'[4], 'abc'[:2])
print([7, 8, 9][1:], [7, 8, 9][1:5], [7, 8, 9][:4], [9, 8, 7][::-1], [9, 8, 7, 6][3::-1])
print('xyz'[-1], [1, 2, 3][-(1)])
";
    assert_eq!(
        perturbed_output(source),
        "7 ghi d a\n[7, 8, 9] [7, 8, 9] [7, 8, 9] [7, 8, 9] [7, 8, 9]\nz 3\n"
    );
}

#[test]
fn test_negative_index_matches_unperturbed() {
    let source = "s = [4, 5, 6]\nprint([s[-(1)]])\n";
    assert_eq!(perturbed_output(source), exec(source).unwrap());
}

#[test]
fn test_index_zero_raises_zero_division() {
    let err = run_perturbed("print([1, 2][0])\n").unwrap_err();
    assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);

    let err = run_perturbed("xs = [1, 2]\nxs[0] = 5\n").unwrap_err();
    assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
}

#[test]
fn test_mappings_pass_through() {
    let source = "\
d = {0: 7, 1: 8, 2: 9}
d[0] = 70
d[1] += 1
print(d[0], d[1], d.get(2))
";
    assert_eq!(perturbed_output(source), "70 9 9\n");
}

#[test]
fn test_subscript_assignment_and_aug_assignment() {
    let source = "\
xs = [1, 2, 3]
xs[1] += 10
xs[3] = 'last'
xs[1:2] = ['a', 'b']
print(xs)
";
    assert_eq!(perturbed_output(source), "['a', 'b', 2, 'last']\n");
}

#[test]
fn test_pop_and_index() {
    let source = "\
xs = [4, 5, 6]
print(xs.pop(2), xs, [7, 8, 9].index(8), xs.pop())
d = {'k': 1}
print(d.pop('k'), d)
";
    assert_eq!(perturbed_output(source), "5 [4] 2 6\n1 {}\n");
}

#[test]
fn test_pop_receiver_evaluated_once() {
    let source = "\
calls = []
def pick(xs):
    calls.append(1)
    return xs
print(pick([4, 5, 6]).pop(1), len(calls))
";
    assert_eq!(perturbed_output(source), "4 1\n");
}

#[test]
fn test_prelude_range_and_enumerate() {
    let source = "\
print(list(range(3)), list(range(2, 4)), list(enumerate('ab')))
for i, c in enumerate('xy'):
    print(i, c)
";
    assert_eq!(
        perturbed_output(source),
        "[1, 2] [2, 3] [(1, 'a'), (2, 'b')]\n1 x\n2 y\n"
    );
}

#[test]
fn test_position_free_methods_pass_through() {
    let source = "\
xs = [3, 1]
xs.append(2)
xs.sort()
print(xs, '-'.join(['a', 'b']), 'a b'.split(), 'ab'.upper(), 'abc'.startswith('a'))
";
    assert_eq!(perturbed_output(source), "[1, 2, 3] a-b ['a', 'b'] AB True\n");
}

#[test]
fn test_unreviewed_sequence_method_faults() {
    let err = run_perturbed("print('abc'.find('b'))\n").unwrap_err();
    assert_eq!(err.kind, ExceptionKind::IndexError);

    let body = rewrite_body("n = s.find(x)");
    assert_eq!(
        body,
        "n = ([][1] if isinstance(s, (list, tuple, str)) else s).find(x)"
    );
}

#[test]
fn test_module_attributes_still_work() {
    assert_eq!(perturbed_output("import math\nprint(math.floor(2.5))\n"), "2\n");
}

#[test]
fn test_unsupported_constructs() {
    let unsupported = [
        "x = s[len(s)]",
        "for xs[1] in ys:\n    pass",
        "a, b[1] = 1, 2",
        "del xs[1]",
        "ok = s.startswith('a', 1)",
        "xs.pop(1, 2)",
        "f = xs.pop",
        "i = xs.index(1, 2)",
    ];
    for source in unsupported {
        match rewrite_for_one_based_indexing(source) {
            Err(TransformError::Unsupported(_)) => {}
            other => panic!("expected Unsupported for {source:?}, got {other:?}"),
        }
    }

    assert!(matches!(
        rewrite_for_one_based_indexing("a[1] = b[2] = 3"),
        Err(TransformError::NotImplemented(_))
    ));
}

#[test]
fn test_rewrite_is_functional() {
    let module = parse_program("x = s[1]\n").unwrap();
    let before = module.clone();
    let rewritten = OneBasedIndexing.transform(&module).unwrap();
    assert_eq!(module, before);
    assert_ne!(rewritten, before);
}

#[test]
fn test_review_gate() {
    let source = "\
def f(xs):
    try:
        return xs[1]
    except ZeroDivisionError:
        return None
";
    let err = rewrite_for_one_based_indexing(source).unwrap_err();
    let TransformError::ReviewRequired { hash, program } = err else {
        panic!("expected ReviewRequired");
    };
    assert_eq!(hash, program_hash(&program));
    assert!(uses_fault_markers(&program));

    let reviewed = ReviewList::new([hash.clone()]);
    let accepted = one_based::rewrite_with_review(source, &reviewed).unwrap();
    assert_eq!(accepted, program);
}

#[test]
fn test_program_hash() {
    assert_eq!(program_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    assert_eq!(ReviewList::default().len(), review::REVIEWED_PROGRAM_HASHES.len());
    assert!(ReviewList::default().is_reviewed("722ca5ea4e134b7ab618a613c536e1b7"));
}

#[test]
fn test_perturbation_names() {
    assert_eq!(
        "one_based_indexing".parse::<Perturbation>().unwrap(),
        Perturbation::OneBasedIndexing
    );
    assert_eq!(Perturbation::OneBasedIndexing.to_string(), "one_based_indexing");
    assert!(matches!(
        "zero_based".parse::<Perturbation>(),
        Err(TransformError::UnknownPerturbation(name)) if name == "zero_based"
    ));
}

#[test]
fn test_remove_type_hints() {
    let source = "\
from typing import List
import typing, math

def f(x: int, *rest: str, flag: bool = False) -> List[int]:
    y: int
    z: int = 1
    return [x, z]
";
    assert_eq!(
        remove_type_hints(source).unwrap(),
        "import math\n\ndef f(x, *rest, flag=False):\n    z = 1\n    return [x, z]"
    );
}

#[test]
fn test_remove_type_hints_keeps_blocks_valid() {
    assert_eq!(
        remove_type_hints("def f():\n    x: int\n").unwrap(),
        "def f():\n    pass"
    );
}

#[test]
fn test_remove_type_hints_idempotent() {
    let source = "def g(a, b=2):\n    return a[b:]\n";
    let plain = parse_program(source).unwrap().to_source();
    let once = remove_type_hints(source).unwrap();
    assert_eq!(once, plain);
    assert_eq!(remove_type_hints(&once).unwrap(), once);
}

#[test]
fn test_parent_map_links_calls() {
    let module = parse_program("xs.pop(1)\n").unwrap();
    let parents = ParentMap::build(&module);
    let Stmt::Expr {
        value: Expr::Call { func, .. },
    } = &module.body[0]
    else {
        panic!("expected a call statement");
    };
    assert_eq!(parents.enclosing_call_args(func).map(<[Expr]>::len), Some(1));
    let Stmt::Expr { value } = &module.body[0] else {
        unreachable!()
    };
    assert!(matches!(parents.parent(value), Some(Parent::Stmt(_))));
    assert!(parents.parent(&Expr::int(0)).is_none());
}
