use super::checks::{
    one_based_indexing_checks, one_based_indexing_unit_tests, run_one_based_indexing_checks,
    run_one_based_indexing_unit_tests, EXPECTED_CHECK_OUTPUT,
};
use super::*;
use crate::interpreter::ExceptionKind;
use crate::transform::Perturbation;
use crate::{PerturbConfig, PerturbError};
use pretty_assertions::assert_eq;

fn below_zero() -> BenchmarkRecord {
    BenchmarkRecord {
        task_id: Some("HumanEval/3".to_string()),
        prompt: "\
from typing import List


def below_zero(operations: List[int]) -> bool:
    \"\"\" Detect whether the running balance ever drops below zero.
    >>> below_zero([1, 2, -4, 5])
    True
    \"\"\"
"
        .to_string(),
        canonical_solution: "    balance = 0

    for op in operations:
        balance += op
        if balance < 0:
            return True

    return False
"
        .to_string(),
        test: "

METADATA = {
    'author': 'jt',
    'dataset': 'test'
}


def check(candidate):
    assert candidate([]) == False
    assert candidate([1, 2, -3, 1, 2, -3]) == False
    assert candidate([1, 2, -4, 5, 6]) == True
"
        .to_string(),
        entry_point: "below_zero".to_string(),
    }
}

fn get_item() -> BenchmarkRecord {
    BenchmarkRecord {
        task_id: None,
        prompt: "def get(xs, i):\n".to_string(),
        canonical_solution: "    return xs[i]\n".to_string(),
        test: "\
def check(candidate):
    assert candidate([1, 2], 0) == 1
    assert candidate([1, 2], 1) == 2
    assert candidate([1, 2], 1) == 2
    assert candidate('ab', -1) == 'b'
"
        .to_string(),
        entry_point: "get".to_string(),
    }
}

#[test]
fn test_extract_calls() {
    let text = "    assert candidate([1, 2]) == 3\n    assert candidate('a)b') == 'x'\n";
    let calls = extract_calls(text).unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].text, "candidate([1, 2])");
    assert_eq!(&text[calls[0].start..calls[0].end], calls[0].text);
    assert_eq!(calls[1].text, "candidate('a)b')");
    assert_eq!(calls[1].arguments(), "('a)b')");
}

#[test]
fn test_extract_nested_calls() {
    let calls = extract_calls("candidate(candidate(1))").unwrap();
    let texts: Vec<&str> = calls.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["candidate(candidate(1))", "candidate(1)"]);
    assert_eq!((calls[1].start, calls[1].end), (10, 22));
}

#[test]
fn test_extract_calls_errors() {
    assert!(matches!(
        extract_calls("assert True"),
        Err(PerturbError::Integrity(_))
    ));
    assert!(matches!(
        extract_calls("assert candidate(1 == 1"),
        Err(PerturbError::Integrity(_))
    ));
}

#[test]
fn test_substitute_calls() {
    let text = "assert candidate(1) == 2 and candidate(22, 'x') == 'y'";
    let calls = extract_calls(text).unwrap();
    let values = vec!["[2]".to_string(), "['y']".to_string()];
    assert_eq!(
        substitute_calls(text, &calls, &values).unwrap(),
        "assert 2 == 2 and 'y' == 'y'"
    );
}

#[test]
fn test_substitute_calls_errors() {
    let text = "candidate(1)";
    let calls = extract_calls(text).unwrap();
    assert!(matches!(
        substitute_calls(text, &calls, &[]),
        Err(PerturbError::Integrity(_))
    ));
    assert!(matches!(
        substitute_calls(text, &calls, &["2".to_string()]),
        Err(PerturbError::Integrity(_))
    ));
    let stale = CallSite {
        start: 5,
        end: 40,
        text: String::new(),
    };
    assert!(matches!(
        substitute_calls(text, &[stale], &["[2]".to_string()]),
        Err(PerturbError::Integrity(_))
    ));
}

#[test]
fn test_remove_docstrings() {
    assert_eq!(
        remove_docstrings("def f():\n    \"\"\"doc\"\"\"\n    return 1\n"),
        "def f():\n    return 1\n"
    );
    assert_eq!(
        remove_docstrings("def f():\n    '''doc'''\n    return 1\n"),
        "def f():\n    return 1\n"
    );
    assert_eq!(
        remove_docstrings("FIX = \"\"\"\nAdd more tests.\n\"\"\"\n\ndef f():\n    return 1\n"),
        "def f():\n    return 1\n"
    );
}

#[test]
fn test_eval_program_with_calls() {
    assert_eq!(
        eval_program_with_calls("print([1])\nprint(['a'])\n", None).unwrap(),
        ["[1]", "['a']"]
    );
    assert_eq!(
        eval_program_with_calls("print([[5, 6][1]])\n", Some(Perturbation::OneBasedIndexing))
            .unwrap(),
        ["[5]"]
    );
}

#[test]
fn test_evaluator_errors() {
    let evaluator = Evaluator::default();
    assert!(matches!(
        evaluator.eval_program_with_calls("x = 1\n", None),
        Err(PerturbError::Integrity(_))
    ));
    assert!(matches!(
        evaluator.eval_program_with_calls("x = = 1\n", None),
        Err(PerturbError::Parse(_))
    ));
    assert!(matches!(
        evaluator.eval_program_with_calls("print([1 // 0])\n", None),
        Err(PerturbError::Execution {
            kind: ExceptionKind::ZeroDivisionError,
            ..
        })
    ));
    let err = evaluator
        .eval_program_with_calls("print([[1][0]])\n", Some(Perturbation::OneBasedIndexing))
        .unwrap_err();
    assert!(err.is_invalid_index());
}

#[test]
fn test_evaluator_recursion_limit() {
    let program = "def d(n):\n    return 0 if n == 0 else 1 + d(n - 1)\nprint([d(990)])\n";
    assert_eq!(
        Evaluator::default()
            .eval_program_with_calls(program, None)
            .unwrap(),
        ["[990]"]
    );

    let shallow = Evaluator::new(PerturbConfig {
        recursion_limit: 50,
        ..Default::default()
    });
    assert!(matches!(
        shallow.eval_program_with_calls(program, None),
        Err(PerturbError::Execution {
            kind: ExceptionKind::RecursionError,
            ..
        })
    ));
}

#[test]
fn test_check_asserts_pass() {
    let evaluator = Evaluator::default();
    let record = below_zero();
    let good = ["[False]", "[False]", "[True]"].map(String::from);
    evaluator.check_asserts_pass(&record, &good).unwrap();

    let bad = ["[False]", "[True]", "[True]"].map(String::from);
    assert!(matches!(
        evaluator.check_asserts_pass(&record, &bad),
        Err(PerturbError::Execution {
            kind: ExceptionKind::AssertionError,
            ..
        })
    ));
}

#[test]
fn test_assemble_unperturbed() {
    let assembled = ProgramAssembler::default()
        .assemble(&below_zero(), None, None)
        .unwrap();
    assert_eq!(
        assembled.program,
        "\
def below_zero(operations):
    balance = 0
    for op in operations:
        balance += op
        if balance < 0:
            return True
    return False

print([below_zero([])])
print([below_zero([1, 2, -3, 1, 2, -3])])
print([below_zero([1, 2, -4, 5, 6])])"
    );
    assert_eq!(assembled.call_indices, [0, 1, 2]);
}

#[test]
fn test_assemble_perturbed_keeps_index_free_calls() {
    let assembled = ProgramAssembler::default()
        .assemble(&below_zero(), Some(Perturbation::OneBasedIndexing), None)
        .unwrap();
    assert_eq!(assembled.call_indices, [0, 1, 2]);
}

#[test]
fn test_assemble_renames_entry_point() {
    let assembled = ProgramAssembler::default()
        .assemble(&below_zero(), None, Some("func"))
        .unwrap();
    assert!(assembled.program.starts_with("def func(operations):"));
    assert!(assembled.program.ends_with("print([func([1, 2, -4, 5, 6])])"));
    assert!(!assembled.program.contains("below_zero"));
}

#[test]
fn test_assemble_dedups_calls() {
    let assembled = ProgramAssembler::default()
        .assemble(&get_item(), None, None)
        .unwrap();
    assert_eq!(
        assembled.program,
        "\
def get(xs, i):
    return xs[i]

print([get([1, 2], 0)])
print([get([1, 2], 1)])
print([get('ab', -1)])"
    );
    assert_eq!(assembled.call_indices, [0, 1, 3]);
}

#[test]
fn test_assemble_filters_zero_index_calls() {
    let assembled = ProgramAssembler::default()
        .assemble(&get_item(), Some(Perturbation::OneBasedIndexing), None)
        .unwrap();
    assert_eq!(assembled.call_indices, [1, 3]);
    assert!(!assembled.program.contains("get([1, 2], 0)"));

    let evaluator = Evaluator::default();
    let perturbed = evaluator
        .eval_program_with_calls(&assembled.program, Some(Perturbation::OneBasedIndexing))
        .unwrap();
    assert_eq!(perturbed, ["[1]", "['b']"]);
}

#[test]
fn test_assemble_rejects_malformed_tests() {
    let mut record = get_item();
    record.test = "def check(f):\n    assert f(1)\n".to_string();
    assert!(matches!(
        ProgramAssembler::default().assemble(&record, None, None),
        Err(PerturbError::Integrity(_))
    ));

    let mut record = get_item();
    record.test = format!("{}{}", record.test, record.test);
    assert!(matches!(
        ProgramAssembler::default().assemble(&record, None, None),
        Err(PerturbError::Integrity(_))
    ));
}

#[test]
fn test_assemble_without_assert_check() {
    let config = PerturbConfig {
        verify_with_asserts: false,
        ..Default::default()
    };
    let mut record = below_zero();
    // wrong expectation; only the assert cross-check would notice
    record.test = record.test.replace("== True", "== False");
    assert!(ProgramAssembler::default()
        .assemble(&record, None, None)
        .is_err());
    let assembled = ProgramAssembler::new(config)
        .assemble(&record, None, None)
        .unwrap();
    assert_eq!(assembled.call_indices, [0, 1, 2]);
}

#[test]
fn test_benchmark_record_json() {
    let json = r#"{"prompt": "def f():\n", "canonical_solution": "    return 1\n",
        "test": "def check(candidate):\n    assert candidate() == 1\n", "entry_point": "f"}"#;
    let record: BenchmarkRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.task_id, None);
    assert_eq!(
        record.full_program(),
        "def f():\n    return 1\ndef check(candidate):\n    assert candidate() == 1\n"
    );
    let assembled = ProgramAssembler::default()
        .assemble(&record, Some(Perturbation::OneBasedIndexing), None)
        .unwrap();
    assert_eq!(assembled.program, "def f():\n    return 1\n\nprint([f()])");
}

#[test]
fn test_parse_perturbation() {
    assert_eq!(parse_perturbation(None).unwrap(), None);
    assert_eq!(parse_perturbation(Some("none")).unwrap(), None);
    assert_eq!(
        parse_perturbation(Some("one_based_indexing")).unwrap(),
        Some(Perturbation::OneBasedIndexing)
    );
    assert!(matches!(
        parse_perturbation(Some("reverse")),
        Err(PerturbError::Config(_))
    ));
}

#[test]
fn test_one_based_self_checks() {
    let evaluator = Evaluator::default();
    run_one_based_indexing_unit_tests(&evaluator).unwrap();
    assert_eq!(
        run_one_based_indexing_checks(&evaluator).unwrap(),
        EXPECTED_CHECK_OUTPUT
    );
    assert!(one_based_indexing_unit_tests().starts_with("assert (7, 8, 9)[1] == 7"));
    assert!(one_based_indexing_checks().contains(".pop(2)"));
}

#[test]
fn test_unit_tests_fail_without_rewrite() {
    let err = Evaluator::default()
        .run_program(one_based_indexing_unit_tests(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        PerturbError::Execution {
            kind: ExceptionKind::AssertionError,
            ..
        }
    ));
}
