/*!
# Program Assembler Integration Tests

Assembles harness programs for benchmark-shaped records and checks what the
perturbed and unperturbed programs print.
*/

use perturb_core::{
    BenchmarkRecord, Evaluator, ExceptionKind, Perturbation, PerturbError, ProgramAssembler,
};
use serde_json::json;

const ONE_BASED: Option<Perturbation> = Some(Perturbation::OneBasedIndexing);

fn record(value: serde_json::Value) -> BenchmarkRecord {
    serde_json::from_value(value).expect("valid benchmark record")
}

fn has_close_elements() -> BenchmarkRecord {
    record(json!({
        "task_id": "HumanEval/0",
        "prompt": "from typing import List\n\n\ndef has_close_elements(numbers: List[float], threshold: float) -> bool:\n    \"\"\" Check if in given list of numbers, are any two numbers closer to each other than\n    given threshold.\n    >>> has_close_elements([1.0, 2.0, 3.0], 0.5)\n    False\n    \"\"\"\n",
        "canonical_solution": "    for idx, elem in enumerate(numbers):\n        for idx2, elem2 in enumerate(numbers):\n            if idx != idx2:\n                distance = abs(elem - elem2)\n                if distance < threshold:\n                    return True\n\n    return False\n",
        "test": "\n\nMETADATA = {\n    'author': 'jt',\n    'dataset': 'test'\n}\n\n\ndef check(candidate):\n    assert candidate([1.0, 2.0, 3.9, 4.0, 5.0, 2.2], 0.3) == True\n    assert candidate([1.0, 2.0, 3.9, 4.0, 5.0, 2.2], 0.05) == False\n    assert candidate([1.0, 2.0, 5.9, 4.0, 5.0], 0.95) == True\n    assert candidate([1.0, 2.0, 5.9, 4.0, 5.0], 0.8) == False\n\n",
        "entry_point": "has_close_elements"
    }))
}

fn first_char() -> BenchmarkRecord {
    record(json!({
        "prompt": "def first_char(s: str) -> str:\n    '''Return the first character.'''\n",
        "canonical_solution": "    return s[0]\n",
        "test": "def check(candidate):\n    assert candidate('abc') == 'a'\n    assert candidate('z') == 'z'\n",
        "entry_point": "first_char"
    }))
}

#[test]
fn test_index_free_solution_keeps_every_call() -> anyhow::Result<()> {
    let assembler = ProgramAssembler::default();
    let plain = assembler.assemble(&has_close_elements(), None, None)?;
    let perturbed = assembler.assemble(&has_close_elements(), ONE_BASED, None)?;

    assert_eq!(plain.call_indices, [0, 1, 2, 3]);
    assert_eq!(perturbed.call_indices, [0, 1, 2, 3]);
    assert_eq!(plain.program, perturbed.program);
    assert!(plain
        .program
        .starts_with("def has_close_elements(numbers, threshold):\n    for idx, elem in enumerate(numbers):"));

    let evaluator = Evaluator::default();
    let expected = ["[True]", "[False]", "[True]", "[False]"];
    assert_eq!(evaluator.eval_program_with_calls(&plain.program, None)?, expected);
    assert_eq!(
        evaluator.eval_program_with_calls(&plain.program, ONE_BASED)?,
        expected
    );
    Ok(())
}

#[test]
fn test_zero_index_solution_loses_every_call() -> anyhow::Result<()> {
    let assembler = ProgramAssembler::default();

    let plain = assembler.assemble(&first_char(), None, None)?;
    assert_eq!(
        plain.program,
        "def first_char(s):\n    return s[0]\n\nprint([first_char('abc')])\nprint([first_char('z')])"
    );

    let perturbed = assembler.assemble(&first_char(), ONE_BASED, None)?;
    assert!(perturbed.call_indices.is_empty());
    assert_eq!(perturbed.program, "def first_char(s):\n    return s[0]\n\n");
    Ok(())
}

#[test]
fn test_renamed_entry_point() -> anyhow::Result<()> {
    let assembled = ProgramAssembler::default().assemble(&first_char(), None, Some("func"))?;
    assert!(assembled.program.contains("def func(s):"));
    assert!(assembled.program.ends_with("print([func('z')])"));
    Ok(())
}

#[test]
fn test_unsupported_solution_fails_assembly() {
    let mut task = first_char();
    task.canonical_solution = "    return s[len(s) - len(s)]\n".to_string();
    // binary index expressions are fine
    assert!(ProgramAssembler::default()
        .assemble(&task, ONE_BASED, None)
        .is_ok());

    task.canonical_solution = "    return s[abs(0)]\n".to_string();
    let err = ProgramAssembler::default()
        .assemble(&task, ONE_BASED, None)
        .unwrap_err();
    assert!(matches!(err, PerturbError::UnsupportedConstruct(_)));
}

#[test]
fn test_wrong_canonical_solution_is_caught() {
    let mut task = has_close_elements();
    task.canonical_solution = "    return False\n".to_string();
    let err = ProgramAssembler::default()
        .assemble(&task, None, None)
        .unwrap_err();
    assert!(matches!(err, PerturbError::Execution { .. }));
}

#[test]
fn test_perturbed_call_raising_type_error_fails_assembly() -> anyhow::Result<()> {
    let task = record(json!({
        "prompt": "def negate_second(v):\n",
        "canonical_solution": "    return -v[1]\n",
        "test": "def check(candidate):\n    assert candidate(['a', 5]) == -5\n",
        "entry_point": "negate_second"
    }));
    let assembler = ProgramAssembler::default();
    assert_eq!(assembler.assemble(&task, None, None)?.call_indices, vec![0]);

    // under one-based indexing `v[1]` reads the string
    let err = assembler.assemble(&task, ONE_BASED, None).unwrap_err();
    match err {
        PerturbError::Execution { kind, message } => {
            assert_eq!(kind, ExceptionKind::TypeError);
            assert_eq!(message, "bad operand type for unary -: 'str'");
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    Ok(())
}
