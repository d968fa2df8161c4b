/*!
# One-Based Indexing Integration Tests

Rewrites whole programs and runs them through the public evaluator.
*/

use perturb_core::transform::one_based::PRELUDE;
use perturb_core::{
    eval_program_with_calls, rewrite_for_one_based_indexing, Evaluator, ExceptionKind,
    Perturbation, PerturbConfig, PerturbError, TransformError,
};

use std::io::Write;

const ONE_BASED: Option<Perturbation> = Some(Perturbation::OneBasedIndexing);

const SAFE_FIRST: &str = "\
def safe_first(xs):
    try:
        return xs[1]
    except IndexError:
        return None

print([safe_first([3])])
print([safe_first([])])
";

#[test]
fn test_strided_sum_changes_meaning() -> anyhow::Result<()> {
    let program = "\
def add(lst):
    return sum([lst[i] for i in range(1, len(lst), 2) if lst[i] % 2 == 0])

print([add([4, 2, 6, 7])])
";
    assert_eq!(eval_program_with_calls(program, None)?, ["[2]"]);
    assert_eq!(eval_program_with_calls(program, ONE_BASED)?, ["[10]"]);
    Ok(())
}

#[test]
fn test_single_argument_range_starts_at_one() -> anyhow::Result<()> {
    let program = "s = 'abc'\nprint([[s[i] for i in range(len(s))]])\n";
    assert_eq!(eval_program_with_calls(program, None)?, ["[['a', 'b', 'c']]"]);
    assert_eq!(eval_program_with_calls(program, ONE_BASED)?, ["[['a', 'b']]"]);
    Ok(())
}

#[test]
fn test_nested_containers() -> anyhow::Result<()> {
    let program = "\
grid = [[1, 2], [3, 4]]
grid[2][1] = 30
row = grid[1]
row[2] += 5
print([grid, {'k': [9, 8]}['k'][2]])
";
    assert_eq!(
        eval_program_with_calls(program, ONE_BASED)?,
        ["[[[1, 7], [30, 4]], 8]"]
    );
    Ok(())
}

#[test]
fn test_rewritten_text_starts_with_prelude() -> anyhow::Result<()> {
    let rewritten = rewrite_for_one_based_indexing("x = 1\n")?;
    assert_eq!(rewritten, format!("{PRELUDE}x = 1"));
    Ok(())
}

#[test]
fn test_review_gate_blocks_unreviewed_programs() {
    let err = Evaluator::default()
        .eval_program_with_calls(SAFE_FIRST, ONE_BASED)
        .unwrap_err();
    assert!(err.is_review_required());

    // the unperturbed program never goes near the gate
    assert_eq!(
        eval_program_with_calls(SAFE_FIRST, None).unwrap(),
        ["[None]", "[None]"]
    );
}

#[test]
fn test_reviewed_hash_from_config_file() -> anyhow::Result<()> {
    let hash = match rewrite_for_one_based_indexing(SAFE_FIRST) {
        Err(TransformError::ReviewRequired { hash, .. }) => hash,
        other => panic!("expected ReviewRequired, got {:?}", other),
    };

    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{"extra_reviewed_hashes": ["{hash}"]}}"#)?;
    let config = PerturbConfig::from_json_file(file.path())?;
    assert_eq!(config.extra_reviewed_hashes, [hash]);

    let output = Evaluator::new(config).eval_program_with_calls(SAFE_FIRST, ONE_BASED)?;
    assert_eq!(output, ["[3]", "[None]"]);
    Ok(())
}

#[test]
fn test_unsupported_programs_surface_as_errors() {
    let err = eval_program_with_calls("xs = [1]\ndel xs[1]\nprint([xs])\n", ONE_BASED)
        .unwrap_err();
    assert!(matches!(err, PerturbError::UnsupportedConstruct(_)));
}

#[test]
fn test_position_searching_methods() -> anyhow::Result<()> {
    assert_eq!(
        eval_program_with_calls("print(['abc'.index('c')])\n", ONE_BASED)?,
        ["[3]"]
    );
    let err = eval_program_with_calls("print(['abc'.rfind('c')])\n", ONE_BASED);
    assert!(matches!(
        err,
        Err(PerturbError::Execution {
            kind: ExceptionKind::IndexError,
            ..
        })
    ));
    Ok(())
}
