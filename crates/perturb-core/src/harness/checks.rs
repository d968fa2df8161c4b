// Self-check programs for the one-based indexing rewrite.
// The first is a list of asserts that must hold once rewritten; the second
// prints values whose expected lines are listed alongside it.

use tracing::info;

use super::eval::Evaluator;
use crate::transform::Perturbation;
use crate::{PerturbError, Result};

const UNIT_TESTS: &str = r#"assert (7, 8, 9)[1] == 7
assert ["abc", "def", "ghi"][3] == "ghi"
assert "abcde"[4] == "d"
assert "abc"[:2] == "a"
assert [7, 8, 9][1:] == [7, 8, 9][1:5] == [7, 8, 9][1::1] == [7, 8, 9][:4] == [9, 8, 7][::-1] == [9, 8, 7, 6][3::-1] == [7, 8, 9]
assert list(enumerate([7, 8, 9])) == [(1, 7), (2, 8), (3, 9)]
assert list(range(2)) == [1]
assert list(range(2, 4)) == [2, 3]
assert {0: 7, 1: 8, 2: 9}[1] == 8
assert [7, 8, 9].index(8) == 2"#;

const CHECKS: &str = r#"print([list(range(3))])
print([[4, 5, 6].pop(2)])
print(["qrs"[:2]])
print(["qrstu"[4]])
print([list(enumerate("qrstuv"))])
"#;

/// Lines [`one_based_indexing_checks`] prints once rewritten
pub const EXPECTED_CHECK_OUTPUT: [&str; 5] = [
    "[[1, 2]]",
    "[5]",
    "['q']",
    "['t']",
    "[[(1, 'q'), (2, 'r'), (3, 's'), (4, 't'), (5, 'u'), (6, 'v')]]",
];

/// Asserts about one-based semantics, as unrewritten source
pub fn one_based_indexing_unit_tests() -> &'static str {
    UNIT_TESTS
}

/// Printing program covering ranges, `pop`, slices and `enumerate`
pub fn one_based_indexing_checks() -> &'static str {
    CHECKS
}

/// Rewrite and run the unit asserts; any failing assert surfaces as an error
pub fn run_one_based_indexing_unit_tests(evaluator: &Evaluator) -> Result<()> {
    evaluator.run_program(UNIT_TESTS, Some(Perturbation::OneBasedIndexing))?;
    info!("one-based indexing unit tests passed");
    Ok(())
}

/// Rewrite and run the printing checks, verifying every line
pub fn run_one_based_indexing_checks(evaluator: &Evaluator) -> Result<Vec<String>> {
    let output =
        evaluator.eval_program_with_calls(CHECKS, Some(Perturbation::OneBasedIndexing))?;
    if output != EXPECTED_CHECK_OUTPUT {
        return Err(PerturbError::Integrity(format!(
            "one-based checks printed {output:?}"
        )));
    }
    info!(lines = output.len(), "one-based indexing checks passed");
    Ok(output)
}
