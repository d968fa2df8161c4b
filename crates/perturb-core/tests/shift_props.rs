//! Property tests for the index shift of the one-based rewrite.

use perturb_core::{eval_program_with_calls, Perturbation};
use proptest::prelude::*;

fn lookup(xs: &[i16], index: i64) -> String {
    format!("xs = {xs:?}\nprint([xs[{index}]])\n")
}

fn sequence_and_position() -> impl Strategy<Value = (Vec<i16>, i64)> {
    prop::collection::vec(any::<i16>(), 1..8).prop_flat_map(|xs| {
        let len = xs.len() as i64;
        (Just(xs), 1..=len)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_positive_index_reads_previous_slot((xs, index) in sequence_and_position()) {
        let perturbed = eval_program_with_calls(
            &lookup(&xs, index),
            Some(Perturbation::OneBasedIndexing),
        )
        .unwrap();
        prop_assert_eq!(perturbed, vec![format!("[{}]", xs[index as usize - 1])]);
    }

    #[test]
    fn test_negative_index_is_unchanged((xs, index) in sequence_and_position()) {
        let program = lookup(&xs, -index);
        let perturbed =
            eval_program_with_calls(&program, Some(Perturbation::OneBasedIndexing)).unwrap();
        let plain = eval_program_with_calls(&program, None).unwrap();
        prop_assert_eq!(perturbed, plain);
    }
}
