//! Property tests for candidate call extraction and substitution.

use perturb_core::{extract_calls, substitute_calls};
use proptest::prelude::*;

fn argument() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i64>().prop_map(|n| n.to_string()),
        "[a-z()\\[\\], ]{0,6}".prop_map(|s| format!("'{s}'")),
        prop::collection::vec(any::<i16>(), 0..4).prop_map(|xs| format!("{xs:?}")),
    ]
}

fn test_body(calls: &[Vec<String>]) -> String {
    let mut body = String::new();
    for (i, args) in calls.iter().enumerate() {
        body.push_str(&format!("    assert candidate({}) == {i}\n", args.join(", ")));
    }
    body
}

proptest! {
    #[test]
    fn test_extracts_every_call(calls in prop::collection::vec(prop::collection::vec(argument(), 0..4), 1..8)) {
        let body = test_body(&calls);
        let sites = extract_calls(&body).unwrap();
        prop_assert_eq!(sites.len(), calls.len());
        for (site, args) in sites.iter().zip(&calls) {
            prop_assert_eq!(&site.text, &format!("candidate({})", args.join(", ")));
            prop_assert_eq!(&body[site.start..site.end], site.text.as_str());
        }
    }

    #[test]
    fn test_substituting_call_text_is_identity(calls in prop::collection::vec(prop::collection::vec(argument(), 0..4), 1..8)) {
        let body = test_body(&calls);
        let sites = extract_calls(&body).unwrap();
        let values: Vec<String> = sites.iter().map(|site| format!("[{}]", site.text)).collect();
        prop_assert_eq!(substitute_calls(&body, &sites, &values).unwrap(), body);
    }

    #[test]
    fn test_substitution_replaces_every_call(calls in prop::collection::vec(prop::collection::vec(argument(), 0..4), 1..8)) {
        let body = test_body(&calls);
        let sites = extract_calls(&body).unwrap();
        let values: Vec<String> = (0..calls.len()).map(|i| format!("[{i}]")).collect();
        let substituted = substitute_calls(&body, &sites, &values).unwrap();
        prop_assert!(!substituted.contains("candidate("));
        for (i, line) in substituted.lines().enumerate() {
            prop_assert_eq!(line, format!("    assert {i} == {i}"));
        }
    }
}
