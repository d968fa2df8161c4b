use std::io::{BufReader, Write};

use perturb_cli::commands::{self, AssembleSummary};
use perturb_core::{Perturbation, PerturbConfig};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

const RECORDS: &str = r#"{"task_id": "t/0", "prompt": "def get(xs, i):\n", "canonical_solution": "    return xs[i]\n", "test": "def check(candidate):\n    assert candidate([1, 2], 0) == 1\n    assert candidate([1, 2, 3], 2) == 3\n", "entry_point": "get"}

{"task_id": "t/1", "prompt": "def head(s):\n", "canonical_solution": "    return s[0]\n", "test": "def check(candidate):\n    assert candidate('ab') == 'a'\n", "entry_point": "head"}
{"task_id": "t/2", "prompt": "def broken(s):\n", "canonical_solution": "    return s[0]\n", "test": "assert broken('ab') == 'a'\n", "entry_point": "broken"}
"#;

fn assemble(perturbation: Option<Perturbation>) -> (AssembleSummary, Vec<serde_json::Value>) {
    let mut output = Vec::new();
    let summary = commands::assemble_records(
        BufReader::new(RECORDS.as_bytes()),
        &mut output,
        perturbation,
        None,
        &PerturbConfig::default(),
    )
    .unwrap();
    let lines = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (summary, lines)
}

#[test]
fn test_assemble_unperturbed() {
    let (summary, lines) = assemble(None);
    assert_eq!(
        summary,
        AssembleSummary {
            records: 3,
            assembled: 2,
            failed: 1,
            empty: 0,
        }
    );
    assert_eq!(lines[0]["task_id"], "t/0");
    assert_eq!(lines[0]["call_indices"], serde_json::json!([0, 1]));
    assert!(lines[2]["error"]
        .as_str()
        .unwrap()
        .starts_with("Integrity violation"));
}

#[test]
fn test_assemble_perturbed() {
    let (summary, lines) = assemble(Some(Perturbation::OneBasedIndexing));
    assert_eq!(summary.assembled, 2);
    assert_eq!(summary.empty, 1);
    assert_eq!(lines[0]["call_indices"], serde_json::json!([1]));
    assert_eq!(
        lines[0]["program"],
        "def get(xs, i):\n    return xs[i]\n\nprint([get([1, 2, 3], 2)])"
    );
    assert_eq!(lines[1]["call_indices"], serde_json::json!([]));
}

#[test]
fn test_assemble_rejects_bad_json() {
    let mut output = Vec::new();
    let err = commands::assemble_records(
        BufReader::new("{not json}\n".as_bytes()),
        &mut output,
        None,
        None,
        &PerturbConfig::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("line 1"));
}

#[test]
fn test_file_input_and_config() -> anyhow::Result<()> {
    let mut program = NamedTempFile::new()?;
    write!(program, "def f(xs: list) -> int:\n    return xs[1]\nprint([f([5, 6])])\n")?;

    let source = commands::read_input(Some(program.path()))?;
    assert_eq!(
        commands::strip(&source)?,
        "def f(xs):\n    return xs[1]\nprint([f([5, 6])])"
    );

    let mut config_file = NamedTempFile::new()?;
    write!(config_file, r#"{{"recursion_limit": 30, "verify_with_asserts": false}}"#)?;
    let config = commands::load_config(Some(config_file.path()))?;
    assert_eq!(config.recursion_limit, 30);
    assert!(!config.verify_with_asserts);

    assert_eq!(commands::eval(&source, None, &config)?, ["[6]"]);
    assert_eq!(
        commands::eval(&source, Some(Perturbation::OneBasedIndexing), &config)?,
        ["[5]"]
    );
    Ok(())
}

#[test]
fn test_missing_files_have_context() {
    let err = commands::read_input(Some(std::path::Path::new("/nonexistent/prog.py")))
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to read /nonexistent/prog.py"));

    let err = commands::load_config(Some(std::path::Path::new("/nonexistent/perturb.json")))
        .unwrap_err();
    assert!(err.to_string().contains("Failed to load config"));
}
