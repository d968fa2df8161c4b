// Manual-review gate for rewritten programs.
// The rewriter signals an index of zero with `1 / 0` and unreviewed sequence
// attributes with `[][1]`. A program that also has a `try:` block could catch
// those faults itself, so it is only let through once its hash has been
// checked by hand.

use std::collections::HashSet;

use md5::{Digest, Md5};
use tracing::error;

use super::{TransformError, TransformResult};

/// Rewritten programs (prelude included) that were inspected and are known
/// not to swallow the planted faults
pub const REVIEWED_PROGRAM_HASHES: [&str; 14] = [
    "722ca5ea4e134b7ab618a613c536e1b7",
    "fd9719a9fb2203258a6bbac23c111121",
    "635db0f57066ae026398a1aa262db3e2",
    "a8e61d8e24f0d37c2a072ed8023903b5",
    "9f2f4e58247fb4def3ab5fcc1f05411b",
    "e36747052b4230e728980cf270418a20",
    "6f05ff0fdc2168d0be5b1ceb442985f4",
    "66006bb80f1e8ea2608737f64a1432a7",
    "7e86358defcb3d3718d4a2fb1e70a963",
    "3a0d7f6551b5f52ea1f3860d42c32572",
    "30c5bc1328bd9aa8bc51acd87cd7bf72",
    "f4469d3192dc56cddb9e2bc23f7c1f92",
    "5aa7c6427b3d26ccb5fb0494fa1fa4ca",
    "2639430b68f6173d81687fa4a0281d77",
];

/// Hex md5 of the program text
pub fn program_hash(program: &str) -> String {
    format!("{:x}", Md5::digest(program.as_bytes()))
}

/// Whether planted faults could be caught by the program's own handlers
pub fn uses_fault_markers(program: &str) -> bool {
    program.contains("try:") && (program.contains("1 / 0") || program.contains("[][1]"))
}

#[derive(Debug, Clone)]
pub struct ReviewList {
    reviewed: HashSet<String>,
}

impl Default for ReviewList {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl ReviewList {
    /// The built-in hashes plus `extra`
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reviewed = REVIEWED_PROGRAM_HASHES
            .iter()
            .map(|hash| hash.to_string())
            .chain(extra.into_iter().map(Into::into))
            .collect();
        Self { reviewed }
    }

    pub fn is_reviewed(&self, hash: &str) -> bool {
        self.reviewed.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.reviewed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviewed.is_empty()
    }

    /// Halt with `ReviewRequired` unless the program is safe to run
    pub fn check(&self, program: &str) -> TransformResult<()> {
        if !uses_fault_markers(program) {
            return Ok(());
        }
        let hash = program_hash(program);
        if self.is_reviewed(&hash) {
            return Ok(());
        }
        error!(
            %hash,
            "rewritten program relies on planted faults inside a try block; inspect it manually:\n{program}"
        );
        Err(TransformError::ReviewRequired {
            hash,
            program: program.to_string(),
        })
    }
}
