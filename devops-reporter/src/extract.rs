// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction of test case and step identifiers from test titles.
//!
//! Titles are free text, so extraction never fails: a title without markers simply yields no
//! identifiers.

use regex::Regex;
use std::sync::LazyLock;

static CASE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bC(\d+)\b").expect("case id regex is valid"));

static STEP_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[S(\d+)\]").expect("step id regex is valid"));

/// Returns the digits of the first whole-word `C<digits>` token in `text`.
///
/// `"C2370 logs in"` yields `Some("2370")`, while `"XC123Y"` yields `None` because the token is
/// embedded in a longer word.
pub fn extract_case_id(text: &str) -> Option<&str> {
    CASE_ID_REGEX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Returns the digits of every `[S<digits>]` token in `text`, left to right.
///
/// Duplicates are preserved.
pub fn extract_step_ids(text: &str) -> Vec<&str> {
    STEP_ID_REGEX
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Resolves the case id for a test, preferring the test title over its parent suite's title.
pub fn resolve_case_id<'a>(title: &'a str, parent: Option<&'a str>) -> Option<&'a str> {
    extract_case_id(title).or_else(|| parent.and_then(extract_case_id))
}
