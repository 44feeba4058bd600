// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::EventStreamError, records::TestConclusion};
use serde::Deserialize;
use std::io::{BufRead, Lines};

/// An event emitted by the host test runner.
///
/// Serialized as one JSON object per line, tagged by `event`:
///
/// ```json
/// {"event":"test-start","title":"C2370 logs in [S1][S2]","parent":"Login"}
/// {"event":"test-end","title":"C2370 logs in [S1][S2]","state":"passed","duration":1200}
/// {"event":"runner-end","failures":0}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RunnerEvent {
    /// A test started.
    TestStart(TestInfo),

    /// A test was skipped.
    TestSkip(TestInfo),

    /// A test finished.
    TestEnd(TestEnd),

    /// All tests finished.
    RunnerEnd(RunnerStats),
}

/// Identifies a test.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    /// The test's own title.
    pub title: String,

    /// The title including every enclosing suite.
    #[serde(default)]
    pub full_title: Option<String>,

    /// The title of the enclosing suite.
    #[serde(default)]
    pub parent: Option<String>,
}

impl TestInfo {
    /// Creates a `TestInfo` with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            full_title: None,
            parent: None,
        }
    }

    /// Sets the parent suite title.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// The most descriptive name available, for log messages.
    pub fn display_name(&self) -> &str {
        self.full_title.as_deref().unwrap_or(&self.title)
    }
}

/// A finished test.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEnd {
    /// The test's own title.
    pub title: String,

    /// The title of the enclosing suite.
    #[serde(default)]
    pub parent: Option<String>,

    /// Whether the test passed.
    pub state: TestState,

    /// Time spent in this attempt, in milliseconds.
    #[serde(default)]
    pub duration: u64,

    /// The failure, if the test failed.
    #[serde(default)]
    pub error: Option<TestError>,

    /// A base64-encoded PNG captured by the host at the point of failure.
    #[serde(default)]
    pub screenshot: Option<String>,
}

impl TestEnd {
    /// Creates a passing test end.
    pub fn passed(title: impl Into<String>, duration: u64) -> Self {
        Self {
            title: title.into(),
            parent: None,
            state: TestState::Passed,
            duration,
            error: None,
            screenshot: None,
        }
    }

    /// Creates a failing test end.
    pub fn failed(title: impl Into<String>, duration: u64, error: TestError) -> Self {
        Self {
            title: title.into(),
            parent: None,
            state: TestState::Failed,
            duration,
            error: Some(error),
            screenshot: None,
        }
    }

    /// Sets the title of the enclosing suite.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// How the test concluded.
    ///
    /// A failure without error details gets an empty message.
    pub fn conclusion(&self) -> TestConclusion {
        match self.state {
            TestState::Passed => TestConclusion::Passed,
            TestState::Failed => {
                let (message, stack) = match &self.error {
                    Some(error) => (error.message.clone(), error.stack.clone()),
                    None => (String::new(), None),
                };
                TestConclusion::Failed { message, stack }
            }
        }
    }
}

/// The final state of a test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    /// The test passed.
    Passed,

    /// The test failed.
    Failed,
}

/// The error a test failed with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TestError {
    /// The error message.
    #[serde(default)]
    pub message: String,

    /// The stack trace.
    #[serde(default)]
    pub stack: Option<String>,
}

/// Totals reported at the end of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RunnerStats {
    /// The number of failed tests.
    #[serde(default)]
    pub failures: u64,
}

/// Reads [`RunnerEvent`]s from a JSON-lines stream. Blank lines are skipped.
pub fn read_event_stream<R: BufRead>(reader: R) -> EventStream<R> {
    EventStream {
        lines: reader.lines(),
        line_number: 0,
    }
}

/// An iterator over the events in a JSON-lines stream, returned by [`read_event_stream`].
#[derive(Debug)]
pub struct EventStream<R> {
    lines: Lines<R>,
    line_number: usize,
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Result<RunnerEvent, EventStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(error) => return Some(Err(EventStreamError::Read { error })),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&line).map_err(|error| {
                EventStreamError::Parse {
                    line_number: self.line_number,
                    error,
                }
            }));
        }
    }
}
