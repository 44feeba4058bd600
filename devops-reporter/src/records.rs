// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test result records, in the shape the service's result update API expects.

use crate::helpers::to_eight_digit_hex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comment attached to a result when its test starts.
pub const STARTED_COMMENT: &str = "Test started using Automation.";

/// Comment attached to a result when its test is skipped.
pub const SKIPPED_COMMENT: &str = "Test was skipped by Automation.";

/// Comment attached to a result when its test passes.
pub const PASSED_COMMENT: &str = "Test passed.";

/// Prefix of the comment attached to a result whose steps failed.
pub const STEP_FAILURE_COMMENT: &str = "Test failed due to one or more failing steps.";

/// The outcome of a test result, an iteration, or a single step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    /// The test has not started.
    NotStarted,

    /// The test is running.
    InProgress,

    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test was skipped.
    NotApplicable,
}

impl TestOutcome {
    /// How bad an outcome is when several are folded into one. Higher is worse.
    fn severity(self) -> u8 {
        match self {
            Self::Passed => 0,
            Self::NotApplicable => 1,
            Self::NotStarted => 2,
            Self::InProgress => 3,
            Self::Failed => 4,
        }
    }

    /// Returns the worse of two outcomes.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NotStarted",
            Self::InProgress => "InProgress",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::NotApplicable => "NotApplicable",
        };
        f.write_str(s)
    }
}

/// Whether a result is still expected to change during this run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultState {
    /// The test has started but not finished.
    Pending,

    /// No further changes are expected.
    Completed,
}

/// How a test finished, as reported by the host runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestConclusion {
    /// The test passed.
    Passed,

    /// The test failed with the given error.
    Failed {
        /// The error message.
        message: String,

        /// The stack trace, if one was captured.
        stack: Option<String>,
    },
}

impl TestConclusion {
    fn outcome(&self) -> TestOutcome {
        match self {
            Self::Passed => TestOutcome::Passed,
            Self::Failed { .. } => TestOutcome::Failed,
        }
    }

    fn comment(&self) -> String {
        match self {
            Self::Passed => PASSED_COMMENT.to_owned(),
            Self::Failed { message, stack } => format!(
                "Test failed: {message}\nStack: {}",
                stack.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// A single result within a test run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    /// The service-assigned result id.
    pub id: u64,

    /// The outcome of the test.
    pub outcome: TestOutcome,

    /// Whether the result is still expected to change.
    pub state: ResultState,

    /// Free-form explanation of the outcome.
    pub comment: String,

    /// Time spent in the test, summed across every completion of it in this run.
    pub duration_in_ms: u64,

    /// Step-level detail. Empty unless the test title named steps.
    #[serde(default)]
    pub iteration_details: Vec<IterationRecord>,
}

impl TestResultRecord {
    /// Creates an in-progress record, with one in-progress action per step id.
    ///
    /// `step_ids` are the zero-based ids from the test title.
    pub fn started(id: u64, step_ids: &[u64]) -> Self {
        let iteration_details = if step_ids.is_empty() {
            Vec::new()
        } else {
            vec![IterationRecord::new(step_ids, TestOutcome::InProgress)]
        };

        Self {
            id,
            outcome: TestOutcome::InProgress,
            state: ResultState::Pending,
            comment: STARTED_COMMENT.to_owned(),
            duration_in_ms: 0,
            iteration_details,
        }
    }

    /// Creates a record for a skipped test.
    pub fn skipped(id: u64) -> Self {
        Self {
            id,
            outcome: TestOutcome::NotApplicable,
            state: ResultState::Completed,
            comment: SKIPPED_COMMENT.to_owned(),
            duration_in_ms: 0,
            iteration_details: Vec::new(),
        }
    }

    /// Applies the end of a test to this record.
    ///
    /// Every step takes the test's outcome. If any step is then failed, the record is failed too,
    /// whatever the conclusion said. `duration_in_ms` is added to the time already recorded.
    pub fn finish(&mut self, conclusion: &TestConclusion, duration_in_ms: u64) {
        let mut outcome = conclusion.outcome();
        let mut comment = conclusion.comment();
        let step_message = (outcome == TestOutcome::Failed).then(|| comment.clone());

        let mut step_failed = false;
        for iteration in &mut self.iteration_details {
            iteration.set_all(outcome, step_message.as_deref());
            step_failed |= iteration.outcome == TestOutcome::Failed;
        }

        if step_failed {
            outcome = TestOutcome::Failed;
            comment = format!("{STEP_FAILURE_COMMENT}\n{comment}");
        }

        self.outcome = outcome;
        self.state = ResultState::Completed;
        self.comment = comment;
        self.duration_in_ms = self.duration_in_ms.saturating_add(duration_in_ms);
    }
}

/// One execution of a test's manual steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// The iteration id. Tests run a single iteration, so this is always 1.
    pub id: u32,

    /// The worst outcome among `action_results`.
    pub outcome: TestOutcome,

    /// One entry per step, in title order.
    pub action_results: Vec<ActionResult>,
}

impl IterationRecord {
    /// The only iteration id used.
    pub const ID: u32 = 1;

    fn new(step_ids: &[u64], outcome: TestOutcome) -> Self {
        Self {
            id: Self::ID,
            outcome,
            action_results: step_ids
                .iter()
                .map(|&step_id| ActionResult::new(step_id, outcome))
                .collect(),
        }
    }

    /// Sets the outcome of every action, then recomputes the iteration outcome.
    fn set_all(&mut self, outcome: TestOutcome, error_message: Option<&str>) {
        for action in &mut self.action_results {
            action.outcome = outcome;
            action.error_message = error_message.map(ToOwned::to_owned);
        }
        self.outcome = self
            .action_results
            .iter()
            .map(|action| action.outcome)
            .reduce(TestOutcome::worst)
            .unwrap_or(outcome);
    }
}

/// The result of a single manual step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// `step_identifier` as eight hex digits.
    pub action_path: String,

    /// The iteration this action belongs to.
    pub iteration_id: u32,

    /// The one-based step identifier.
    pub step_identifier: u64,

    /// The outcome of the step.
    pub outcome: TestOutcome,

    /// Set only when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ActionResult {
    fn new(step_id: u64, outcome: TestOutcome) -> Self {
        let step_identifier = step_id.saturating_add(1);
        Self {
            action_path: to_eight_digit_hex(step_identifier),
            iteration_id: IterationRecord::ID,
            step_identifier,
            outcome,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn failed() -> TestConclusion {
        TestConclusion::Failed {
            message: "expected 1 to equal 2".to_owned(),
            stack: Some("at login.spec.ts:10".to_owned()),
        }
    }

    #[test]
    fn test_started_without_steps() {
        let record = TestResultRecord::started(100_001, &[]);
        assert_eq!(record.outcome, TestOutcome::InProgress);
        assert_eq!(record.state, ResultState::Pending);
        assert_eq!(record.comment, STARTED_COMMENT);
        assert!(record.iteration_details.is_empty());
    }

    #[test]
    fn test_started_with_steps() {
        let record = TestResultRecord::started(100_001, &[1, 2]);
        let iteration = &record.iteration_details[0];
        assert_eq!(record.iteration_details.len(), 1);
        assert_eq!(iteration.id, 1);
        assert_eq!(iteration.outcome, TestOutcome::InProgress);

        let identifiers: Vec<_> = iteration
            .action_results
            .iter()
            .map(|action| (action.step_identifier, action.action_path.as_str()))
            .collect();
        assert_eq!(identifiers, [(2, "00000002"), (3, "00000003")]);
    }

    #[test]
    fn test_finish_passed_with_steps() {
        let mut record = TestResultRecord::started(7, &[1, 2]);
        record.finish(&TestConclusion::Passed, 120);

        assert_eq!(record.outcome, TestOutcome::Passed);
        assert_eq!(record.state, ResultState::Completed);
        assert_eq!(record.comment, PASSED_COMMENT);
        assert_eq!(record.duration_in_ms, 120);
        let iteration = &record.iteration_details[0];
        assert_eq!(iteration.outcome, TestOutcome::Passed);
        for action in &iteration.action_results {
            assert_eq!(action.outcome, TestOutcome::Passed);
            assert_eq!(action.error_message, None);
        }
    }

    #[test]
    fn test_finish_failed_with_steps() {
        let mut record = TestResultRecord::started(7, &[1, 2]);
        record.finish(&failed(), 50);

        assert_eq!(record.outcome, TestOutcome::Failed);
        assert!(record.comment.starts_with(STEP_FAILURE_COMMENT));
        assert!(record.comment.contains("expected 1 to equal 2"));
        assert!(record.comment.contains("at login.spec.ts:10"));

        let iteration = &record.iteration_details[0];
        assert_eq!(iteration.outcome, TestOutcome::Failed);
        for action in &iteration.action_results {
            assert_eq!(action.outcome, TestOutcome::Failed);
            let message = action.error_message.as_deref().expect("failed step has a message");
            assert!(message.contains("expected 1 to equal 2"));
        }
    }

    #[test]
    fn test_finish_without_steps() {
        let mut record = TestResultRecord::started(7, &[]);
        record.finish(&failed(), 30);
        assert_eq!(record.outcome, TestOutcome::Failed);
        assert_eq!(
            record.comment,
            "Test failed: expected 1 to equal 2\nStack: at login.spec.ts:10"
        );
        assert!(record.iteration_details.is_empty());
    }

    #[test]
    fn test_step_shape_is_stable() {
        let mut record = TestResultRecord::started(7, &[1, 2]);
        let before: Vec<_> = record.iteration_details[0]
            .action_results
            .iter()
            .map(|action| action.action_path.clone())
            .collect();
        record.finish(&failed(), 10);
        record.finish(&TestConclusion::Passed, 10);
        let after: Vec<_> = record.iteration_details[0]
            .action_results
            .iter()
            .map(|action| action.action_path.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_duration_accumulates() {
        let mut record = TestResultRecord::started(7, &[]);
        record.finish(&failed(), 100);
        record.finish(&TestConclusion::Passed, 250);
        assert_eq!(record.duration_in_ms, 350);
    }

    #[test]
    fn test_failed_comment_without_stack() {
        let mut record = TestResultRecord::started(7, &[]);
        record.finish(
            &TestConclusion::Failed {
                message: "boom".to_owned(),
                stack: None,
            },
            0,
        );
        assert_eq!(record.comment, "Test failed: boom\nStack: ");
    }

    #[test]
    fn test_worst_outcome() {
        use TestOutcome::*;
        assert_eq!(Passed.worst(Failed), Failed);
        assert_eq!(Failed.worst(Passed), Failed);
        assert_eq!(Passed.worst(InProgress), InProgress);
        assert_eq!(NotApplicable.worst(Passed), NotApplicable);
        assert_eq!(Passed.worst(Passed), Passed);
    }

    #[test]
    fn test_serialize_wire_shape() {
        let mut record = TestResultRecord::started(42, &[0]);
        record.finish(&TestConclusion::Passed, 5);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 42,
                "outcome": "Passed",
                "state": "Completed",
                "comment": "Test passed.",
                "durationInMs": 5,
                "iterationDetails": [{
                    "id": 1,
                    "outcome": "Passed",
                    "actionResults": [{
                        "actionPath": "00000001",
                        "iterationId": 1,
                        "stepIdentifier": 1,
                        "outcome": "Passed",
                    }],
                }],
            })
        );
    }

    #[test]
    fn test_serialize_without_steps_sends_empty_details() {
        let value = serde_json::to_value(TestResultRecord::skipped(9)).unwrap();
        assert_eq!(value["iterationDetails"], json!([]));
        assert_eq!(value["outcome"], json!("NotApplicable"));
    }
}
