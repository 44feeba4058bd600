// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The envelope the service wraps lists in.
#[derive(Clone, Debug, Deserialize)]
pub(super) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub(super) value: Vec<T>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct TestPoint {
    pub(super) id: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateRunRequest<'a> {
    pub(super) name: &'a str,
    pub(super) plan: PlanReference,
    pub(super) point_ids: &'a [u64],
    pub(super) automated: bool,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub(super) struct PlanReference {
    pub(super) id: u64,
}

/// A created test run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    /// The run id.
    pub id: u64,

    /// The run name.
    #[serde(default)]
    pub name: Option<String>,

    /// The run's web URL.
    #[serde(default)]
    pub web_access_url: Option<String>,
}

/// A test result within a run, as listed by the service.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RunResult {
    pub(super) id: u64,
    #[serde(default)]
    pub(super) test_case: Option<CaseReference>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct CaseReference {
    pub(super) id: IdValue,
}

/// The service serializes some ids as strings and others as numbers.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum IdValue {
    String(String),
    Number(u64),
}

impl IdValue {
    pub(super) fn matches(&self, id: &str) -> bool {
        match self {
            Self::String(s) => s == id,
            Self::Number(n) => id.parse::<u64>().is_ok_and(|id| id == *n),
        }
    }
}

/// The result slot for a test case within a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultHandle {
    /// The test case id, as extracted from the title.
    pub case_id: String,

    /// The service-assigned result id.
    pub result_id: u64,
}

/// A file to attach to a result or run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// The attachment's file name.
    pub file_name: String,

    /// The file contents, base64-encoded.
    pub content_base64: String,

    /// A description of the attachment.
    pub comment: String,

    /// The iteration to attach to, if any.
    pub iteration_id: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AttachmentRequest<'a> {
    pub(super) attachment_type: &'static str,
    pub(super) comment: &'a str,
    pub(super) file_name: &'a str,
    pub(super) stream: &'a str,
}

impl<'a> AttachmentRequest<'a> {
    pub(super) fn new(attachment: &'a Attachment) -> Self {
        Self {
            attachment_type: "GeneralAttachment",
            comment: &attachment.comment,
            file_name: &attachment.file_name,
            stream: &attachment.content_base64,
        }
    }
}

/// The terminal state a run is moved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// The run finished.
    Completed,

    /// The run was stopped before it finished.
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("Completed"),
            Self::Aborted => f.write_str("Aborted"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub(super) struct UpdateRunRequest {
    pub(super) state: RunState,
}
