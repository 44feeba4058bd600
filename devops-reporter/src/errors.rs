// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by devops-reporter.

use crate::client::Method;
use camino::Utf8PathBuf;
use std::{error::Error, fmt};
use thiserror::Error;

/// An error that occurred while loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file at `{path}`")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The config file is not valid TOML, or has values of the wrong type.
    #[error("failed to parse config file at `{path}`")]
    Parse {
        /// The path that failed to be parsed.
        path: Utf8PathBuf,

        /// The underlying TOML error.
        #[source]
        error: toml::de::Error,
    },

    /// A required setting was not provided.
    #[error("missing required configuration `{field}`")]
    MissingField {
        /// The name of the setting, as written in the config file.
        field: &'static str,
    },
}

/// An error that occurred while sending a request to the service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The request could not be sent, or the response could not be read.
    #[error("{method} {path} failed")]
    Http {
        /// The request method.
        method: Method,

        /// The request path, relative to the API base URL.
        path: String,

        /// The underlying HTTP error.
        #[source]
        error: Box<ureq::Error>,
    },
}

/// An error returned by a [`DevOpsClient`](crate::client::DevOpsClient) operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The blocking request task panicked or was cancelled.
    #[error("request task for {method} {path} did not complete")]
    Task {
        /// The request method.
        method: Method,

        /// The request path.
        path: String,

        /// The underlying join error.
        #[source]
        error: tokio::task::JoinError,
    },

    /// The service responded with a non-success status.
    #[error("{method} {path} returned HTTP {status}: {body}")]
    Status {
        /// The request method.
        method: Method,

        /// The request path.
        path: String,

        /// The status code.
        status: u16,

        /// The response body, which usually carries the service's error message.
        body: String,
    },

    /// The response body was not in the expected format.
    #[error("failed to deserialize response from {method} {path}")]
    Deserialize {
        /// The request method.
        method: Method,

        /// The request path.
        path: String,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },

    /// The request body could not be serialized.
    #[error("failed to serialize request body for {path}")]
    Serialize {
        /// The request path.
        path: String,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while reading or writing the run meta file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunMetaError {
    /// The meta file could not be read.
    #[error("failed to read run meta file at `{path}`")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The meta file is not valid JSON, or has the wrong shape.
    #[error("failed to deserialize run meta file at `{path}`")]
    Deserialize {
        /// The path that failed to be deserialized.
        path: Utf8PathBuf,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },

    /// The meta could not be serialized.
    #[error("failed to serialize run meta")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },

    /// The parent directory of the meta file could not be created.
    #[error("failed to create directory `{path}`")]
    CreateDir {
        /// The directory that failed to be created.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The meta file could not be written.
    #[error("failed to write run meta file at `{path}`")]
    Write {
        /// The path that failed to be written.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while capturing or storing an artifact.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArtifactError {
    /// The host could not capture a screenshot.
    #[error("failed to capture screenshot")]
    Capture {
        /// The error reported by the host.
        #[source]
        error: Box<dyn Error + Send + Sync>,
    },

    /// The screenshot was not valid base64.
    #[error("screenshot data is not valid base64")]
    Decode {
        /// The underlying decode error.
        #[source]
        error: base64::DecodeError,
    },

    /// A directory for artifacts could not be created.
    #[error("failed to create directory `{path}`")]
    CreateDir {
        /// The directory that failed to be created.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An artifact could not be written.
    #[error("failed to write `{path}`")]
    Write {
        /// The path that failed to be written.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An artifact could not be read.
    #[error("failed to read `{path}`")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The artifact was read but the service rejected it.
    #[error("failed to attach `{file_name}`")]
    Attach {
        /// The attachment's file name.
        file_name: String,

        /// The underlying client error.
        #[source]
        error: ClientError,
    },
}

/// An error that occurred while creating a test run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrepareError {
    /// The service rejected the run, or could not be reached.
    #[error("failed to create test run in plan {plan_id}, suite {suite_id}")]
    CreateRun {
        /// The test plan.
        plan_id: u64,

        /// The test suite.
        suite_id: u64,

        /// The underlying client error.
        #[source]
        error: ClientError,
    },

    /// The run was created but its id could not be handed over.
    #[error("created test run {run_id}, but failed to record it")]
    SaveMeta {
        /// The created run.
        run_id: u64,

        /// The underlying error.
        #[source]
        error: RunMetaError,
    },
}

/// An error that occurred while completing a test run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompleteError {
    /// The active run could not be read from the meta file.
    #[error("failed to determine the active test run")]
    LoadMeta {
        /// The underlying error.
        #[source]
        error: RunMetaError,
    },

    /// The service did not accept the completion.
    #[error("failed to complete test run {run_id}")]
    CompleteRun {
        /// The run being completed.
        run_id: u64,

        /// The underlying client error.
        #[source]
        error: ClientError,
    },
}

/// An error that occurred while reading a stream of runner events.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventStreamError {
    /// The stream could not be read.
    #[error("failed to read event stream")]
    Read {
        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// A line of the stream was not a valid event.
    #[error("invalid event on line {line_number}")]
    Parse {
        /// The one-based line number.
        line_number: usize,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },
}

/// Displays an error along with every error in its source chain.
///
/// Soft-skip paths log errors on a single event, so the whole chain needs to be part of the
/// message.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_none() {
            return Ok(());
        }

        write!(f, "\n  caused by:")?;
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }

        Ok(())
    }
}
