// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use devops_reporter::errors::{CompleteError, ConfigError, EventStreamError, PrepareError};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for `devops-report` failures.
///
/// Unknown or unexpected failures always result in exit code 1.
pub enum DevOpsExitCode {}

impl DevOpsExitCode {
    /// No errors occurred.
    pub const OK: i32 = 0;

    /// The configuration or the command line was invalid.
    pub const SETUP_ERROR: i32 = 96;

    /// The test run could not be created.
    pub const RUN_CREATION_FAILED: i32 = 97;

    /// The event stream could not be read or contained an invalid event.
    pub const EVENT_STREAM_ERROR: i32 = 98;

    /// The test run could not be completed.
    pub const RUN_COMPLETION_FAILED: i32 = 99;

    /// Writing to stdout failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

// The #[error()] strings are placeholders; errors are meant to be printed with
// display_to_stderr.

/// An expected failure of a `devops-report` command.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config error")]
    Config {
        #[from]
        error: ConfigError,
    },
    #[error("failed to start async runtime")]
    RuntimeBuild { error: std::io::Error },
    #[error("run creation failed")]
    RunCreation { error: PrepareError },
    #[error("no run created")]
    RunNotCreated { suite_name: String },
    #[error("run completion failed")]
    RunCompletion { error: CompleteError },
    #[error("failed to open event stream")]
    EventStreamOpen {
        path: Utf8PathBuf,
        error: std::io::Error,
    },
    #[error("event stream error")]
    EventStream { error: EventStreamError },
    #[error("failed to write output")]
    WriteOutput { error: std::io::Error },
}

impl ExpectedError {
    /// Returns the exit code for this error.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::RuntimeBuild { .. } | Self::EventStreamOpen { .. } => {
                DevOpsExitCode::SETUP_ERROR
            }
            Self::RunCreation { .. } | Self::RunNotCreated { .. } => {
                DevOpsExitCode::RUN_CREATION_FAILED
            }
            Self::RunCompletion { .. } => DevOpsExitCode::RUN_COMPLETION_FAILED,
            Self::EventStream { .. } => DevOpsExitCode::EVENT_STREAM_ERROR,
            Self::WriteOutput { .. } => DevOpsExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::Config { error } => {
                error!("{error}");
                error.source()
            }
            Self::RuntimeBuild { error } => {
                error!("failed to start async runtime");
                Some(error as &dyn Error)
            }
            Self::RunCreation { error } => {
                error!("{error}");
                error.source()
            }
            Self::RunNotCreated { suite_name } => {
                error!(
                    "no test run was created for suite `{}`",
                    suite_name.style(styles.bold)
                );
                None
            }
            Self::RunCompletion { error } => {
                error!("{error}");
                error.source()
            }
            Self::EventStreamOpen { path, error } => {
                error!("failed to open event stream `{}`", path.style(styles.bold));
                Some(error as &dyn Error)
            }
            Self::EventStream { error } => {
                error!("{error}");
                error.source()
            }
            Self::WriteOutput { error } => {
                error!("failed to write output");
                Some(error as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
