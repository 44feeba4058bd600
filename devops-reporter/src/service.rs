// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Creating and completing the test run around a test session.
//!
//! [`RunService::on_prepare`] runs before any test, typically in a separate process from the
//! [`Reporter`](crate::reporter::Reporter). It records the new run's id in the run meta file, where
//! reporters pick it up.

use crate::{
    client::{Attachment, DevOpsClient, RunHandle, RunState},
    config::{AttachReportConfig, DEFAULT_SUITE_NAME, ReporterConfig},
    errors::{ArtifactError, CompleteError, ConfigError, DisplayErrorChain, PrepareError},
    run_meta::{RunContext, RunMeta, RunMetaStore},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, error, info, warn};

/// Creates the test run before tests execute and completes it afterwards.
#[derive(Debug)]
pub struct RunService {
    config: ReporterConfig,
    plan_id: u64,
    client: DevOpsClient,
    meta: RunMetaStore,
    ctx: RunContext,
}

impl RunService {
    /// Creates a new service. Fails if no test plan is configured.
    pub fn new(config: ReporterConfig, client: DevOpsClient) -> Result<Self, ConfigError> {
        let plan_id = config
            .plan_id
            .ok_or(ConfigError::MissingField { field: "plan-id" })?;
        let meta = RunMetaStore::new(config.meta_path.clone());

        Ok(Self {
            config,
            plan_id,
            client,
            meta,
            ctx: RunContext::new(),
        })
    }

    /// The active run, as seen by this service.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Creates the test run for `suite_name` (default `e2e`) and records its id in the meta file.
    ///
    /// Returns `Ok(None)`, after logging an error, if no suite id is configured for the suite.
    pub async fn on_prepare(
        &mut self,
        suite_name: Option<&str>,
    ) -> Result<Option<RunHandle>, PrepareError> {
        let suite_name = suite_name.unwrap_or(DEFAULT_SUITE_NAME);
        let Some(suite_id) = self.config.resolve_suite_id(suite_name) else {
            error!("no suite id configured for suite `{suite_name}`, not creating a test run");
            return Ok(None);
        };
        let run_name = self.config.resolve_run_name(suite_name);

        let run = self
            .client
            .create_run(&mut self.ctx, self.plan_id, suite_id, &run_name)
            .await
            .map_err(|error| PrepareError::CreateRun {
                plan_id: self.plan_id,
                suite_id,
                error,
            })?;

        self.meta
            .save(&RunMeta { test_run_id: run.id })
            .map_err(|error| PrepareError::SaveMeta {
                run_id: run.id,
                error,
            })?;
        debug!("wrote test run {} to {}", run.id, self.meta.path());

        Ok(Some(run))
    }

    /// Attaches the configured report, if any, then moves the active run to `state`.
    ///
    /// The active run is read from the meta file if this service didn't create it. Problems with
    /// the report are logged and don't prevent completion.
    pub async fn on_complete(&mut self, state: RunState) -> Result<(), CompleteError> {
        if self.ctx.run_id().is_none() {
            match self
                .meta
                .load()
                .map_err(|error| CompleteError::LoadMeta { error })?
            {
                Some(meta) => self.ctx.set_run_id(meta.test_run_id),
                None => {
                    warn!(
                        "no run meta file at {}, no test run to complete",
                        self.meta.path()
                    );
                    return Ok(());
                }
            }
        }
        let Some(run_id) = self.ctx.run_id() else {
            return Ok(());
        };

        if let Some(report) = &self.config.attach_report {
            self.attach_report(report).await;
        }

        self.client
            .complete_run(&mut self.ctx, state)
            .await
            .map_err(|error| CompleteError::CompleteRun { run_id, error })
    }

    async fn attach_report(&self, report: &AttachReportConfig) {
        let attachment = match read_report(report) {
            Ok(Some(attachment)) => attachment,
            Ok(None) => {
                warn!("report file not found at {}", report.path);
                return;
            }
            Err(error) => {
                error!("failed to attach report: {}", DisplayErrorChain::new(&error));
                return;
            }
        };

        match self.client.add_run_attachment(&self.ctx, &attachment).await {
            Ok(()) => info!(
                "attached {} report ({})",
                report.report_type, attachment.file_name
            ),
            Err(error) => {
                let error = ArtifactError::Attach {
                    file_name: attachment.file_name,
                    error,
                };
                error!("failed to attach report: {}", DisplayErrorChain::new(&error));
            }
        }
    }
}

/// Reads the report file. Returns `Ok(None)` if it doesn't exist.
fn read_report(report: &AttachReportConfig) -> Result<Option<Attachment>, ArtifactError> {
    let contents = match std::fs::read(&report.path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ArtifactError::Read {
                path: report.path.clone(),
                error,
            });
        }
    };

    Ok(Some(Attachment {
        file_name: report.name.clone(),
        content_base64: STANDARD.encode(contents),
        comment: report.comment().into_owned(),
        iteration_id: report.iteration_id,
    }))
}
