// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    transport::{ApiRequest, ApiResponse, Method, Transport, UreqTransport},
    wire::{
        Attachment, AttachmentRequest, CreateRunRequest, ListResponse, PlanReference,
        ResultHandle, RunHandle, RunResult, RunState, TestPoint, UpdateRunRequest,
    },
};
use crate::{
    config::ConnectionConfig,
    errors::{ClientError, DisplayErrorChain},
    records::TestResultRecord,
    run_meta::RunContext,
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The `detailsToInclude` flags requested when listing results. Includes the test case
/// reference each result is matched on.
const RESULT_DETAILS: u32 = 5;

/// What happened to a batch of result updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// The results were accepted by the service.
    Sent,

    /// There is no active run, so nothing was sent.
    NoActiveRun,

    /// The upload failed. The error has already been logged.
    Failed,
}

/// A client for the test run and test result APIs.
///
/// The client holds no run state. Operations that act on a run read it from, and record it in, a
/// [`RunContext`] supplied by the caller.
#[derive(Clone, Debug)]
pub struct DevOpsClient {
    transport: Arc<dyn Transport>,
}

impl DevOpsClient {
    /// Creates a client that talks to the service over HTTP.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_transport(Arc::new(UreqTransport::new(config)))
    }

    /// Creates a client that sends requests through `transport`.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Lists the ids of the test points in a suite, and caches them in `ctx`.
    pub async fn list_test_points(
        &self,
        ctx: &mut RunContext,
        plan_id: u64,
        suite_id: u64,
    ) -> Result<Vec<u64>, ClientError> {
        let request = ApiRequest::new(
            Method::Get,
            format!("/test/Plans/{plan_id}/Suites/{suite_id}/points"),
        );
        let points: ListResponse<TestPoint> = self.execute_json(request).await?;
        let point_ids: Vec<u64> = points.value.into_iter().map(|point| point.id).collect();
        debug!(
            "found {} test points in plan {plan_id}, suite {suite_id}",
            point_ids.len()
        );

        ctx.set_point_ids(point_ids.clone());
        Ok(point_ids)
    }

    /// Creates an automated run covering every test point in the suite, and makes it the active
    /// run in `ctx`.
    pub async fn create_run(
        &self,
        ctx: &mut RunContext,
        plan_id: u64,
        suite_id: u64,
        run_name: &str,
    ) -> Result<RunHandle, ClientError> {
        self.list_test_points(ctx, plan_id, suite_id).await?;

        let path = "/test/runs";
        let body = to_body(
            path,
            &CreateRunRequest {
                name: run_name,
                plan: PlanReference { id: plan_id },
                point_ids: ctx.point_ids(),
                automated: true,
            },
        )?;
        let run: RunHandle = self
            .execute_json(ApiRequest::new(Method::Post, path).body(body))
            .await?;

        info!(
            "created test run {} ({run_name}) with {} test points",
            run.id,
            ctx.point_ids().len()
        );
        ctx.set_run_id(run.id);
        Ok(run)
    }

    /// Looks up the result slot for a test case in the active run.
    ///
    /// Returns `Ok(None)`, after logging a warning, if there is no active run or the run has no
    /// result for the case.
    pub async fn result_handle(
        &self,
        ctx: &RunContext,
        case_id: &str,
    ) -> Result<Option<ResultHandle>, ClientError> {
        let Some(run_id) = ctx.run_id() else {
            warn!("no active test run, not looking up result for test case {case_id}");
            return Ok(None);
        };

        let request = ApiRequest::new(Method::Get, format!("/test/runs/{run_id}/results"))
            .query("detailsToInclude", RESULT_DETAILS);
        let results: ListResponse<RunResult> = self.execute_json(request).await?;

        let handle = results.value.into_iter().find_map(|result| {
            let case = result.test_case?;
            case.id.matches(case_id).then(|| ResultHandle {
                case_id: case_id.to_owned(),
                result_id: result.id,
            })
        });
        if handle.is_none() {
            warn!("test run {run_id} has no result for test case {case_id}");
        }
        Ok(handle)
    }

    /// Uploads result records to the active run.
    ///
    /// Failures are logged rather than returned, and reported through [`SyncStatus`].
    pub async fn update_results(
        &self,
        ctx: &RunContext,
        records: &[TestResultRecord],
    ) -> SyncStatus {
        let Some(run_id) = ctx.run_id() else {
            warn!("no active test run, not updating {} results", records.len());
            return SyncStatus::NoActiveRun;
        };
        if records.is_empty() {
            return SyncStatus::Sent;
        }

        let path = format!("/test/runs/{run_id}/results");
        let result = match to_body(&path, records) {
            Ok(body) => {
                self.execute(ApiRequest::new(Method::Patch, path).body(body))
                    .await
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(_) => {
                debug!("updated {} results in test run {run_id}", records.len());
                SyncStatus::Sent
            }
            Err(error) => {
                error!(
                    "failed to update results in test run {run_id}: {}",
                    DisplayErrorChain::new(&error)
                );
                SyncStatus::Failed
            }
        }
    }

    /// Attaches a file to a result in the active run. Does nothing if there is no active run.
    pub async fn add_result_attachment(
        &self,
        ctx: &RunContext,
        result_id: u64,
        attachment: &Attachment,
    ) -> Result<(), ClientError> {
        let Some(run_id) = ctx.run_id() else {
            warn!(
                "no active test run, not attaching {} to result {result_id}",
                attachment.file_name
            );
            return Ok(());
        };
        self.attach(
            format!("/test/runs/{run_id}/results/{result_id}/attachments"),
            attachment,
        )
        .await
    }

    /// Attaches a file to the active run. Does nothing if there is no active run.
    pub async fn add_run_attachment(
        &self,
        ctx: &RunContext,
        attachment: &Attachment,
    ) -> Result<(), ClientError> {
        let Some(run_id) = ctx.run_id() else {
            warn!(
                "no active test run, not attaching {}",
                attachment.file_name
            );
            return Ok(());
        };
        self.attach(format!("/test/runs/{run_id}/attachments"), attachment)
            .await
    }

    /// Moves the active run to `state`, then clears the run from `ctx`.
    ///
    /// The context is cleared even if the request fails. Does nothing if there is no active run.
    pub async fn complete_run(
        &self,
        ctx: &mut RunContext,
        state: RunState,
    ) -> Result<(), ClientError> {
        let Some(run_id) = ctx.run_id() else {
            warn!("no active test run to complete");
            return Ok(());
        };

        let path = format!("/test/runs/{run_id}");
        let result = match to_body(&path, &UpdateRunRequest { state }) {
            Ok(body) => self
                .execute(ApiRequest::new(Method::Patch, path).body(body))
                .await
                .map(|_| ()),
            Err(error) => Err(error),
        };
        ctx.reset();

        if result.is_ok() {
            info!("marked test run {run_id} as {state}");
        }
        result
    }

    async fn attach(&self, path: String, attachment: &Attachment) -> Result<(), ClientError> {
        let body = to_body(&path, &AttachmentRequest::new(attachment))?;
        let mut request = ApiRequest::new(Method::Post, path).body(body);
        if let Some(iteration_id) = attachment.iteration_id {
            request = request.query("iterationId", iteration_id);
        }

        self.execute(request).await?;
        debug!("attached {}", attachment.file_name);
        Ok(())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.execute(request).await?;
        serde_json::from_str(&response.body).map_err(|error| ClientError::Deserialize {
            method,
            path,
            error,
        })
    }

    /// Sends a request on the blocking pool, mapping non-success statuses to errors.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let method = request.method;
        let path = request.path.clone();
        debug!("{method} {path}");

        let transport = Arc::clone(&self.transport);
        let response = tokio::task::spawn_blocking(move || transport.send(&request))
            .await
            .map_err(|error| ClientError::Task {
                method,
                path: path.clone(),
                error,
            })??;

        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Status {
                method,
                path,
                status: response.status,
                body: response.body,
            })
        }
    }
}

fn to_body<T: Serialize + ?Sized>(path: &str, value: &T) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(value).map_err(|error| ClientError::Serialize {
        path: path.to_owned(),
        error,
    })
}
