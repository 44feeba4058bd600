// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    RunnerEvent, RunnerStats, ScreenshotProvider, ScreenshotStore, TestEnd, TestInfo,
    TestState, aggregator::ResultAggregator,
};
use crate::{
    client::{DevOpsClient, ResultHandle, RunState, SyncStatus},
    config::ReporterConfig,
    errors::{ArtifactError, DisplayErrorChain},
    extract::{extract_step_ids, resolve_case_id},
    records::TestResultRecord,
    run_meta::{RunContext, RunMetaStore},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mirrors test results into the active test run.
///
/// # Host contract
///
/// The hooks are `async` and take `&mut self`: the host must await each hook to completion before
/// calling the next one. Hooks never return errors. Every problem is logged and the affected
/// update skipped, so that reporting can't fail the test run itself.
///
/// The active run is read from the run meta file at each test start, so a single reporter can
/// follow runs created by another process.
#[derive(Debug)]
pub struct Reporter {
    client: DevOpsClient,
    meta: RunMetaStore,
    ctx: RunContext,
    aggregator: ResultAggregator,
    screenshots: ScreenshotStore,
    screenshot_provider: Option<Arc<dyn ScreenshotProvider>>,
    current: Option<ResultHandle>,
}

impl Reporter {
    /// Creates a reporter for `config`, sending requests through `client`.
    pub fn new(config: &ReporterConfig, client: DevOpsClient) -> Self {
        Self {
            client,
            meta: RunMetaStore::new(config.meta_path.clone()),
            ctx: RunContext::new(),
            aggregator: ResultAggregator::new(),
            screenshots: ScreenshotStore::new(config.screenshot_path.clone()),
            screenshot_provider: None,
            current: None,
        }
    }

    /// Sets the source of failure screenshots for tests whose end event doesn't carry one.
    pub fn with_screenshot_provider(mut self, provider: Arc<dyn ScreenshotProvider>) -> Self {
        self.screenshot_provider = Some(provider);
        self
    }

    /// The active run, as last seen by this reporter.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// The records accumulated for the active run.
    pub fn results(&self) -> &ResultAggregator {
        &self.aggregator
    }

    /// Dispatches `event` to the matching hook.
    pub async fn handle_event(&mut self, event: &RunnerEvent) {
        match event {
            RunnerEvent::TestStart(test) => self.on_test_start(test).await,
            RunnerEvent::TestSkip(test) => self.on_test_skip(test).await,
            RunnerEvent::TestEnd(test) => self.on_test_end(test).await,
            RunnerEvent::RunnerEnd(stats) => self.on_runner_end(stats).await,
        }
    }

    /// Called when a test starts.
    ///
    /// Tests without a case id in their title or their parent suite's title are not reported.
    pub async fn on_test_start(&mut self, test: &TestInfo) {
        self.current = None;
        self.refresh_run();

        let Some(case_id) = resolve_case_id(&test.title, test.parent.as_deref()) else {
            debug!("no test case id in `{}`, not reporting it", test.display_name());
            return;
        };
        let Some(handle) = self.resolve_handle(case_id).await else {
            return;
        };

        let step_ids = parse_step_ids(&test.title);
        let record = TestResultRecord::started(handle.result_id, &step_ids);
        debug!(
            "test case {case_id} started as result {} with {} steps",
            handle.result_id,
            step_ids.len()
        );

        self.aggregator.upsert(record);
        self.current = Some(handle);
        self.sync().await;
    }

    /// Called when a test is skipped.
    pub async fn on_test_skip(&mut self, test: &TestInfo) {
        self.refresh_run();
        if self.ctx.run_id().is_none() {
            info!(
                "no active test run, not reporting skipped test `{}`",
                test.display_name()
            );
            return;
        }

        let Some(case_id) = resolve_case_id(&test.title, test.parent.as_deref()) else {
            info!(
                "no test case id in skipped test `{}`, not reporting it",
                test.display_name()
            );
            return;
        };
        let handle = match &self.current {
            Some(handle) if handle.case_id == case_id => handle.clone(),
            _ => match self.resolve_handle(case_id).await {
                Some(handle) => handle,
                None => return,
            },
        };

        self.aggregator
            .upsert(TestResultRecord::skipped(handle.result_id));
        self.sync().await;
    }

    /// Called when a test finishes.
    ///
    /// On failure, a screenshot is attached to the result if one is available: from the event
    /// itself, or else from the screenshot provider.
    ///
    /// Repeated ends for the same test accumulate into one result. An end without a matching
    /// start resolves its own case id from its title or parent.
    pub async fn on_test_end(&mut self, test: &TestEnd) {
        if self.current.is_none() {
            self.refresh_run();
        }
        if self.ctx.run_id().is_none() {
            info!("no active test run, not reporting end of `{}`", test.title);
            return;
        }

        let case_id = resolve_case_id(&test.title, test.parent.as_deref());
        let handle = match (self.current.clone(), case_id) {
            (Some(handle), Some(case_id)) if handle.case_id != case_id => {
                self.resolve_handle(case_id).await
            }
            (Some(handle), _) => Some(handle),
            (None, Some(case_id)) => self.resolve_handle(case_id).await,
            (None, None) => None,
        };
        let Some(handle) = handle else {
            info!("no active test result, not reporting end of `{}`", test.title);
            return;
        };
        self.current = Some(handle.clone());

        let mut record = match self.aggregator.get(handle.result_id) {
            Some(record) => record.clone(),
            None => TestResultRecord::started(handle.result_id, &parse_step_ids(&test.title)),
        };
        record.finish(&test.conclusion(), test.duration);
        debug!(
            "test case {} finished: {} in {}ms",
            handle.case_id, record.outcome, record.duration_in_ms
        );

        self.aggregator.upsert(record);
        self.sync().await;

        if test.state == TestState::Failed {
            self.attach_screenshot(test, &handle).await;
        }
    }

    /// Called when every test has finished. Completes the active run.
    ///
    /// Hosts that complete the run through [`RunService::on_complete`](crate::service::RunService::on_complete)
    /// should not call this as well.
    pub async fn on_runner_end(&mut self, stats: &RunnerStats) {
        info!(
            "test run finished with {} failures, marking it {}",
            stats.failures,
            RunState::Completed
        );
        if let Err(error) = self.client.complete_run(&mut self.ctx, RunState::Completed).await {
            error!("failed to complete test run: {}", DisplayErrorChain::new(&error));
        }
        self.aggregator.clear();
        self.current = None;
    }

    /// Reloads the active run from the meta file. A run id that differs from the one seen before
    /// starts a fresh set of records.
    fn refresh_run(&mut self) {
        match self.meta.load() {
            Ok(Some(meta)) => {
                if self.ctx.run_id() != Some(meta.test_run_id) {
                    if self.ctx.run_id().is_some() {
                        debug!("switching to test run {}", meta.test_run_id);
                    }
                    self.aggregator.clear();
                    self.ctx.set_run_id(meta.test_run_id);
                }
            }
            Ok(None) => {
                debug!("no run meta file at {}", self.meta.path());
            }
            Err(error) => {
                warn!("{}", DisplayErrorChain::new(&error));
            }
        }
    }

    async fn resolve_handle(&self, case_id: &str) -> Option<ResultHandle> {
        match self.client.result_handle(&self.ctx, case_id).await {
            Ok(handle) => handle,
            Err(error) => {
                error!(
                    "failed to look up result for test case {case_id}: {}",
                    DisplayErrorChain::new(&error)
                );
                None
            }
        }
    }

    /// Uploads the records that changed since the last successful sync.
    async fn sync(&mut self) {
        let pending = self.aggregator.pending();
        if pending.is_empty() {
            return;
        }

        if self.client.update_results(&self.ctx, &pending).await == SyncStatus::Sent {
            self.aggregator
                .mark_synced(pending.iter().map(|record| record.id));
        }
    }

    async fn attach_screenshot(&self, test: &TestEnd, handle: &ResultHandle) {
        let content = match (&test.screenshot, &self.screenshot_provider) {
            (Some(content), _) => content.clone(),
            (None, Some(provider)) => match provider.capture() {
                Ok(content) => content,
                Err(error) => {
                    let error = ArtifactError::Capture { error };
                    error!("{}", DisplayErrorChain::new(&error));
                    return;
                }
            },
            (None, None) => return,
        };

        let result = match self.screenshots.save(&test.title, &content) {
            Ok(attachment) => self
                .client
                .add_result_attachment(&self.ctx, handle.result_id, &attachment)
                .await
                .map_err(|error| ArtifactError::Attach {
                    file_name: attachment.file_name.clone(),
                    error,
                }),
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => debug!("attached failure screenshot to result {}", handle.result_id),
            Err(error) => error!(
                "failed to attach screenshot for `{}`: {}",
                test.title,
                DisplayErrorChain::new(&error)
            ),
        }
    }
}

/// Step ids from a title, as numbers. Ids too large to represent are dropped.
fn parse_step_ids(title: &str) -> Vec<u64> {
    extract_step_ids(title)
        .into_iter()
        .filter_map(|id| match id.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("ignoring out-of-range step id {id} in `{title}`");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{Method, test_helpers::RecordingTransport},
        config::ConnectionConfig,
        records::{ResultState, STEP_FAILURE_COMMENT, TestOutcome},
        reporter::TestError,
        run_meta::RunMeta,
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    const RUN_ID: u64 = 7;
    const TITLE: &str = "Suite C42 [S1][S2]";

    struct Fixture {
        _temp_dir: Utf8TempDir,
        transport: Arc<RecordingTransport>,
        config: ReporterConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = Utf8TempDir::new().unwrap();
            let config = ReporterConfig {
                connection: ConnectionConfig::new("contoso", "shop", "secret").unwrap(),
                plan_id: Some(12),
                suite_id: Some(34),
                suite_mapping: BTreeMap::new(),
                run_name: None,
                attach_report: None,
                screenshot_path: temp_dir.path().join("screens"),
                meta_path: temp_dir.path().join("test-run-meta.json"),
            };
            let transport = RecordingTransport::new();
            transport.respond(
                Method::Get,
                "/test/runs/7/results",
                200,
                json!({ "value": [
                    { "id": 100042, "testCase": { "id": "42" } },
                    { "id": 100043, "testCase": { "id": 43 } },
                ] }),
            );

            Self {
                _temp_dir: temp_dir,
                transport,
                config,
            }
        }

        fn with_active_run(self) -> Self {
            RunMetaStore::new(self.config.meta_path.clone())
                .save(&RunMeta {
                    test_run_id: RUN_ID,
                })
                .unwrap();
            self
        }

        fn reporter(&self) -> Reporter {
            Reporter::new(
                &self.config,
                DevOpsClient::with_transport(self.transport.clone()),
            )
        }

        /// The bodies of every result update sent so far.
        fn updates(&self) -> Vec<serde_json::Value> {
            self.transport
                .requests()
                .into_iter()
                .filter(|request| request.method == Method::Patch)
                .filter_map(|request| request.body)
                .collect()
        }
    }

    fn failure() -> TestError {
        TestError {
            message: "expected 1 to equal 2".to_owned(),
            stack: Some("at login.spec.ts:10".to_owned()),
        }
    }

    #[tokio::test]
    async fn test_passing_test_with_steps() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new(TITLE)).await;
        let started = reporter.results().get(100042).unwrap();
        assert_eq!(started.outcome, TestOutcome::InProgress);
        assert_eq!(started.state, ResultState::Pending);

        reporter.on_test_end(&TestEnd::passed(TITLE, 1200)).await;
        let record = reporter.results().get(100042).unwrap();
        assert_eq!(record.outcome, TestOutcome::Passed);
        assert_eq!(record.state, ResultState::Completed);
        assert_eq!(record.duration_in_ms, 1200);

        let iteration = &record.iteration_details[0];
        assert_eq!(iteration.outcome, TestOutcome::Passed);
        let steps: Vec<_> = iteration
            .action_results
            .iter()
            .map(|action| (action.step_identifier, action.outcome))
            .collect();
        assert_eq!(steps, [(2, TestOutcome::Passed), (3, TestOutcome::Passed)]);

        assert_eq!(
            fixture.transport.request_lines(),
            [
                "GET /test/runs/7/results",
                "PATCH /test/runs/7/results",
                "PATCH /test/runs/7/results",
            ]
        );
        assert_eq!(fixture.updates()[1][0]["outcome"], json!("Passed"));
    }

    #[tokio::test]
    async fn test_failing_test_with_steps() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new(TITLE)).await;
        reporter
            .on_test_end(&TestEnd::failed(TITLE, 300, failure()))
            .await;

        let record = reporter.results().get(100042).unwrap();
        assert_eq!(record.outcome, TestOutcome::Failed);
        assert!(record.comment.starts_with(STEP_FAILURE_COMMENT));
        assert!(record.comment.contains("expected 1 to equal 2"));
        assert!(record.comment.contains("at login.spec.ts:10"));
        for action in &record.iteration_details[0].action_results {
            assert_eq!(action.outcome, TestOutcome::Failed);
        }
    }

    #[tokio::test]
    async fn test_no_case_id() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        let test = TestInfo::new("logs in").with_parent("Login");
        reporter.on_test_start(&test).await;
        reporter.on_test_end(&TestEnd::passed("logs in", 10)).await;

        assert!(reporter.results().is_empty());
        assert!(fixture.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_case_id_from_parent() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        let test = TestInfo::new("logs in [S4]").with_parent("C43 Login");
        reporter.on_test_start(&test).await;

        let record = reporter.results().get(100043).unwrap();
        assert_eq!(record.iteration_details[0].action_results[0].step_identifier, 5);
    }

    #[tokio::test]
    async fn test_no_active_run() {
        let fixture = Fixture::new();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new(TITLE)).await;
        reporter.on_test_skip(&TestInfo::new("C43 skipped")).await;
        reporter.on_test_end(&TestEnd::passed(TITLE, 10)).await;

        assert!(reporter.results().is_empty());
        assert!(fixture.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_skip_replaces_record() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C43 logs out")).await;
        reporter.on_test_skip(&TestInfo::new("C43 logs out")).await;

        assert_eq!(reporter.results().len(), 1);
        let record = reporter.results().get(100043).unwrap();
        assert_eq!(record.outcome, TestOutcome::NotApplicable);
        assert_eq!(record.state, ResultState::Completed);

        // The skip reuses the handle resolved at start, and only sends the changed record.
        assert_eq!(
            fixture.transport.request_lines(),
            [
                "GET /test/runs/7/results",
                "PATCH /test/runs/7/results",
                "PATCH /test/runs/7/results",
            ]
        );
        assert_eq!(fixture.updates()[1].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_accumulates_duration() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new(TITLE)).await;
        reporter
            .on_test_end(&TestEnd::failed(TITLE, 100, failure()))
            .await;
        reporter.on_test_start(&TestInfo::new(TITLE)).await;
        reporter.on_test_end(&TestEnd::passed(TITLE, 250)).await;

        let record = reporter.results().get(100042).unwrap();
        assert_eq!(record.duration_in_ms, 350);
        assert_eq!(record.outcome, TestOutcome::Passed);
    }

    #[tokio::test]
    async fn test_repeated_end_accumulates_duration() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 t")).await;
        reporter.on_test_end(&TestEnd::passed("C42 t", 100)).await;
        reporter.on_test_end(&TestEnd::passed("C42 t", 250)).await;

        let record = reporter.results().get(100042).unwrap();
        assert_eq!(record.duration_in_ms, 350);
        assert_eq!(record.outcome, TestOutcome::Passed);
        assert_eq!(
            fixture.transport.request_lines(),
            [
                "GET /test/runs/7/results",
                "PATCH /test/runs/7/results",
                "PATCH /test/runs/7/results",
                "PATCH /test/runs/7/results",
            ]
        );
    }

    #[tokio::test]
    async fn test_end_without_start_uses_parent() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter
            .on_test_end(&TestEnd::passed("logs out", 40).with_parent("C43 Logout"))
            .await;

        let record = reporter.results().get(100043).unwrap();
        assert_eq!(record.outcome, TestOutcome::Passed);
        assert_eq!(record.duration_in_ms, 40);
        assert_eq!(
            fixture.transport.request_lines(),
            ["GET /test/runs/7/results", "PATCH /test/runs/7/results"]
        );
    }

    #[tokio::test]
    async fn test_end_for_other_test_does_not_reuse_handle() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 first")).await;
        reporter.on_test_end(&TestEnd::passed("C42 first", 5)).await;
        reporter.on_test_end(&TestEnd::passed("C43 second", 7)).await;

        assert_eq!(reporter.results().get(100042).unwrap().duration_in_ms, 5);
        assert_eq!(reporter.results().get(100043).unwrap().duration_in_ms, 7);
    }

    #[tokio::test]
    async fn test_skip_without_start() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_skip(&TestInfo::new("C43 logs out")).await;

        assert_eq!(
            fixture.transport.request_lines(),
            ["GET /test/runs/7/results", "PATCH /test/runs/7/results"]
        );
        assert_eq!(reporter.results().len(), 1);
        let record = reporter.results().get(100043).unwrap();
        assert_eq!(record.outcome, TestOutcome::NotApplicable);
        assert_eq!(record.state, ResultState::Completed);
        assert_eq!(fixture.updates()[0][0]["outcome"], json!("NotApplicable"));
    }

    #[tokio::test]
    async fn test_skip_without_case_id() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 logs in")).await;
        reporter
            .on_test_skip(&TestInfo::new("logs out").with_parent("Logout"))
            .await;

        // The earlier test's result is left alone.
        assert_eq!(
            fixture.transport.request_lines(),
            ["GET /test/runs/7/results", "PATCH /test/runs/7/results"]
        );
        assert_eq!(reporter.results().len(), 1);
        assert_eq!(
            reporter.results().get(100042).unwrap().outcome,
            TestOutcome::InProgress
        );
    }

    #[tokio::test]
    async fn test_only_changed_records_are_sent() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 first")).await;
        reporter.on_test_end(&TestEnd::passed("C42 first", 5)).await;
        reporter.on_test_start(&TestInfo::new("C43 second")).await;

        let updates = fixture.updates();
        let last: Vec<_> = updates[2]
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["id"].clone())
            .collect();
        assert_eq!(last, [json!(100043)]);
    }

    #[tokio::test]
    async fn test_failed_sync_is_retried() {
        let fixture = Fixture::new().with_active_run();
        fixture
            .transport
            .respond(Method::Patch, "/test/runs/7/results", 500, json!({}));
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 first")).await;
        assert_eq!(reporter.results().pending().len(), 1);

        fixture
            .transport
            .respond(Method::Patch, "/test/runs/7/results", 200, json!({}));
        reporter.on_test_start(&TestInfo::new("C43 second")).await;

        let updates = fixture.updates();
        assert_eq!(updates[1].as_array().unwrap().len(), 2);
        assert!(reporter.results().pending().is_empty());
    }

    #[tokio::test]
    async fn test_failure_screenshot_is_attached() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 logs in")).await;
        let mut end = TestEnd::failed("C42 logs in", 10, failure());
        end.screenshot = Some("aGVsbG8=".to_owned());
        reporter.on_test_end(&end).await;

        let requests = fixture.transport.requests();
        let attachment = requests.last().unwrap();
        assert_eq!(attachment.path, "/test/runs/7/results/100042/attachments");
        let body = attachment.body.as_ref().unwrap();
        assert_eq!(body["fileName"], json!("C42_logs_in.png"));
        assert_eq!(body["comment"], json!("Failure Screenshot"));
        assert!(fixture.config.screenshot_path.join("C42_logs_in.png").exists());
    }

    #[derive(Debug)]
    struct FailingProvider;

    impl ScreenshotProvider for FailingProvider {
        fn capture(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("browser closed".into())
        }
    }

    #[tokio::test]
    async fn test_screenshot_failure_is_logged() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture
            .reporter()
            .with_screenshot_provider(Arc::new(FailingProvider));

        reporter.on_test_start(&TestInfo::new("C42 logs in")).await;
        reporter
            .on_test_end(&TestEnd::failed("C42 logs in", 10, failure()))
            .await;

        assert_eq!(
            reporter.results().get(100042).unwrap().outcome,
            TestOutcome::Failed
        );
        assert!(
            fixture
                .transport
                .request_lines()
                .iter()
                .all(|line| !line.ends_with("/attachments"))
        );
    }

    #[tokio::test]
    async fn test_runner_end_completes_run() {
        let fixture = Fixture::new().with_active_run();
        let mut reporter = fixture.reporter();

        reporter.on_test_start(&TestInfo::new("C42 logs in")).await;
        reporter
            .handle_event(&RunnerEvent::RunnerEnd(RunnerStats { failures: 0 }))
            .await;

        assert_eq!(reporter.context(), &RunContext::new());
        assert!(reporter.results().is_empty());
        let requests = fixture.transport.requests();
        let complete = requests.last().unwrap();
        assert_eq!(complete.path, "/test/runs/7");
        assert_eq!(complete.body, Some(json!({ "state": "Completed" })));
    }
}
