// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    errors::DevOpsExitCode,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use devops_reporter::{
    client::{DevOpsClient, RunState},
    config::{DEFAULT_CONFIG_PATH, DEFAULT_SUITE_NAME, PAT_ENV, ReporterConfig},
    extract::{extract_step_ids, resolve_case_id},
    reporter::{Reporter, read_event_stream},
    service::RunService,
};
use std::io::{BufRead, BufReader, Write};
use tracing::info;

/// Report test runs to Azure DevOps Test Plans.
///
/// A typical session runs `start-run` before the tests, feeds the runner's events to `report`,
/// and runs `complete-run` afterwards.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct DevOpsReportApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl DevOpsReportApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self) -> Result<i32> {
        match self.command {
            Command::StartRun(opts) => opts.exec(&self.config_opts),
            Command::CompleteRun(opts) => opts.exec(&self.config_opts),
            Command::Report(opts) => opts.exec(&self.config_opts),
            Command::Extract(opts) => opts.exec(),
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/devops-reporter.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Test plan to create the run in, overriding the config file
    #[arg(long, global = true, value_name = "ID")]
    plan_id: Option<u64>,
}

impl ConfigOpts {
    fn make_config(&self) -> Result<ReporterConfig> {
        let path = self
            .config_file
            .as_deref()
            .unwrap_or(Utf8Path::new(DEFAULT_CONFIG_PATH));
        let mut config = ReporterConfig::from_path(path, std::env::var(PAT_ENV).ok())?;
        if let Some(plan_id) = self.plan_id {
            config.plan_id = Some(plan_id);
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a test run and record its id for `report`
    StartRun(StartRunOpts),

    /// Attach the configured report and complete the active test run
    CompleteRun(CompleteRunOpts),

    /// Replay test runner events into the active test run
    Report(ReportOpts),

    /// Print the test case and step ids in a test title
    Extract(ExtractOpts),
}

#[derive(Debug, Args)]
struct StartRunOpts {
    /// Suite name, looked up in `suite-mapping` [default: e2e]
    #[arg(long, value_name = "NAME")]
    suite_name: Option<String>,

    /// Suite id, overriding the config file and `suite-mapping`
    #[arg(long, value_name = "ID")]
    suite_id: Option<u64>,

    /// Run name, overriding the config file
    #[arg(long, value_name = "NAME")]
    run_name: Option<String>,
}

impl StartRunOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let mut config = config_opts.make_config()?;
        if let Some(suite_id) = self.suite_id {
            config.suite_id = Some(suite_id);
        }
        if let Some(run_name) = self.run_name {
            config.run_name = Some(run_name);
        }

        let client = DevOpsClient::new(&config.connection);
        let mut service = RunService::new(config, client)?;
        let suite_name = self.suite_name.as_deref();

        let run = runtime()?
            .block_on(service.on_prepare(suite_name))
            .map_err(|error| ExpectedError::RunCreation { error })?;
        let Some(run) = run else {
            return Err(ExpectedError::RunNotCreated {
                suite_name: suite_name.unwrap_or(DEFAULT_SUITE_NAME).to_owned(),
            });
        };

        if let Some(url) = &run.web_access_url {
            info!("test run {} is at {url}", run.id);
        }
        writeln!(std::io::stdout(), "{}", run.id)
            .map_err(|error| ExpectedError::WriteOutput { error })?;
        Ok(DevOpsExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct CompleteRunOpts {
    /// The state to move the run to
    #[arg(long, value_enum, default_value_t)]
    state: RunStateOpt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum RunStateOpt {
    #[default]
    Completed,
    Aborted,
}

impl From<RunStateOpt> for RunState {
    fn from(state: RunStateOpt) -> Self {
        match state {
            RunStateOpt::Completed => RunState::Completed,
            RunStateOpt::Aborted => RunState::Aborted,
        }
    }
}

impl CompleteRunOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let config = config_opts.make_config()?;
        let client = DevOpsClient::new(&config.connection);
        let mut service = RunService::new(config, client)?;

        runtime()?
            .block_on(service.on_complete(self.state.into()))
            .map_err(|error| ExpectedError::RunCompletion { error })?;
        Ok(DevOpsExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct ReportOpts {
    /// JSON-lines file of runner events, or `-` for stdin
    #[arg(value_name = "EVENTS")]
    events: Utf8PathBuf,
}

impl ReportOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let config = config_opts.make_config()?;
        let reader: Box<dyn BufRead> = if self.events == "-" {
            Box::new(std::io::stdin().lock())
        } else {
            let file = std::fs::File::open(&self.events).map_err(|error| {
                ExpectedError::EventStreamOpen {
                    path: self.events.clone(),
                    error,
                }
            })?;
            Box::new(BufReader::new(file))
        };

        let runtime = runtime()?;
        let mut reporter = Reporter::new(&config, DevOpsClient::new(&config.connection));
        let mut count = 0usize;
        for event in read_event_stream(reader) {
            let event = event.map_err(|error| ExpectedError::EventStream { error })?;
            runtime.block_on(reporter.handle_event(&event));
            count += 1;
        }

        info!("processed {count} events");
        Ok(DevOpsExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct ExtractOpts {
    /// The test title
    title: String,

    /// The parent suite title, used if the test title has no case id
    #[arg(long, value_name = "TITLE")]
    parent: Option<String>,
}

impl ExtractOpts {
    fn exec(self) -> Result<i32> {
        let ids = extracted_ids(&self.title, self.parent.as_deref());
        writeln!(std::io::stdout(), "{ids}").map_err(|error| ExpectedError::WriteOutput { error })?;
        Ok(DevOpsExitCode::OK)
    }
}

fn extracted_ids(title: &str, parent: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "caseId": resolve_case_id(title, parent),
        "stepIds": extract_step_ids(title),
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|error| ExpectedError::RuntimeBuild { error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_debug_assert() {
        DevOpsReportApp::command().debug_assert();
    }

    #[test]
    fn test_argument_parsing() {
        let valid: &[&[&str]] = &[
            &["devops-report", "start-run"],
            &[
                "devops-report",
                "start-run",
                "--suite-name",
                "smoke",
                "--run-name",
                "Nightly",
            ],
            &["devops-report", "--plan-id", "12", "start-run", "--suite-id", "34"],
            &["devops-report", "complete-run", "--state", "aborted"],
            &["devops-report", "report", "-", "--config-file", "ci.toml"],
            &["devops-report", "extract", "C42 logs in [S1]", "--parent", "Login"],
            &["devops-report", "--color", "never", "-v", "extract", "title"],
        ];
        for args in valid {
            if let Err(error) = DevOpsReportApp::try_parse_from(*args) {
                panic!("{args:?} should have succeeded, but failed: {error}");
            }
        }

        let invalid: &[&[&str]] = &[
            &["devops-report"],
            &["devops-report", "report"],
            &["devops-report", "start-run", "--suite-id", "abc"],
            &["devops-report", "complete-run", "--state", "failed"],
            &["devops-report", "start-run", "--state", "completed"],
        ];
        for args in invalid {
            if DevOpsReportApp::try_parse_from(*args).is_ok() {
                panic!("{args:?} should have failed, but succeeded");
            }
        }
    }

    #[test]
    fn test_extracted_ids() {
        assert_eq!(
            extracted_ids("Suite C42 [S1][S2]", None),
            json!({ "caseId": "42", "stepIds": ["1", "2"] })
        );
        assert_eq!(
            extracted_ids("logs in", Some("C7 Login")),
            json!({ "caseId": "7", "stepIds": [] })
        );
        assert_eq!(
            extracted_ids("logs in", None),
            json!({ "caseId": null, "stepIds": [] })
        );
    }
}
