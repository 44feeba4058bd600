// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporter configuration.
//!
//! Configuration is read from a TOML file (by default [`DEFAULT_CONFIG_PATH`]). The personal
//! access token may be left out of the file and supplied through [`PAT_ENV`] instead.

use crate::errors::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use serde::Deserialize;
use std::{borrow::Cow, collections::BTreeMap, collections::BTreeSet, time::Duration};
use tracing::{debug, warn};

/// The default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".config/devops-reporter.toml";

/// The environment variable consulted for the personal access token.
pub const PAT_ENV: &str = "AZURE_DEVOPS_PAT";

/// The default directory failure screenshots are written to.
pub const DEFAULT_SCREENSHOT_PATH: &str = ".artifacts/screenshots";

/// The default location of the file that hands the run id from run setup to the reporter.
pub const DEFAULT_META_PATH: &str = "test-run-meta.json";

/// The default suite name used to look up `suite-mapping`.
pub const DEFAULT_SUITE_NAME: &str = "e2e";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved reporter configuration.
#[derive(Clone, Debug)]
pub struct ReporterConfig {
    /// How to reach the service.
    pub connection: ConnectionConfig,

    /// The test plan that runs are created in. Required to create runs.
    pub plan_id: Option<u64>,

    /// The suite that runs are created for.
    ///
    /// If unset, the suite is looked up by name in `suite_mapping`.
    pub suite_id: Option<u64>,

    /// Maps suite names to suite ids.
    pub suite_mapping: BTreeMap<String, u64>,

    /// The name of created runs. Defaults to a name derived from the suite.
    pub run_name: Option<String>,

    /// A report file to attach to the run when it completes.
    pub attach_report: Option<AttachReportConfig>,

    /// The directory failure screenshots are written to.
    pub screenshot_path: Utf8PathBuf,

    /// The file the run id is handed over through.
    pub meta_path: Utf8PathBuf,
}

impl ReporterConfig {
    /// Loads configuration from the TOML file at `path`.
    ///
    /// `env_pat` is used when the file doesn't set `pat`, and is usually the value of
    /// [`PAT_ENV`].
    pub fn from_path(path: &Utf8Path, env_pat: Option<String>) -> Result<Self, ConfigError> {
        debug!("config: loading from {path}");
        let contents = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_owned(),
            error,
        })?;
        Self::from_toml_str(&contents, path, env_pat)
    }

    /// Parses configuration from TOML contents. `path` is used for error reporting.
    pub fn from_toml_str(
        contents: &str,
        path: &Utf8Path,
        env_pat: Option<String>,
    ) -> Result<Self, ConfigError> {
        let (config, unknown) =
            DeserializedConfig::deserialize_toml(contents).map_err(|error| ConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;

        if !unknown.is_empty() {
            warn_unknown_keys(path, &unknown);
        }

        config.resolve(env_pat)
    }

    /// Resolves the suite id for `suite_name`: the explicit `suite_id` wins, then
    /// `suite_mapping`.
    pub fn resolve_suite_id(&self, suite_name: &str) -> Option<u64> {
        self.suite_id
            .or_else(|| self.suite_mapping.get(suite_name).copied())
    }

    /// The configured run name, or a name derived from `suite_name`.
    pub fn resolve_run_name(&self, suite_name: &str) -> String {
        match &self.run_name {
            Some(name) => name.clone(),
            None => format!("Automated Run for Suite: {suite_name}"),
        }
    }
}

/// How to reach the service.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The Azure DevOps organization.
    pub organization: String,

    /// The project within the organization.
    pub project: String,

    /// The personal access token. Excluded from debug output.
    pub pat: DebugIgnore<String>,

    /// Overall timeout applied to each request.
    pub http_timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a connection config, failing if any of the values is empty.
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        pat: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            organization: required("organization", Some(organization.into()))?,
            project: required("project", Some(project.into()))?,
            pat: DebugIgnore(required("pat", Some(pat.into()))?),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }
}

/// A report file attached to the run as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttachReportConfig {
    /// The kind of report, e.g. `html`. Used in the default comment.
    #[serde(rename = "type")]
    pub report_type: String,

    /// The report file.
    pub path: Utf8PathBuf,

    /// The attachment's file name.
    pub name: String,

    /// The attachment comment. Defaults to `"<type> Report"`.
    #[serde(default)]
    pub comment: Option<String>,

    /// The iteration to attach the report to, if any.
    #[serde(default)]
    pub iteration_id: Option<u32>,
}

impl AttachReportConfig {
    /// The attachment comment.
    pub fn comment(&self) -> Cow<'_, str> {
        match &self.comment {
            Some(comment) => Cow::Borrowed(comment),
            None => Cow::Owned(format!("{} Report", self.report_type)),
        }
    }
}

/// Configuration as written in the file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    pat: Option<String>,
    #[serde(default)]
    plan_id: Option<u64>,
    #[serde(default)]
    suite_id: Option<u64>,
    #[serde(default)]
    suite_mapping: BTreeMap<String, u64>,
    #[serde(default)]
    run_name: Option<String>,
    #[serde(default)]
    attach_report: Option<AttachReportConfig>,
    #[serde(default)]
    screenshot_path: Option<Utf8PathBuf>,
    #[serde(default)]
    meta_path: Option<Utf8PathBuf>,
    #[serde(default, with = "humantime_serde")]
    http_timeout: Option<Duration>,
}

impl DeserializedConfig {
    /// Deserializes TOML content and returns the config along with any unknown keys.
    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedConfig =
            serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
                let mut key = String::new();
                push_key(&mut key, &path);
                unknown.insert(key);
            })?;
        Ok((config, unknown))
    }

    fn resolve(self, env_pat: Option<String>) -> Result<ReporterConfig, ConfigError> {
        let pat = self.pat.filter(|pat| !pat.is_empty()).or(env_pat);
        let mut connection = ConnectionConfig {
            organization: required("organization", self.organization)?,
            project: required("project", self.project)?,
            pat: DebugIgnore(required("pat", pat)?),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        };
        if let Some(timeout) = self.http_timeout {
            connection.http_timeout = timeout;
        }

        Ok(ReporterConfig {
            connection,
            plan_id: self.plan_id,
            suite_id: self.suite_id,
            suite_mapping: self.suite_mapping,
            run_name: self.run_name.filter(|name| !name.is_empty()),
            attach_report: self.attach_report,
            screenshot_path: self
                .screenshot_path
                .unwrap_or_else(|| DEFAULT_SCREENSHOT_PATH.into()),
            meta_path: self.meta_path.unwrap_or_else(|| DEFAULT_META_PATH.into()),
        })
    }
}

/// Writes `path` as a dotted key. Optional values don't add a segment.
fn push_key(out: &mut String, path: &serde_ignored::Path<'_>) {
    use serde_ignored::Path;

    match path {
        Path::Root => {}
        Path::Seq { parent, index } => {
            push_key(out, parent);
            push_segment(out, &index.to_string());
        }
        Path::Map { parent, key } => {
            push_key(out, parent);
            push_segment(out, key);
        }
        Path::Some { parent }
        | Path::NewtypeStruct { parent }
        | Path::NewtypeVariant { parent } => push_key(out, parent),
    }
}

fn push_segment(out: &mut String, segment: &str) {
    if !out.is_empty() {
        out.push('.');
    }
    out.push_str(segment);
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingField { field }),
    }
}

fn warn_unknown_keys(config_file: &Utf8Path, unknown: &BTreeSet<String>) {
    let mut unknown_str = String::new();
    if unknown.len() == 1 {
        // Print this on the same line.
        unknown_str.push_str("key: ");
        unknown_str.extend(unknown.iter().map(String::as_str));
    } else {
        unknown_str.push_str("keys:\n");
        for ignored_key in unknown {
            unknown_str.push_str("\n  - ");
            unknown_str.push_str(ignored_key);
        }
    }

    warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
}
