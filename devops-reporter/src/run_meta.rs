// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run state: the in-process [`RunContext`], and the meta file that hands the run id from the
//! process that created the run to the processes that report into it.

use crate::errors::RunMetaError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// The active run, as seen by this process.
///
/// Passed to every [`DevOpsClient`](crate::client::DevOpsClient) operation that needs a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunContext {
    run_id: Option<u64>,
    point_ids: Vec<u64>,
}

impl RunContext {
    /// Creates a context with no active run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context with the given active run.
    pub fn with_run_id(run_id: u64) -> Self {
        Self {
            run_id: Some(run_id),
            point_ids: Vec::new(),
        }
    }

    /// The active run id, if any.
    pub fn run_id(&self) -> Option<u64> {
        self.run_id
    }

    /// Sets the active run id.
    pub fn set_run_id(&mut self, run_id: u64) {
        self.run_id = Some(run_id);
    }

    /// The test point ids fetched for the run.
    pub fn point_ids(&self) -> &[u64] {
        &self.point_ids
    }

    pub(crate) fn set_point_ids(&mut self, point_ids: Vec<u64>) {
        self.point_ids = point_ids;
    }

    /// Clears the active run and the cached point ids.
    pub fn reset(&mut self) {
        self.run_id = None;
        self.point_ids.clear();
    }
}

/// The contents of the meta file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    /// The id of the run created for this test session.
    pub test_run_id: u64,
}

/// Reads and writes the meta file.
#[derive(Clone, Debug)]
pub struct RunMetaStore {
    path: Utf8PathBuf,
}

impl RunMetaStore {
    /// Creates a store for the meta file at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path to the meta file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Loads the meta file. Returns `Ok(None)` if it doesn't exist.
    pub fn load(&self) -> Result<Option<RunMeta>, RunMetaError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let meta = serde_json::from_str(&contents).map_err(|error| {
                    RunMetaError::Deserialize {
                        path: self.path.clone(),
                        error,
                    }
                })?;
                Ok(Some(meta))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(RunMetaError::Read {
                path: self.path.clone(),
                error,
            }),
        }
    }

    /// Writes the meta file, replacing any previous contents.
    pub fn save(&self, meta: &RunMeta) -> Result<(), RunMetaError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| RunMetaError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let contents =
            serde_json::to_string(meta).map_err(|error| RunMetaError::Serialize { error })?;

        atomicwrites::AtomicFile::new(&self.path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(contents.as_bytes()))
            .map_err(|error| RunMetaError::Write {
                path: self.path.clone(),
                error,
            })
    }
}
