// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{client::Attachment, errors::ArtifactError, helpers::screenshot_file_name};
use base64::{Engine, engine::general_purpose::STANDARD};
use camino::{Utf8Path, Utf8PathBuf};
use std::{error::Error, fmt};

/// The comment attached to failure screenshots.
pub const SCREENSHOT_COMMENT: &str = "Failure Screenshot";

/// Captures screenshots on behalf of the reporter, typically from a browser session owned by the
/// host.
pub trait ScreenshotProvider: fmt::Debug + Send + Sync {
    /// Captures the current screen as a base64-encoded PNG.
    fn capture(&self) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Writes failure screenshots to a directory.
#[derive(Clone, Debug)]
pub struct ScreenshotStore {
    dir: Utf8PathBuf,
}

impl ScreenshotStore {
    /// Creates a store that writes into `dir`, creating it on first use.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The screenshot directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Decodes `content_base64` and writes it to a file named after `title`, returning the
    /// attachment to upload.
    pub fn save(&self, title: &str, content_base64: &str) -> Result<Attachment, ArtifactError> {
        let bytes = STANDARD
            .decode(content_base64.trim())
            .map_err(|error| ArtifactError::Decode { error })?;

        std::fs::create_dir_all(&self.dir).map_err(|error| ArtifactError::CreateDir {
            path: self.dir.clone(),
            error,
        })?;

        let file_name = screenshot_file_name(title);
        let path = self.dir.join(&file_name);
        std::fs::write(&path, &bytes).map_err(|error| ArtifactError::Write {
            path: path.clone(),
            error,
        })?;

        Ok(Attachment {
            file_name,
            content_base64: STANDARD.encode(&bytes),
            comment: SCREENSHOT_COMMENT.to_owned(),
            iteration_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_save() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let store = ScreenshotStore::new(temp_dir.path().join("screens"));

        let attachment = store.save("C42 logs  in", "aGVsbG8=").unwrap();
        assert_eq!(attachment.file_name, "C42_logs_in.png");
        assert_eq!(attachment.comment, SCREENSHOT_COMMENT);
        assert_eq!(attachment.content_base64, "aGVsbG8=");

        let written = std::fs::read(store.dir().join("C42_logs_in.png")).unwrap();
        assert_eq!(written, b"hello");
    }

    #[test]
    fn test_save_invalid_base64() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let store = ScreenshotStore::new(temp_dir.path());
        assert!(matches!(
            store.save("t", "not base64!"),
            Err(ArtifactError::Decode { .. })
        ));
    }
}
