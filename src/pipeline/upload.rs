//! Upload stage: persist a batch of files under a fresh task id.

use super::Pipeline;
use crate::error::PipelineError;
use crate::registry::TaskId;
use crate::storage::sanitize_file_name;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// One uploaded file: the client-supplied name and its bytes.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a local file, keeping its file name.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let content =
            std::fs::read(path).map_err(|e| PipelineError::io("Failed to read input file", path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self { name, content })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutput {
    pub task_id: TaskId,
    /// Files actually written (entries with an unusable name are skipped).
    pub file_count: usize,
}

impl Pipeline {
    /// Create a task and store `files` in `uploads/<task_id>/`.
    ///
    /// Every file is stored under its sanitized base name; a later file with
    /// the same name overwrites an earlier one.
    ///
    /// # Errors
    /// `NoFilesProvided` when `files` is empty (nothing is created), `Io`
    /// when the task directory or a file cannot be written.
    pub fn upload(&self, files: Vec<UploadFile>) -> Result<UploadOutput, PipelineError> {
        if files.is_empty() {
            return Err(PipelineError::NoFilesProvided);
        }

        let task_id = TaskId::generate();
        let dir = self.layout.upload_dir(&task_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::io("Failed to create upload directory", &dir, e))?;

        let mut file_count = 0;
        for file in files {
            let name = sanitize_file_name(&file.name);
            if name.is_empty() {
                debug!("Skipping upload entry with unusable name {:?}", file.name);
                continue;
            }
            let path = dir.join(&name);
            std::fs::write(&path, &file.content)
                .map_err(|e| PipelineError::io("Failed to store uploaded file", &path, e))?;
            file_count += 1;
        }

        self.registry.create(&task_id)?;
        self.log(
            &task_id,
            format!("Uploaded {file_count} files, task id: {task_id}"),
        );

        Ok(UploadOutput {
            task_id,
            file_count,
        })
    }
}
