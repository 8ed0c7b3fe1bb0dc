//! Merge stage: concatenate a task's PDFs into one document.

use super::{remove_if_exists, Pipeline};
use crate::engine::MergeSession;
use crate::error::{EngineError, ItemFailure, PipelineError};
use crate::registry::TaskId;
use serde::Serialize;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutput {
    /// `None` when the task had no PDFs to merge.
    pub merged_file: Option<PathBuf>,
    pub pdf_count: usize,
    pub appended: usize,
    /// PDFs that could not be appended and are missing from the output.
    pub skipped: Vec<String>,
}

impl Pipeline {
    /// Concatenate `pdfs/<task_id>/*.pdf`, sorted by file name, into
    /// `merged/<task_id>_merged.pdf`.
    ///
    /// The previous merged file is removed before anything else, so a re-run
    /// that finds nothing to merge, or fails, never leaves an older output
    /// behind. An empty PDF folder is not an error: the result has no merged
    /// file and the merge flag stays false.
    ///
    /// # Errors
    /// `PdfFolderNotFound` when convert never ran, `MergeEngine` when the
    /// merger cannot start or cannot write the output.
    pub fn merge(&self, task_id: &TaskId) -> Result<MergeOutput, PipelineError> {
        let result = self.merge_pdfs(task_id);
        self.finish_stage(task_id, "Merge", result)
    }

    fn merge_pdfs(&self, task_id: &TaskId) -> Result<MergeOutput, PipelineError> {
        let pdf_dir = self.layout.pdf_dir(task_id);
        if !pdf_dir.is_dir() {
            return Err(PipelineError::PdfFolderNotFound {
                task_id: task_id.to_string(),
            });
        }
        self.recover_record(task_id, &pdf_dir);
        self.registry
            .update(task_id, |record| record.flags.merge_done = false)?;
        let dest = self.layout.merged_file(task_id);
        remove_if_exists(&dest)?;

        let pdfs = self.layout.list_converted(task_id)?;
        self.log(
            task_id,
            format!("Merging PDFs, task id: {task_id}, PDF count: {}", pdfs.len()),
        );
        if pdfs.is_empty() {
            self.log(task_id, "No PDF files to merge");
            return Ok(MergeOutput {
                merged_file: None,
                pdf_count: 0,
                appended: 0,
                skipped: Vec::new(),
            });
        }

        let out_dir = dest.parent().map(PathBuf::from).unwrap_or_default();
        let tmp = NamedTempFile::new_in(&out_dir)
            .map_err(|e| PipelineError::io("Failed to create merge output", &out_dir, e))?;

        let mut appended = 0;
        let mut skipped = Vec::new();
        self.merger
            .with_session(&mut |session: &mut dyn MergeSession| -> Result<(), EngineError> {
                for name in &pdfs {
                    match session.append_one(&pdf_dir.join(name)) {
                        Ok(()) => {
                            appended += 1;
                            self.log(task_id, format!("Merged file: {name}"));
                        }
                        Err(reason) => {
                            let failure = ItemFailure::AppendFailed {
                                item: name.clone(),
                                reason,
                            };
                            warn!(task = %task_id, "{}", failure);
                            self.log(task_id, format!("Skipped {failure}"));
                            skipped.push(name.clone());
                        }
                    }
                }
                session.write_out(tmp.path())
            })
            .map_err(PipelineError::MergeEngine)?;

        tmp.persist(&dest)
            .map_err(|e| PipelineError::io("Failed to move merged PDF into place", &dest, e.error))?;

        self.registry.update(task_id, |record| {
            record.flags.merge_done = true;
            record.push_log(format!("Merge finished, output file: {}", dest.display()));
        })?;
        info!(
            task = %task_id,
            "Merged {}/{} PDFs into {}",
            appended,
            pdfs.len(),
            dest.display()
        );

        Ok(MergeOutput {
            merged_file: Some(dest),
            pdf_count: pdfs.len(),
            appended,
            skipped,
        })
    }
}
