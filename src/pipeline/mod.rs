//! Task stages: upload, convert, merge, package, download.
//!
//! Each submodule adds one stage to [`Pipeline`]. Stages are invoked
//! independently by the client, never chained automatically, and each one
//! can be re-run: it resets its own flag at start and overwrites its earlier
//! output.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ convert ──▶ merge ──▶ package ──▶ download
//! uploads/<id>/  pdfs/<id>/  merged/<id>_merged.pdf  complete/<id>_<name>
//! ```
//!
//! 1. [`upload`]   persist the files and create the task record
//! 2. [`convert`]  one conversion session for the whole batch, items strictly
//!    sequential, partial failure recorded per item
//! 3. [`merge`]    concatenate the converted PDFs in file-name order
//! 4. [`package`]  zip originals plus the merged PDF, all or nothing
//! 5. [`download`] resolve one of the four artifacts, zipping on demand
//!
//! All stages are blocking. Async callers run them on the blocking pool
//! (`tokio::task::spawn_blocking`), like every other pdfium call.

pub mod convert;
pub mod download;
pub mod merge;
pub mod package;
pub mod upload;

pub use convert::ConvertOutput;
pub use download::{Artifact, ArtifactKind};
pub use merge::MergeOutput;
pub use package::PackageOutput;
pub use upload::{UploadFile, UploadOutput};

use crate::config::PipelineConfig;
use crate::engine::{Converter, Merger, PdfiumMerger, SofficeConverter};
use crate::error::PipelineError;
use crate::progress::{NoopProgressCallback, StageProgressCallback};
use crate::registry::{TaskId, TaskProgress, TaskRegistry};
use crate::storage::StorageLayout;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The stage runner: storage layout, task registry and the two engines.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Pipeline {
    config: PipelineConfig,
    layout: StorageLayout,
    registry: Arc<TaskRegistry>,
    converter: Arc<dyn Converter>,
    merger: Arc<dyn Merger>,
}

impl Pipeline {
    /// Build a pipeline around explicit engines. Creates the storage roots.
    pub fn new(
        config: PipelineConfig,
        registry: Arc<TaskRegistry>,
        converter: Arc<dyn Converter>,
        merger: Arc<dyn Merger>,
    ) -> Result<Self, PipelineError> {
        let layout = StorageLayout::new(&config);
        layout.ensure_roots()?;
        Ok(Self {
            config,
            layout,
            registry,
            converter,
            merger,
        })
    }

    /// LibreOffice for conversion, pdfium for merging, both taken from `config`.
    pub fn with_default_engines(
        config: PipelineConfig,
        registry: Arc<TaskRegistry>,
    ) -> Result<Self, PipelineError> {
        let converter = Arc::new(SofficeConverter::new(config.soffice_path.clone()));
        let merger = Arc::new(PdfiumMerger::new(config.pdfium_lib_path.clone()));
        Self::new(config, registry, converter, merger)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Progress snapshot of a task; `TaskNotFound` for ids never seen.
    pub fn progress(&self, task_id: &TaskId) -> Result<TaskProgress, PipelineError> {
        self.registry.progress(task_id)
    }

    fn callback(&self) -> &dyn StageProgressCallback {
        match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &NoopProgressCallback,
        }
    }

    /// Append a line to the task log and mirror it to `tracing`.
    fn log(&self, task_id: &TaskId, line: impl Into<String>) {
        let line = line.into();
        info!(task = %task_id, "{}", line);
        if self.registry.append_log(task_id, line).is_err() {
            warn!(task = %task_id, "Log line dropped: task is not registered");
        }
    }

    /// Re-create the record of a task whose directory exists on disk but
    /// which this process has never seen (e.g. after a restart).
    fn recover_record(&self, task_id: &TaskId, dir: &Path) {
        if self.registry.ensure(task_id) {
            self.log(
                task_id,
                format!(
                    "Task record recovered from existing directory {}",
                    dir.display()
                ),
            );
        }
    }

    /// Record a fatal stage error in the task log, if the task is known.
    fn finish_stage<T>(
        &self,
        task_id: &TaskId,
        stage: &str,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        if let Err(e) = &result {
            let line = format!("{stage} failed: {e}");
            warn!(task = %task_id, "{}", line);
            if let Err(log_err) = self.registry.append_log(task_id, line) {
                debug!(task = %task_id, "Failure not logged to task: {}", log_err);
            }
        }
        result
    }
}

/// Remove `path` if it exists; a missing file is not an error.
fn remove_if_exists(path: &Path) -> Result<(), PipelineError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::io("Failed to remove stale file", path, e)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::testing::{FakeConverter, FakeMerger};
    use tempfile::TempDir;

    /// Pipeline over a fresh temp storage root with in-memory engines.
    pub(crate) fn pipeline_with(converter: FakeConverter) -> (TempDir, Pipeline) {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .storage_root(root.path())
            .build()
            .unwrap();
        let pipeline = Pipeline::new(
            config,
            Arc::new(TaskRegistry::new()),
            Arc::new(converter),
            Arc::new(FakeMerger),
        )
        .unwrap();
        (root, pipeline)
    }

    pub(crate) fn pipeline() -> (TempDir, Pipeline) {
        pipeline_with(FakeConverter::default())
    }

    pub(crate) fn files(names: &[&str]) -> Vec<UploadFile> {
        names
            .iter()
            .map(|name| UploadFile::new(*name, format!("content of {name}").into_bytes()))
            .collect()
    }
}
