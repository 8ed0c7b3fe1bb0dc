//! Error types for the pdfbatch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] is **fatal**: the stage cannot proceed at all
//!   (unknown task, missing prerequisite, conversion engine will not start).
//!   Returned as `Err(PipelineError)` from every [`crate::Pipeline`] stage.
//!
//! * [`ItemFailure`] is **non-fatal**: one document failed to convert or
//!   could not be appended to the merged PDF, but the rest of the batch is
//!   fine. Stored in the task's results and log, never propagated.
//!
//! Every `PipelineError` belongs to one [`ErrorKind`], which is what the HTTP
//! surface maps to a status code.

use std::path::PathBuf;
use thiserror::Error;

/// Caller-visible category of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The task or one of its stage prerequisites does not exist (yet).
    NotFound,
    /// The request itself cannot be satisfied (nothing uploaded, nothing to convert).
    InvalidInput,
    /// Infrastructure failure: engine, disk, archive writer.
    Internal,
}

/// All fatal errors returned by the pdfbatch library.
///
/// Item-level failures use [`ItemFailure`] and are recorded on the task
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Not found ─────────────────────────────────────────────────────────
    /// No upload directory (or registry record) exists for this task id.
    #[error("Task '{task_id}' not found")]
    TaskNotFound { task_id: String },

    /// Merge was requested before any converted output exists.
    #[error("PDF folder for task '{task_id}' does not exist\nRun the convert stage first.")]
    PdfFolderNotFound { task_id: String },

    /// Package was requested but the original uploads are gone.
    #[error("Upload folder for task '{task_id}' does not exist")]
    UploadFolderNotFound { task_id: String },

    /// Package was requested before merge produced its output.
    #[error("Merged PDF for task '{task_id}' does not exist\nRun the merge stage first.")]
    MergedFileNotFound { task_id: String },

    /// The requested artifact has not been built by its stage.
    #[error("Artifact '{artifact}' for task '{task_id}' is not ready")]
    ArtifactNotReady { task_id: String, artifact: String },

    // ── Invalid input ─────────────────────────────────────────────────────
    /// Upload called with an empty file set.
    #[error("No files provided")]
    NoFilesProvided,

    /// The upload directory holds no eligible source documents.
    #[error("No convertible .{extension} files found for task '{task_id}'")]
    NoConvertibleItems { task_id: String, extension: String },

    /// Download called with an unknown artifact kind.
    #[error("Unknown artifact type '{0}' (expected merged, pdfs, docx or complete)")]
    InvalidArtifactKind(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Registry ──────────────────────────────────────────────────────────
    /// `create` was called twice for the same id.
    #[error("Task '{task_id}' already exists")]
    AlreadyExists { task_id: String },

    // ── Engines ───────────────────────────────────────────────────────────
    /// The conversion engine could not be started for this batch.
    #[error("Conversion engine error: {0}")]
    ConversionEngine(#[source] EngineError),

    /// The merge engine could not be started or could not write its output.
    #[error("Merge engine error: {0}")]
    MergeEngine(#[source] EngineError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A task directory or file could not be read or written.
    #[error("{context} '{path}': {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The zip writer failed.
    #[error("Failed to write archive '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The caller-visible category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::TaskNotFound { .. }
            | PipelineError::PdfFolderNotFound { .. }
            | PipelineError::UploadFolderNotFound { .. }
            | PipelineError::MergedFileNotFound { .. }
            | PipelineError::ArtifactNotReady { .. } => ErrorKind::NotFound,
            PipelineError::NoFilesProvided
            | PipelineError::NoConvertibleItems { .. }
            | PipelineError::InvalidArtifactKind(_)
            | PipelineError::InvalidConfig(_) => ErrorKind::InvalidInput,
            PipelineError::AlreadyExists { .. }
            | PipelineError::ConversionEngine(_)
            | PipelineError::MergeEngine(_)
            | PipelineError::Io { .. }
            | PipelineError::Archive { .. }
            | PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable name of the variant, used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::TaskNotFound { .. } => "task_not_found",
            PipelineError::PdfFolderNotFound { .. } => "pdf_folder_not_found",
            PipelineError::UploadFolderNotFound { .. } => "upload_folder_not_found",
            PipelineError::MergedFileNotFound { .. } => "merged_file_not_found",
            PipelineError::ArtifactNotReady { .. } => "artifact_not_ready",
            PipelineError::NoFilesProvided => "no_files_provided",
            PipelineError::NoConvertibleItems { .. } => "no_convertible_items",
            PipelineError::InvalidArtifactKind(_) => "invalid_artifact_kind",
            PipelineError::InvalidConfig(_) => "invalid_config",
            PipelineError::AlreadyExists { .. } => "already_exists",
            PipelineError::ConversionEngine(_) => "conversion_engine_error",
            PipelineError::MergeEngine(_) => "merge_engine_error",
            PipelineError::Io { .. } => "io_error",
            PipelineError::Archive { .. } => "archive_error",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Failure to start, drive or tear down an external engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine binary or library could not be loaded or launched.
    #[error("{engine} could not be started: {detail}")]
    Unavailable { engine: &'static str, detail: String },

    /// The engine started but failed to produce its output.
    #[error("{engine} failed: {detail}")]
    Failed { engine: &'static str, detail: String },
}

/// A non-fatal error for a single item of a batch.
///
/// Stored alongside the item's outcome; the batch continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemFailure {
    /// The document could not be converted to PDF.
    #[error("{item}: conversion failed: {reason}")]
    ConversionFailed { item: String, reason: String },

    /// The converted PDF could not be appended to the merged output.
    #[error("{item}: merge append failed: {reason}")]
    AppendFailed { item: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_share_a_kind() {
        let errors = [
            PipelineError::TaskNotFound { task_id: "t".into() },
            PipelineError::PdfFolderNotFound { task_id: "t".into() },
            PipelineError::UploadFolderNotFound { task_id: "t".into() },
            PipelineError::MergedFileNotFound { task_id: "t".into() },
            PipelineError::ArtifactNotReady {
                task_id: "t".into(),
                artifact: "complete".into(),
            },
        ];
        for e in errors {
            assert_eq!(e.kind(), ErrorKind::NotFound, "{e}");
        }
    }

    #[test]
    fn invalid_input_kinds() {
        assert_eq!(PipelineError::NoFilesProvided.kind(), ErrorKind::InvalidInput);
        let e = PipelineError::NoConvertibleItems {
            task_id: "t".into(),
            extension: "docx".into(),
        };
        assert_eq!(e.kind(), ErrorKind::InvalidInput);
        assert!(e.to_string().contains(".docx"), "got: {e}");
    }

    #[test]
    fn engine_error_is_internal_and_keeps_source() {
        let e = PipelineError::ConversionEngine(EngineError::Unavailable {
            engine: "soffice",
            detail: "not installed".into(),
        });
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert_eq!(e.code(), "conversion_engine_error");
        assert!(std::error::Error::source(&e).is_some());
        assert!(e.to_string().contains("not installed"));
    }

    #[test]
    fn item_failure_display() {
        let f = ItemFailure::ConversionFailed {
            item: "b.docx".into(),
            reason: "corrupt".into(),
        };
        let msg = f.to_string();
        assert!(msg.contains("b.docx"), "got: {msg}");
        assert!(msg.contains("corrupt"), "got: {msg}");
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidInput).unwrap();
        assert_eq!(json, "\"invalid_input\"");
    }
}
