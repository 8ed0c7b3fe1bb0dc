//! # pdfbatch
//!
//! Batch DOCX-to-PDF processing with per-task progress tracking.
//!
//! ## Why tasks?
//!
//! Converting a few hundred certificates with LibreOffice takes minutes. A
//! client uploads the batch once, gets a task id back, and then drives each
//! stage itself while polling progress. Every stage is idempotent per task
//! and can be re-run after a partial failure without re-uploading.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Upload   store under uploads/<id>/, create the task record
//!  ├─ 2. Convert  one LibreOffice session, items strictly sequential
//!  ├─ 3. Merge    concatenate the PDFs in file-name order via pdfium
//!  ├─ 4. Package  originals + merged PDF into one zip
//!  └─ 5. Download merged | pdfs | docx | complete
//! ```
//!
//! Progress (`current`/`total`/current item, per-item results, stage flags
//! and an append-only log) lives in the [`TaskRegistry`], which the
//! [`Pipeline`] updates after every item.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfbatch::{Pipeline, PipelineConfig, TaskRegistry, UploadFile};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().storage_root("data").build()?;
//!     let pipeline = Pipeline::with_default_engines(config, Arc::new(TaskRegistry::new()))?;
//!
//!     let upload = pipeline.upload(vec![UploadFile::from_path(Path::new("a.docx"))?])?;
//!     let converted = pipeline.convert(&upload.task_id)?;
//!     eprintln!("{}/{} converted", converted.success_count, converted.results.len());
//!     pipeline.merge(&upload.task_id)?;
//!     let package = pipeline.package(&upload.task_id, None)?;
//!     println!("{}", package.archive_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP surface ([`server`]) |
//! | `cli`    | on      | Enables the `pdfbatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when embedding only the library:
//! ```toml
//! pdfbatch = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! Conversion shells out to `soffice` (LibreOffice), merging binds the pdfium
//! shared library at runtime. Both are behind the [`engine`] traits and can
//! be replaced.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod storage;

#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use engine::{ConversionSession, Converter, MergeSession, Merger, PdfiumMerger, SofficeConverter};
pub use error::{EngineError, ErrorKind, ItemFailure, PipelineError};
pub use pipeline::{
    Artifact, ArtifactKind, ConvertOutput, MergeOutput, PackageOutput, Pipeline, UploadFile,
    UploadOutput,
};
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
pub use registry::{
    ItemOutcome, ItemStatus, PackageInfo, StageFlags, TaskId, TaskProgress, TaskRegistry,
};
pub use storage::StorageLayout;
