//! Configuration types for the batch pipeline.
//!
//! Everything a [`crate::Pipeline`] needs to know about the outside world
//! lives in [`PipelineConfig`], built via its [`PipelineConfigBuilder`]:
//! where the four storage roots are, which files count as source documents,
//! how the final package is named, and where the external engines live.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration for a batch pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfbatch::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .storage_root("/var/lib/pdfbatch")
///     .merged_entry_name("all.pdf")
///     .build()
///     .unwrap();
/// assert!(config.uploads_dir.ends_with("uploads"));
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Raw uploads, one sub-directory per task. Default: `uploads`.
    pub uploads_dir: PathBuf,

    /// Converted PDFs, one sub-directory per task. Default: `pdfs`.
    pub pdfs_dir: PathBuf,

    /// Merged PDFs, `<task_id>_merged.pdf`. Default: `merged`.
    pub merged_dir: PathBuf,

    /// Final packages, `<task_id>_<file name>`. Default: `complete`.
    pub complete_dir: PathBuf,

    /// Extension (without dot) of the documents picked up by convert. Default: `docx`.
    pub source_extension: String,

    /// Names starting with this prefix are editor lock files and never
    /// converted or packaged. Default: `~$`.
    pub lock_file_prefix: String,

    /// Name of the merged PDF inside the final package. Default: `merged_certificates.pdf`.
    pub merged_entry_name: String,

    /// Prefix of the default package name, `<prefix>_<task_id>.zip`. Default: `certificates`.
    pub package_prefix: String,

    /// LibreOffice executable used for conversion. Default: `soffice` (from `PATH`).
    pub soffice_path: PathBuf,

    /// pdfium shared library used for merging. `None` binds the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional observer for per-item convert events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            pdfs_dir: PathBuf::from("pdfs"),
            merged_dir: PathBuf::from("merged"),
            complete_dir: PathBuf::from("complete"),
            source_extension: "docx".to_string(),
            lock_file_prefix: "~$".to_string(),
            merged_entry_name: "merged_certificates.pdf".to_string(),
            package_prefix: "certificates".to_string(),
            soffice_path: PathBuf::from("soffice"),
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("uploads_dir", &self.uploads_dir)
            .field("pdfs_dir", &self.pdfs_dir)
            .field("merged_dir", &self.merged_dir)
            .field("complete_dir", &self.complete_dir)
            .field("source_extension", &self.source_extension)
            .field("lock_file_prefix", &self.lock_file_prefix)
            .field("merged_entry_name", &self.merged_entry_name)
            .field("package_prefix", &self.package_prefix)
            .field("soffice_path", &self.soffice_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn StageProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default package file name for a task.
    pub fn default_package_name(&self, task_id: &str) -> String {
        format!("{}_{}.zip", self.package_prefix, task_id)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Place all four storage directories under `root`.
    pub fn storage_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.config.uploads_dir = root.join("uploads");
        self.config.pdfs_dir = root.join("pdfs");
        self.config.merged_dir = root.join("merged");
        self.config.complete_dir = root.join("complete");
        self
    }

    pub fn uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.uploads_dir = dir.into();
        self
    }

    pub fn pdfs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfs_dir = dir.into();
        self
    }

    pub fn merged_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.merged_dir = dir.into();
        self
    }

    pub fn complete_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.complete_dir = dir.into();
        self
    }

    /// Accepts `docx` or `.docx`.
    pub fn source_extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        self.config.source_extension = ext.trim_start_matches('.').to_ascii_lowercase();
        self
    }

    pub fn lock_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.lock_file_prefix = prefix.into();
        self
    }

    pub fn merged_entry_name(mut self, name: impl Into<String>) -> Self {
        self.config.merged_entry_name = name.into();
        self
    }

    pub fn package_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.package_prefix = prefix.into();
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.source_extension.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "source extension must not be empty".into(),
            ));
        }
        if c.merged_entry_name.is_empty() || c.merged_entry_name.contains(['/', '\\']) {
            return Err(PipelineError::InvalidConfig(format!(
                "merged entry name must be a plain file name, got '{}'",
                c.merged_entry_name
            )));
        }
        if c.package_prefix.contains(['/', '\\']) {
            return Err(PipelineError::InvalidConfig(format!(
                "package prefix must not contain path separators, got '{}'",
                c.package_prefix
            )));
        }
        let roots = [&c.uploads_dir, &c.pdfs_dir, &c.merged_dir, &c.complete_dir];
        for (i, a) in roots.iter().enumerate() {
            if roots[i + 1..].contains(a) {
                return Err(PipelineError::InvalidConfig(format!(
                    "storage directories must be distinct, '{}' is used twice",
                    a.display()
                )));
            }
        }
        Ok(self.config)
    }
}
