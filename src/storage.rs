//! On-disk layout of task directories and file discovery.
//!
//! ```text
//! uploads/<id>/            original documents, as uploaded
//! uploads/<id>.zip         on-demand zip of the originals
//! pdfs/<id>/               one PDF per converted document
//! pdfs/<id>.zip            on-demand zip of the PDFs
//! merged/<id>_merged.pdf   concatenated PDF
//! complete/<id>_<name>     final package
//! ```

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::registry::TaskId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves task-scoped paths under the four storage roots.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    uploads: PathBuf,
    pdfs: PathBuf,
    merged: PathBuf,
    complete: PathBuf,
    source_extension: String,
    lock_file_prefix: String,
}

impl StorageLayout {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            uploads: config.uploads_dir.clone(),
            pdfs: config.pdfs_dir.clone(),
            merged: config.merged_dir.clone(),
            complete: config.complete_dir.clone(),
            source_extension: config.source_extension.clone(),
            lock_file_prefix: config.lock_file_prefix.clone(),
        }
    }

    /// Create the four roots if missing.
    pub fn ensure_roots(&self) -> Result<(), PipelineError> {
        for dir in [&self.uploads, &self.pdfs, &self.merged, &self.complete] {
            std::fs::create_dir_all(dir)
                .map_err(|e| PipelineError::io("Failed to create storage directory", dir, e))?;
        }
        Ok(())
    }

    pub fn upload_dir(&self, id: &TaskId) -> PathBuf {
        self.uploads.join(id.as_str())
    }

    pub fn upload_zip(&self, id: &TaskId) -> PathBuf {
        self.uploads.join(format!("{id}.zip"))
    }

    pub fn pdf_dir(&self, id: &TaskId) -> PathBuf {
        self.pdfs.join(id.as_str())
    }

    pub fn pdf_zip(&self, id: &TaskId) -> PathBuf {
        self.pdfs.join(format!("{id}.zip"))
    }

    pub fn merged_file(&self, id: &TaskId) -> PathBuf {
        self.merged.join(format!("{id}_merged.pdf"))
    }

    pub fn package_file(&self, id: &TaskId, file_name: &str) -> PathBuf {
        self.complete.join(format!("{id}_{file_name}"))
    }

    /// Is `name` a source document the convert stage should pick up?
    pub fn is_source_document(&self, name: &str) -> bool {
        if !self.lock_file_prefix.is_empty() && name.starts_with(&self.lock_file_prefix) {
            return false;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(&self.source_extension),
            None => false,
        }
    }

    /// Eligible source documents of a task, sorted by name.
    pub fn discover_sources(&self, id: &TaskId) -> Result<Vec<String>, PipelineError> {
        let dir = self.upload_dir(id);
        let names = list_files(&dir, |name| self.is_source_document(name))?;
        debug!("Discovered {} source documents in {}", names.len(), dir.display());
        Ok(names)
    }

    /// Converted PDFs of a task, sorted by name.
    ///
    /// This order is the page order of the merged document.
    pub fn list_converted(&self, id: &TaskId) -> Result<Vec<String>, PipelineError> {
        list_files(&self.pdf_dir(id), |name| {
            name.rsplit_once('.')
                .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
        })
    }
}

/// Regular files in `dir` whose name passes `keep`, sorted by name.
fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>, PipelineError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| PipelineError::io("Failed to list directory", dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io("Failed to list directory", dir, e))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        // Non-UTF-8 names cannot round-trip through JSON results; skip them.
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if keep(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Replace the extension of a source document with `.pdf`.
pub fn pdf_name_for(source_name: &str) -> String {
    match source_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.pdf"),
        _ => format!("{source_name}.pdf"),
    }
}

static RE_UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\x00-\x1f<>:"|?*]"#).unwrap());

/// Reduce a client-supplied file name to a safe basename.
///
/// Keeps only the last path component, strips control characters and
/// characters that are invalid on common file systems, and trims whitespace
/// and leading dots. Returns an empty string when nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned = RE_UNSAFE_CHARS.replace_all(base, "");
    cleaned.trim().trim_start_matches('.').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout(root: &Path) -> StorageLayout {
        let config = PipelineConfig::builder()
            .storage_root(root)
            .build()
            .unwrap();
        StorageLayout::new(&config)
    }

    #[test]
    fn paths_are_keyed_by_task_id() {
        let l = layout(Path::new("/data"));
        let id = TaskId::parse("abc").unwrap();
        assert_eq!(l.upload_dir(&id), PathBuf::from("/data/uploads/abc"));
        assert_eq!(l.pdf_zip(&id), PathBuf::from("/data/pdfs/abc.zip"));
        assert_eq!(l.merged_file(&id), PathBuf::from("/data/merged/abc_merged.pdf"));
        assert_eq!(
            l.package_file(&id, "x.zip"),
            PathBuf::from("/data/complete/abc_x.zip")
        );
    }

    #[test]
    fn eligibility_filter() {
        let l = layout(Path::new("/data"));
        assert!(l.is_source_document("a.docx"));
        assert!(l.is_source_document("B.DOCX"));
        assert!(!l.is_source_document("~$a.docx"));
        assert!(!l.is_source_document("a.doc"));
        assert!(!l.is_source_document("a.docx.tmp"));
        assert!(!l.is_source_document(".docx"));
        assert!(!l.is_source_document("docx"));
    }

    #[test]
    fn discovery_is_sorted_and_skips_dirs_and_locks() {
        let tmp = tempfile::tempdir().unwrap();
        let l = layout(tmp.path());
        let id = TaskId::parse("t").unwrap();
        let dir = l.upload_dir(&id);
        fs::create_dir_all(dir.join("nested.docx")).unwrap();
        for name in ["c.docx", "a.docx", "~$a.docx", "notes.txt", "b.docx"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        assert_eq!(
            l.discover_sources(&id).unwrap(),
            vec!["a.docx", "b.docx", "c.docx"]
        );
    }

    #[test]
    fn discovery_of_missing_dir_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let l = layout(tmp.path());
        let err = l.discover_sources(&TaskId::parse("t").unwrap()).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn pdf_names() {
        assert_eq!(pdf_name_for("report.docx"), "report.pdf");
        assert_eq!(pdf_name_for("a.b.docx"), "a.b.pdf");
        assert_eq!(pdf_name_for("noext"), "noext.pdf");
    }

    #[test]
    fn sanitize_strips_paths_and_junk() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\doc.docx"), "doc.docx");
        assert_eq!(sanitize_file_name("  a?b*.docx "), "ab.docx");
        assert_eq!(sanitize_file_name("..."), "");
        assert_eq!(sanitize_file_name(""), "");
        assert_eq!(sanitize_file_name("证书 1.docx"), "证书 1.docx");
    }
}
