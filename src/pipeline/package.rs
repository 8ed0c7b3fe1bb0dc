//! Package stage: originals plus the merged PDF in one zip.

use super::Pipeline;
use crate::archive::ArchiveBuilder;
use crate::error::PipelineError;
use crate::registry::{PackageInfo, TaskId};
use crate::storage::sanitize_file_name;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct PackageOutput {
    pub file_name: String,
    /// Top-level folder inside the archive: the file name without `.zip`.
    pub folder_name: String,
    pub file_count: usize,
    pub archive_path: PathBuf,
}

impl Pipeline {
    /// Zip every eligible original and the merged PDF into
    /// `complete/<task_id>_<file_name>`.
    ///
    /// `file_name` defaults to `<package_prefix>_<task_id>.zip`. The archive
    /// appears under its final name only once complete; on failure nothing
    /// is left behind and the package flag stays false.
    ///
    /// # Errors
    /// `UploadFolderNotFound` then `MergedFileNotFound` (checked in that
    /// order), `Io`/`Archive` when writing the zip fails.
    pub fn package(
        &self,
        task_id: &TaskId,
        file_name: Option<&str>,
    ) -> Result<PackageOutput, PipelineError> {
        let result = self.build_package(task_id, file_name);
        self.finish_stage(task_id, "Packaging", result)
    }

    /// Archive file name for a requested name, falling back to the default.
    pub(crate) fn package_name(&self, task_id: &TaskId, requested: Option<&str>) -> String {
        requested
            .map(sanitize_file_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.default_package_name(task_id.as_str()))
    }

    fn build_package(
        &self,
        task_id: &TaskId,
        requested: Option<&str>,
    ) -> Result<PackageOutput, PipelineError> {
        let file_name = self.package_name(task_id, requested);
        let folder_name = match file_name.strip_suffix(".zip") {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => file_name.clone(),
        };

        let upload_dir = self.layout.upload_dir(task_id);
        if !upload_dir.is_dir() {
            return Err(PipelineError::UploadFolderNotFound {
                task_id: task_id.to_string(),
            });
        }
        let merged = self.layout.merged_file(task_id);
        if !merged.is_file() {
            return Err(PipelineError::MergedFileNotFound {
                task_id: task_id.to_string(),
            });
        }
        self.recover_record(task_id, &upload_dir);

        self.registry.update(task_id, |record| {
            record.flags.package_done = false;
            record.package = None;
            record.push_log(format!(
                "Packaging task {task_id} as {file_name} (folder {folder_name})"
            ));
        })?;

        let archive_path = self.layout.package_file(task_id, &file_name);
        let sources = self.layout.discover_sources(task_id)?;

        let mut archive = ArchiveBuilder::create(&archive_path)?;
        for name in &sources {
            let entry = format!("{folder_name}/{name}");
            archive.add_file(&upload_dir.join(name), &entry)?;
            self.log(task_id, format!("Added original: {entry}"));
        }
        let merged_entry = format!("{folder_name}/{}", self.config.merged_entry_name);
        archive.add_file(&merged, &merged_entry)?;
        self.log(task_id, format!("Added merged PDF: {merged_entry}"));

        let file_count = archive.entries();
        let archive_path = archive.finish()?;

        let info = PackageInfo {
            archive_path: archive_path.clone(),
            file_name: file_name.clone(),
            folder_name: folder_name.clone(),
            file_count,
        };
        self.registry.update(task_id, |record| {
            record.flags.package_done = true;
            record.package = Some(info);
            record.push_log(format!(
                "Packaging finished: {file_count} files in {}",
                archive_path.display()
            ));
        })?;
        info!(task = %task_id, "Packaged {} files into {}", file_count, archive_path.display());

        Ok(PackageOutput {
            file_name,
            folder_name,
            file_count,
            archive_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{files, pipeline};
    use super::*;
    use std::fs::File;
    use zip::ZipArchive;

    fn entries(path: &std::path::Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn packages_originals_and_merged_pdf() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["b.docx", "a.docx", "~$a.docx"])).unwrap();
        p.convert(&up.task_id).unwrap();
        p.merge(&up.task_id).unwrap();

        let out = p.package(&up.task_id, None).unwrap();
        let expected_name = format!("certificates_{}.zip", up.task_id);
        assert_eq!(out.file_name, expected_name);
        assert_eq!(out.folder_name, format!("certificates_{}", up.task_id));
        assert_eq!(out.file_count, 3);
        assert_eq!(
            out.archive_path,
            p.layout().package_file(&up.task_id, &expected_name)
        );

        let folder = &out.folder_name;
        assert_eq!(
            entries(&out.archive_path),
            vec![
                format!("{folder}/a.docx"),
                format!("{folder}/b.docx"),
                format!("{folder}/merged_certificates.pdf"),
            ]
        );

        let progress = p.progress(&up.task_id).unwrap();
        assert!(progress.package_done);
        assert!(progress.done);
        assert_eq!(progress.package.unwrap().file_count, 3);
    }

    #[test]
    fn custom_name_is_sanitized() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();
        p.convert(&up.task_id).unwrap();
        p.merge(&up.task_id).unwrap();

        let out = p.package(&up.task_id, Some("../batch-7.zip")).unwrap();
        assert_eq!(out.file_name, "batch-7.zip");
        assert_eq!(out.folder_name, "batch-7");
        assert!(out.archive_path.ends_with(format!("{}_batch-7.zip", up.task_id)));
    }

    #[test]
    fn package_before_merge() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();
        p.convert(&up.task_id).unwrap();

        let err = p.package(&up.task_id, None).unwrap_err();
        assert!(matches!(err, PipelineError::MergedFileNotFound { .. }));
        let progress = p.progress(&up.task_id).unwrap();
        assert!(!progress.package_done);
        assert!(progress.package.is_none());
    }

    #[test]
    fn upload_folder_is_checked_first() {
        let (_root, p) = pipeline();
        let err = p
            .package(&TaskId::parse("ghost").unwrap(), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::UploadFolderNotFound { .. }));
    }

    #[test]
    fn failed_rerun_clears_previous_package_state() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();
        p.convert(&up.task_id).unwrap();
        p.merge(&up.task_id).unwrap();
        p.package(&up.task_id, Some("pkg.zip")).unwrap();
        assert!(p.progress(&up.task_id).unwrap().package_done);

        // The archive directory can no longer be created.
        let complete = p.config().complete_dir.clone();
        std::fs::remove_dir_all(&complete).unwrap();
        std::fs::write(&complete, b"not a directory").unwrap();

        let err = p.package(&up.task_id, Some("pkg.zip")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        let progress = p.progress(&up.task_id).unwrap();
        assert!(!progress.package_done);
        assert!(progress.package.is_none());
        assert!(!progress.done);
    }

    #[test]
    fn failure_after_entries_are_written_leaves_no_archive() {
        use crate::config::PipelineConfig;
        use crate::engine::testing::{FakeConverter, FakeMerger};
        use crate::registry::TaskRegistry;
        use std::sync::Arc;

        // An upload named like the merged entry collides with it inside the
        // archive, after both originals have been written.
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .storage_root(root.path())
            .source_extension("pdf")
            .build()
            .unwrap();
        let p = Pipeline::new(
            config,
            Arc::new(TaskRegistry::new()),
            Arc::new(FakeConverter::default()),
            Arc::new(FakeMerger),
        )
        .unwrap();
        let up = p
            .upload(files(&["a.pdf", "merged_certificates.pdf"]))
            .unwrap();
        p.convert(&up.task_id).unwrap();
        p.merge(&up.task_id).unwrap();

        let err = p.package(&up.task_id, Some("pkg.zip")).unwrap_err();
        assert!(matches!(err, PipelineError::Archive { .. }));
        assert!(!p.layout().package_file(&up.task_id, "pkg.zip").exists());
        let leftovers = std::fs::read_dir(&p.config().complete_dir).unwrap().count();
        assert_eq!(leftovers, 0);

        let progress = p.progress(&up.task_id).unwrap();
        assert!(!progress.package_done);
        assert!(progress.package.is_none());
        assert!(progress
            .logs
            .iter()
            .any(|l| l.ends_with("/merged_certificates.pdf") && l.starts_with("Added original")));
        assert!(progress.logs.last().is_some_and(|l| l.starts_with("Packaging failed")));
    }
}
