//! Download: resolve a task artifact to a file on disk.
//!
//! `pdfs` and `docx` are zipped on first request and cached next to their
//! folder; convert deletes the cached `pdfs` zip when it replaces the PDFs.
//! `complete` is only ever produced by the package stage.

use super::Pipeline;
use crate::archive::zip_directory;
use crate::error::PipelineError;
use crate::registry::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

const CONTENT_TYPE_PDF: &str = "application/pdf";
const CONTENT_TYPE_ZIP: &str = "application/zip";

/// The four downloadable artifacts of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The merged PDF.
    Merged,
    /// Zip of the converted PDFs.
    Pdfs,
    /// Zip of the uploaded originals.
    Docx,
    /// The final package.
    Complete,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Merged => "merged",
            ArtifactKind::Pdfs => "pdfs",
            ArtifactKind::Docx => "docx",
            ArtifactKind::Complete => "complete",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merged" => Ok(ArtifactKind::Merged),
            "pdfs" => Ok(ArtifactKind::Pdfs),
            "docx" => Ok(ArtifactKind::Docx),
            "complete" => Ok(ArtifactKind::Complete),
            other => Err(PipelineError::InvalidArtifactKind(other.to_string())),
        }
    }
}

/// A resolved artifact, ready to be streamed to a client.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// File name to present to the client.
    pub download_name: String,
    pub content_type: &'static str,
}

impl Pipeline {
    /// Resolve an artifact of a task.
    ///
    /// `file_name` only matters for [`ArtifactKind::Complete`]; without it
    /// the name recorded by the last package run is used, then the default.
    /// No registry record is required: artifacts are resolved from disk.
    pub fn download(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        file_name: Option<&str>,
    ) -> Result<Artifact, PipelineError> {
        let result = self.resolve_artifact(task_id, kind, file_name);
        self.finish_stage(task_id, "Download", result)
    }

    fn resolve_artifact(
        &self,
        task_id: &TaskId,
        kind: ArtifactKind,
        file_name: Option<&str>,
    ) -> Result<Artifact, PipelineError> {
        let not_ready = || PipelineError::ArtifactNotReady {
            task_id: task_id.to_string(),
            artifact: kind.to_string(),
        };

        let artifact = match kind {
            ArtifactKind::Merged => {
                let path = self.layout.merged_file(task_id);
                if !path.is_file() {
                    return Err(not_ready());
                }
                Artifact {
                    path,
                    download_name: format!("{task_id}_merged.pdf"),
                    content_type: CONTENT_TYPE_PDF,
                }
            }
            ArtifactKind::Pdfs => {
                let dir = self.layout.pdf_dir(task_id);
                if !dir.is_dir() {
                    return Err(PipelineError::PdfFolderNotFound {
                        task_id: task_id.to_string(),
                    });
                }
                let path = self.layout.pdf_zip(task_id);
                if !path.is_file() {
                    let count = zip_directory(&dir, &path)?;
                    info!(task = %task_id, "Zipped {} PDFs for download", count);
                }
                Artifact {
                    path,
                    download_name: format!("{task_id}.zip"),
                    content_type: CONTENT_TYPE_ZIP,
                }
            }
            ArtifactKind::Docx => {
                let dir = self.layout.upload_dir(task_id);
                if !dir.is_dir() {
                    return Err(PipelineError::TaskNotFound {
                        task_id: task_id.to_string(),
                    });
                }
                let path = self.layout.upload_zip(task_id);
                if !path.is_file() {
                    let count = zip_directory(&dir, &path)?;
                    info!(task = %task_id, "Zipped {} originals for download", count);
                }
                Artifact {
                    path,
                    download_name: format!("{task_id}.zip"),
                    content_type: CONTENT_TYPE_ZIP,
                }
            }
            ArtifactKind::Complete => {
                let recorded = self
                    .registry
                    .get(task_id)
                    .ok()
                    .and_then(|progress| progress.package)
                    .map(|package| package.file_name);
                let name = match file_name {
                    Some(requested) => self.package_name(task_id, Some(requested)),
                    None => recorded.unwrap_or_else(|| self.package_name(task_id, None)),
                };
                let path = self.layout.package_file(task_id, &name);
                if !path.is_file() {
                    return Err(not_ready());
                }
                Artifact {
                    path,
                    download_name: name,
                    content_type: CONTENT_TYPE_ZIP,
                }
            }
        };
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{files, pipeline};
    use super::*;

    #[test]
    fn parses_known_kinds_only() {
        assert_eq!("merged".parse::<ArtifactKind>().unwrap(), ArtifactKind::Merged);
        assert_eq!("complete".parse::<ArtifactKind>().unwrap(), ArtifactKind::Complete);
        let err = "exe".parse::<ArtifactKind>().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArtifactKind(ref k) if k == "exe"));
    }

    #[test]
    fn docx_zip_is_built_on_demand() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx", "b.docx"])).unwrap();

        let artifact = p.download(&up.task_id, ArtifactKind::Docx, None).unwrap();
        assert_eq!(artifact.path, p.layout().upload_zip(&up.task_id));
        assert_eq!(artifact.download_name, format!("{}.zip", up.task_id));
        assert_eq!(artifact.content_type, "application/zip");
        assert!(artifact.path.is_file());
    }

    #[test]
    fn pdfs_require_convert() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();
        let err = p.download(&up.task_id, ArtifactKind::Pdfs, None).unwrap_err();
        assert!(matches!(err, PipelineError::PdfFolderNotFound { .. }));

        p.convert(&up.task_id).unwrap();
        let artifact = p.download(&up.task_id, ArtifactKind::Pdfs, None).unwrap();
        assert!(artifact.path.is_file());
    }

    #[test]
    fn merged_and_complete_are_not_built_lazily() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();
        p.convert(&up.task_id).unwrap();

        for kind in [ArtifactKind::Merged, ArtifactKind::Complete] {
            let err = p.download(&up.task_id, kind, None).unwrap_err();
            assert!(matches!(err, PipelineError::ArtifactNotReady { .. }), "{kind}");
        }
    }

    #[test]
    fn complete_uses_recorded_package_name() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();
        p.convert(&up.task_id).unwrap();
        p.merge(&up.task_id).unwrap();
        p.package(&up.task_id, Some("batch.zip")).unwrap();

        let artifact = p.download(&up.task_id, ArtifactKind::Complete, None).unwrap();
        assert_eq!(artifact.download_name, "batch.zip");

        let err = p
            .download(&up.task_id, ArtifactKind::Complete, Some("other.zip"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotReady { .. }));
    }

    #[test]
    fn unknown_task_needs_no_record() {
        let (_root, p) = pipeline();
        let err = p
            .download(&TaskId::parse("ghost").unwrap(), ArtifactKind::Docx, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::TaskNotFound { .. }));
        assert!(p.registry().is_empty());
    }
}
