//! Zip archive writing.
//!
//! [`ArchiveBuilder`] writes into an anonymous temp file next to the
//! destination and only persists it under the final name in
//! [`ArchiveBuilder::finish`]. An archive that fails halfway, or a builder
//! dropped without `finish`, never shows up under its final name, and two
//! builders racing for the same destination never share a temp file.

use crate::error::PipelineError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Incrementally builds one deflate-compressed zip archive.
pub struct ArchiveBuilder {
    dest: PathBuf,
    tmp: NamedTempFile,
    writer: ZipWriter<BufWriter<File>>,
    entries: usize,
}

impl ArchiveBuilder {
    /// Start an archive that will end up at `dest`.
    pub fn create(dest: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dest = dest.into();
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&parent)
            .map_err(|e| PipelineError::io("Failed to create archive directory", &parent, e))?;

        let tmp = NamedTempFile::new_in(&parent)
            .map_err(|e| PipelineError::io("Failed to create archive", &parent, e))?;
        let file = tmp
            .reopen()
            .map_err(|e| PipelineError::io("Failed to open archive", tmp.path(), e))?;

        Ok(Self {
            dest,
            tmp,
            writer: ZipWriter::new(BufWriter::new(file)),
            entries: 0,
        })
    }

    /// Copy `source` into the archive under `archive_path` (`/`-separated).
    pub fn add_file(&mut self, source: &Path, archive_path: &str) -> Result<(), PipelineError> {
        let mut input = File::open(source)
            .map_err(|e| PipelineError::io("Failed to read archive input", source, e))?;

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer
            .start_file(archive_path, options)
            .map_err(|e| PipelineError::Archive {
                path: self.dest.clone(),
                detail: format!("{archive_path}: {e}"),
            })?;
        std::io::copy(&mut input, &mut self.writer)
            .map_err(|e| PipelineError::io("Failed to write archive entry", source, e))?;

        self.entries += 1;
        debug!("Archived {} as {}", source.display(), archive_path);
        Ok(())
    }

    /// Number of entries added so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Write the central directory and move the archive into place.
    pub fn finish(self) -> Result<PathBuf, PipelineError> {
        let mut buffered = self.writer.finish().map_err(|e| PipelineError::Archive {
            path: self.dest.clone(),
            detail: e.to_string(),
        })?;
        buffered
            .flush()
            .map_err(|e| PipelineError::io("Failed to flush archive", self.tmp.path(), e))?;
        drop(buffered);

        self.tmp
            .persist(&self.dest)
            .map_err(|e| PipelineError::io("Failed to move archive into place", &self.dest, e.error))?;
        Ok(self.dest)
    }
}

/// Zip every regular file directly inside `dir` into `dest`, entries named by
/// their file names, in sorted order. Returns the number of entries.
pub fn zip_directory(dir: &Path, dest: &Path) -> Result<usize, PipelineError> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::io("Failed to list directory", dir, e))?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut builder = ArchiveBuilder::create(dest)?;
    for name in &names {
        builder.add_file(&dir.join(name), name)?;
    }
    let count = builder.entries();
    builder.finish()?;
    Ok(count)
}
