//! pdfium-backed PDF concatenation.
//!
//! ## Why bind per session?
//!
//! `PdfDocument` borrows the `Pdfium` bindings it was created from, so the
//! accumulated output document cannot outlive them. Binding inside
//! [`Merger::with_session`] keeps both on the same stack frame; the cost is
//! one library load per merge, negligible next to the page copying.
//!
//! pdfium is not async-safe. The merge stage runs on a blocking thread, never
//! on a Tokio worker.

use super::{MergeSession, Merger};
use crate::error::EngineError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENGINE: &str = "pdfium";

/// Concatenates PDFs with pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumMerger {
    lib_path: Option<PathBuf>,
}

impl PdfiumMerger {
    /// `lib_path` is either the pdfium shared library itself or the directory
    /// containing it; `None` binds the system library.
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    fn bind(&self) -> Result<Pdfium, EngineError> {
        let bindings = match &self.lib_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| EngineError::Unavailable {
            engine: ENGINE,
            detail: format!("{e:?}"),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl Merger for PdfiumMerger {
    fn with_session(
        &self,
        body: &mut dyn FnMut(&mut dyn MergeSession) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .create_new_pdf()
            .map_err(|e| EngineError::Unavailable {
                engine: ENGINE,
                detail: format!("create document: {e:?}"),
            })?;
        info!("Opened pdfium merge session");

        let mut session = PdfiumSession {
            pdfium: &pdfium,
            document,
            appended: 0,
        };
        body(&mut session)
    }
}

struct PdfiumSession<'a> {
    pdfium: &'a Pdfium,
    document: PdfDocument<'a>,
    appended: usize,
}

impl MergeSession for PdfiumSession<'_> {
    fn append_one(&mut self, pdf: &Path) -> Result<(), String> {
        let source = self
            .pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| format!("cannot open {}: {e:?}", pdf.display()))?;
        let pages = source.pages().len();
        self.document
            .pages_mut()
            .append(&source)
            .map_err(|e| format!("cannot copy pages of {}: {e:?}", pdf.display()))?;
        self.appended += 1;
        debug!("Appended {} ({} pages)", pdf.display(), pages);
        Ok(())
    }

    fn write_out(&mut self, dest: &Path) -> Result<(), EngineError> {
        self.document
            .save_to_file(dest)
            .map_err(|e| EngineError::Failed {
                engine: ENGINE,
                detail: format!("save {}: {e:?}", dest.display()),
            })?;
        info!(
            "Wrote merged PDF with {} inputs to {}",
            self.appended,
            dest.display()
        );
        Ok(())
    }
}
