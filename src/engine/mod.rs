//! External engines behind the convert and merge stages.
//!
//! The pipeline never talks to LibreOffice or pdfium directly; it drives
//! these two seams:
//!
//! ```text
//! Converter ──open_session──▶ ConversionSession ──convert_one(src, dest)──▶ PDF
//! Merger ──with_session──▶ MergeSession ──append_one(pdf)*──▶ write_out(dest)
//! ```
//!
//! * [`Converter`]: a session is opened once per batch and reused for every
//!   item. It is released when dropped, so every exit path of the batch
//!   (including early returns and panics) tears it down.
//! * [`Merger`]: the session only lives inside the `with_session` call,
//!   which lets implementations borrow engine state (pdfium documents borrow
//!   their library bindings).
//!
//! Item-level failures are plain `String` reasons; only failures to start or
//! finish an engine are [`EngineError`]s.

pub mod pdfium;
pub mod soffice;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::EngineError;
use std::path::Path;

pub use pdfium::PdfiumMerger;
pub use soffice::SofficeConverter;

/// Document-to-PDF conversion engine.
pub trait Converter: Send + Sync {
    /// Start one conversion session for a batch.
    fn open_session(&self) -> Result<Box<dyn ConversionSession>, EngineError>;
}

/// A live handle to a conversion engine. Dropping it releases the engine.
pub trait ConversionSession {
    /// Convert `source` into a PDF written at `dest`.
    fn convert_one(&mut self, source: &Path, dest: &Path) -> Result<(), String>;

    /// Explicit teardown; the default just drops the session.
    fn close(self: Box<Self>) {}
}

/// PDF concatenation engine.
pub trait Merger: Send + Sync {
    /// Open a merge session, run `body` with it, and release it.
    ///
    /// Errors from opening the session and errors returned by `body` are both
    /// returned.
    fn with_session(
        &self,
        body: &mut dyn FnMut(&mut dyn MergeSession) -> Result<(), EngineError>,
    ) -> Result<(), EngineError>;
}

/// Accumulates PDFs in append order.
pub trait MergeSession {
    /// Append every page of `pdf` to the accumulated document.
    fn append_one(&mut self, pdf: &Path) -> Result<(), String>;

    /// Save the accumulated document to `dest`.
    fn write_out(&mut self, dest: &Path) -> Result<(), EngineError>;
}
