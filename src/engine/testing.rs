//! In-memory engines for unit tests.

use super::{ConversionSession, Converter, MergeSession, Merger};
use crate::error::EngineError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Writes `%PDF-fake <source name>` for every item, failing the ones listed.
#[derive(Default)]
pub(crate) struct FakeConverter {
    pub failing: HashSet<String>,
    pub unavailable: bool,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeConverter {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Converter for FakeConverter {
    fn open_session(&self) -> Result<Box<dyn ConversionSession>, EngineError> {
        if self.unavailable {
            return Err(EngineError::Unavailable {
                engine: "fake",
                detail: "engine offline".into(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            failing: self.failing.clone(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct FakeSession {
    failing: HashSet<String>,
    closed: Arc<AtomicUsize>,
}

impl ConversionSession for FakeSession {
    fn convert_one(&mut self, source: &Path, dest: &Path) -> Result<(), String> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(format!("cannot open {name}"));
        }
        std::fs::write(dest, format!("%PDF-fake {name}\n")).map_err(|e| e.to_string())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Concatenates file contents; appending a file whose content starts with
/// `BAD` fails.
#[derive(Default)]
pub(crate) struct FakeMerger;

impl Merger for FakeMerger {
    fn with_session(
        &self,
        body: &mut dyn FnMut(&mut dyn MergeSession) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let mut session = FakeMergeSession::default();
        body(&mut session)
    }
}

#[derive(Default)]
struct FakeMergeSession {
    buffer: Vec<u8>,
}

impl MergeSession for FakeMergeSession {
    fn append_one(&mut self, pdf: &Path) -> Result<(), String> {
        let bytes = std::fs::read(pdf).map_err(|e| e.to_string())?;
        if bytes.starts_with(b"BAD") {
            return Err("not a PDF".into());
        }
        self.buffer.extend_from_slice(&bytes);
        Ok(())
    }

    fn write_out(&mut self, dest: &Path) -> Result<(), EngineError> {
        std::fs::write(dest, &self.buffer).map_err(|e| EngineError::Failed {
            engine: "fake",
            detail: e.to_string(),
        })
    }
}
