//! LibreOffice (`soffice --headless`) conversion engine.
//!
//! A session owns a private LibreOffice user profile in a temp directory.
//! The first `soffice` start initialises the profile (slow); every later
//! conversion in the same batch reuses it, and two concurrent batches never
//! share a profile, which LibreOffice does not tolerate. The profile and the
//! staging directory are `TempDir`s, deleted when the session is dropped.

use super::{ConversionSession, Converter};
use crate::error::EngineError;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use tracing::{debug, info};

const ENGINE: &str = "soffice";

/// Converts documents to PDF with a LibreOffice executable.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: PathBuf,
}

impl SofficeConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Converter for SofficeConverter {
    fn open_session(&self) -> Result<Box<dyn ConversionSession>, EngineError> {
        let unavailable = |detail: String| EngineError::Unavailable {
            engine: ENGINE,
            detail,
        };

        let profile = TempDir::with_prefix("pdfbatch-soffice-profile-")
            .map_err(|e| unavailable(format!("profile directory: {e}")))?;
        let staging = TempDir::with_prefix("pdfbatch-soffice-out-")
            .map_err(|e| unavailable(format!("staging directory: {e}")))?;

        let session = SofficeSession {
            program: self.program.clone(),
            profile_arg: profile_argument(profile.path()),
            profile,
            staging,
        };

        // Warm-up run: proves the executable starts and initialises the profile.
        let output = session
            .command()
            .arg("--version")
            .output()
            .map_err(|e| unavailable(format!("{}: {e}", self.program.display())))?;
        if !output.status.success() {
            return Err(unavailable(describe_failure(&output)));
        }
        info!(
            "Opened soffice session ({})",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(Box::new(session))
    }
}

struct SofficeSession {
    program: PathBuf,
    profile_arg: String,
    profile: TempDir,
    staging: TempDir,
}

impl SofficeSession {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.profile_arg)
            .args(["--headless", "--norestore", "--nologo", "--nolockcheck"])
            .stdin(Stdio::null());
        cmd
    }
}

impl ConversionSession for SofficeSession {
    fn convert_one(&mut self, source: &Path, dest: &Path) -> Result<(), String> {
        let output = self
            .command()
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(self.staging.path())
            .arg(source)
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.program.display()))?;

        if !output.status.success() {
            return Err(describe_failure(&output));
        }

        // soffice names its output after the input stem.
        let stem = source
            .file_stem()
            .ok_or_else(|| format!("source has no file name: {}", source.display()))?;
        let produced = self
            .staging
            .path()
            .join(format!("{}.pdf", stem.to_string_lossy()));
        if !produced.is_file() {
            return Err(format!(
                "soffice exited successfully but produced no PDF ({})",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        move_file(&produced, dest).map_err(|e| format!("failed to move PDF into place: {e}"))?;
        debug!("soffice converted {} → {}", source.display(), dest.display());
        Ok(())
    }

    fn close(self: Box<Self>) {
        debug!("Closing soffice session profile {}", self.profile.path().display());
    }
}

/// `-env:UserInstallation=file:///…` for a profile directory.
fn profile_argument(dir: &Path) -> String {
    let path = dir.to_string_lossy().replace('\\', "/");
    let path = path.trim_start_matches('/');
    format!("-env:UserInstallation=file:///{path}")
}

fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    match output.status.code() {
        Some(code) if stderr.is_empty() => format!("soffice exited with status {code}"),
        Some(code) => format!("soffice exited with status {code}: {stderr}"),
        None => "soffice was terminated by a signal".to_string(),
    }
}

/// Rename, falling back to copy + delete across file systems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_argument_is_a_file_url() {
        assert_eq!(
            profile_argument(Path::new("/tmp/profile-1")),
            "-env:UserInstallation=file:///tmp/profile-1"
        );
        assert_eq!(
            profile_argument(Path::new("C:\\Temp\\p")),
            "-env:UserInstallation=file:///C:/Temp/p"
        );
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let converter = SofficeConverter::new("/definitely/not/soffice");
        let err = converter.open_session().err().expect("must fail");
        assert!(matches!(err, EngineError::Unavailable { .. }), "got: {err}");
    }

    #[test]
    fn move_file_moves() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.pdf");
        let b = tmp.path().join("b.pdf");
        std::fs::write(&a, b"%PDF").unwrap();
        move_file(&a, &b).unwrap();
        assert!(!a.exists());
        assert_eq!(std::fs::read(&b).unwrap(), b"%PDF");
    }
}
