use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Turns a legacy binary workbook into an OOXML package.
pub trait LegacyConverter {
    /// Convert `source` and write the resulting `.xlsx` to `target`.
    fn convert(&self, source: &Path, target: &Path) -> Result<()>;
}

/// Converter backed by a headless LibreOffice.
#[derive(Debug, Clone)]
pub struct Soffice {
    program: PathBuf,
}

impl Soffice {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Soffice {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for Soffice {
    fn default() -> Self {
        Soffice::new("soffice")
    }
}

fn conversion_error(source: &Path, message: impl Into<String>) -> Error {
    Error::Conversion {
        path: source.to_path_buf(),
        message: message.into(),
    }
}

impl LegacyConverter for Soffice {
    fn convert(&self, source: &Path, target: &Path) -> Result<()> {
        let scratch = tempfile::tempdir()
            .map_err(|e| conversion_error(source, format!("scratch directory: {}", e)))?;

        log::debug!(
            "running {} on {}",
            self.program.display(),
            source.display()
        );
        let output = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg("xlsx")
            .arg("--outdir")
            .arg(scratch.path())
            .arg(source)
            .output()
            .map_err(|e| {
                conversion_error(
                    source,
                    format!("failed to start {}: {}", self.program.display(), e),
                )
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !output.status.success() {
            let mut message = format!("{} exited with {}", self.program.display(), output.status);
            if !stderr.is_empty() {
                message.push_str(": ");
                message.push_str(stderr);
            }
            return Err(conversion_error(source, message));
        }
        if !stderr.is_empty() {
            log::warn!("converter stderr: {}", stderr);
        }

        let mut produced: OsString = source
            .file_stem()
            .ok_or_else(|| conversion_error(source, "source has no file name"))?
            .to_os_string();
        produced.push(".xlsx");
        let produced = scratch.path().join(produced);
        if !produced.is_file() {
            return Err(conversion_error(
                source,
                format!("converter produced no {}", produced.display()),
            ));
        }

        fs::copy(&produced, target).map_err(|e| {
            conversion_error(source, format!("copy to {}: {}", target.display(), e))
        })?;
        log::info!("converted {} to {}", source.display(), target.display());
        Ok(())
    }
}
