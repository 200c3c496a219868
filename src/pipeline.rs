//! One run: resolve, decrypt, load, normalize, write.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::format::{
    detect_container, has_legacy_extension, xls97, ContainerKind, LegacyConverter,
};
use crate::output::{write_outputs, OutputPaths};
use crate::table::{load_table, HeaderRow};
use crate::DecryptOptions;

/// Everything needed for one run.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub password: String,
    pub out_prefix: PathBuf,
    pub header_row: HeaderRow,
    pub options: DecryptOptions,
}

impl Job {
    pub fn new(
        input: impl Into<PathBuf>,
        password: impl Into<String>,
        out_prefix: impl Into<PathBuf>,
    ) -> Self {
        Job {
            input: input.into(),
            password: password.into(),
            out_prefix: out_prefix.into(),
            header_row: HeaderRow::default(),
            options: DecryptOptions::default(),
        }
    }

    pub fn with_header_row(mut self, header_row: HeaderRow) -> Self {
        self.header_row = header_row;
        self
    }

    pub fn with_options(mut self, options: DecryptOptions) -> Self {
        self.options = options;
        self
    }

    /// Where a converted legacy workbook is written.
    pub fn converted_path(&self) -> PathBuf {
        let mut path = OsString::from(self.out_prefix.as_os_str());
        path.push("_conv.xlsx");
        PathBuf::from(path)
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::Input {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether the input goes through the legacy converter. Sniffed content wins
/// over the file name, so an OOXML package named `.xls` is decrypted directly.
fn needs_conversion(path: &Path, kind: ContainerKind) -> bool {
    match kind {
        ContainerKind::Package | ContainerKind::EncryptedPackage => false,
        ContainerKind::LegacyWorkbook => true,
        ContainerKind::Unknown => has_legacy_extension(path),
    }
}

/// Read the input, converting legacy workbooks first. Returns the bytes
/// downstream steps work on.
fn resolve_input(job: &Job, converter: &dyn LegacyConverter) -> Result<Vec<u8>> {
    if !job.input.is_file() {
        return Err(Error::InputNotFound(job.input.clone()));
    }
    let data = read_input(&job.input)?;

    let kind = detect_container(&data);
    if !needs_conversion(&job.input, kind) {
        if has_legacy_extension(&job.input) {
            log::info!(
                "{} is named .xls but holds an OOXML package",
                job.input.display()
            );
        }
        return Ok(data);
    }

    // The converter never sees the password; FILEPASS protection comes off first.
    let scratch = if kind == ContainerKind::LegacyWorkbook {
        xls97::decrypt_compound_file(&data, &job.password)?
            .map(|plain| write_scratch(&job.input, &plain))
            .transpose()?
    } else {
        None
    };
    let source = scratch
        .as_ref()
        .map_or(job.input.as_path(), |(_dir, path)| path.as_path());

    let converted = job.converted_path();
    log::info!(
        "converting legacy workbook {} to {}",
        job.input.display(),
        converted.display()
    );
    converter.convert(source, &converted)?;
    read_input(&converted)
}

/// Write a decrypted legacy workbook into a scratch directory that is
/// removed when the returned guard drops.
fn write_scratch(input: &Path, plain: &[u8]) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir().map_err(|source| Error::Write {
        path: std::env::temp_dir(),
        source,
    })?;
    let name = Path::new(input.file_name().unwrap_or(OsStr::new("workbook")))
        .with_extension("xls");
    let path = dir.path().join(name);
    fs::write(&path, plain).map_err(|source| Error::Write {
        path: path.clone(),
        source,
    })?;
    log::debug!("decrypted legacy workbook written to {}", path.display());
    Ok((dir, path))
}

/// Run the whole pipeline for `job`.
pub fn run(job: &Job, converter: &dyn LegacyConverter) -> Result<OutputPaths> {
    let data = resolve_input(job, converter)?;
    log::debug!("read {} bytes from {}", data.len(), job.input.display());

    let plain = crate::decrypt_with_options(&data, &job.password, job.options)?;
    if plain != data {
        log::debug!("decrypted package is {} bytes", plain.len());
    }
    drop(data);

    let mut table = load_table(&plain, job.header_row)?;
    table.normalize_headers();
    log::debug!("columns: {:?}", table.columns());

    write_outputs(&plain, &job.out_prefix, &table)
}
