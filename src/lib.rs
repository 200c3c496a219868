//! Decrypt password-protected spreadsheets and export their first sheet.
//!
//! The crate is a small pipeline: resolve the input (unlocking and converting
//! legacy `.xls` workbooks), remove MS-OFFCRYPTO protection, load the first
//! worksheet into a [`Table`], normalize its headers and write
//! `.xlsx`/`.csv`/`.json` artifacts.
//! See [`pipeline::run`] for the whole flow and [`decrypt`] for the decryptor
//! on its own.

pub mod cli;
pub mod crypto;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod table;
pub mod util;

pub use error::{Error, OfficeCryptoError, Result};
pub use output::{OutputPaths, ResultRecord};
pub use pipeline::{run, Job};
pub use table::{normalize_labels, Cell, HeaderRow, Table};

use cfb::CompoundFile;
use std::io::{Cursor, Read, Seek};

use util::EncryptionScheme;

/// Knobs for [`decrypt_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecryptOptions {
    /// Check the Agile `dataIntegrity` HMAC before accepting the plaintext.
    pub verify_integrity: bool,
}

fn read_stream<F: Read + Seek>(
    cfb: &mut CompoundFile<F>,
    name: &str,
) -> std::io::Result<Option<Vec<u8>>> {
    if !cfb.is_stream(name) {
        return Ok(None);
    }
    let mut stream = cfb.open_stream(name)?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data)?;
    Ok(Some(data))
}

/// Decrypt an Office file with password
///
/// Unprotected input (anything that is not an OLE compound file carrying an
/// `EncryptionInfo` stream) is returned unchanged and the password is ignored.
///
/// # Examples
///
/// ```no_run
/// use xlsx_decrypt::decrypt;
/// use std::fs;
///
/// let input = fs::read("encrypted.xlsx").unwrap();
/// let output = decrypt(&input, "password123").unwrap();
/// fs::write("decrypted.xlsx", output).unwrap();
/// ```
pub fn decrypt(input: &[u8], password: &str) -> Result<Vec<u8>, OfficeCryptoError> {
    decrypt_with_options(input, password, DecryptOptions::default())
}

/// [`decrypt`] with explicit [`DecryptOptions`].
pub fn decrypt_with_options(
    input: &[u8],
    password: &str,
    options: DecryptOptions,
) -> Result<Vec<u8>, OfficeCryptoError> {
    if !util::is_compound_file(input) {
        return Ok(input.to_vec());
    }

    let mut cfb = CompoundFile::open(Cursor::new(input))?;
    let Some(encryption_info) = read_stream(&mut cfb, "/EncryptionInfo")? else {
        log::debug!("compound file has no EncryptionInfo stream; passing through");
        return Ok(input.to_vec());
    };
    let encrypted_package = read_stream(&mut cfb, "/EncryptedPackage")?.ok_or(
        OfficeCryptoError::InvalidEncryptionInfo("missing EncryptedPackage stream"),
    )?;

    if password.is_empty() {
        return Err(OfficeCryptoError::PasswordRequired);
    }

    let output = match util::detect_scheme(&encryption_info)? {
        EncryptionScheme::Standard => {
            log::debug!("decrypting ECMA-376 Standard package");
            crypto::ecma376_standard::decrypt(&encryption_info, &encrypted_package, password)?
        }
        EncryptionScheme::Agile => {
            log::debug!("decrypting ECMA-376 Agile package");
            crypto::ecma376_agile::decrypt(
                &encryption_info,
                &encrypted_package,
                password,
                options.verify_integrity,
            )?
        }
        EncryptionScheme::Extensible => {
            return Err(OfficeCryptoError::UnsupportedAlgorithm(
                "Extensible".to_string(),
            ));
        }
    };

    if !util::is_valid_zip(&output) {
        return Err(OfficeCryptoError::CorruptPackage);
    }
    Ok(output)
}

/// Check if an Office file is encrypted
///
/// # Examples
///
/// ```no_run
/// use xlsx_decrypt::is_encrypted;
/// use std::fs;
///
/// let input = fs::read("document.xlsx").unwrap();
/// if is_encrypted(&input) {
///     println!("File is encrypted");
/// }
/// ```
pub fn is_encrypted(input: &[u8]) -> bool {
    if !util::is_compound_file(input) {
        return false;
    }
    match CompoundFile::open(Cursor::new(input)) {
        Ok(cfb) => cfb.is_stream("/EncryptionInfo"),
        Err(_) => false,
    }
}
