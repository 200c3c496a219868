use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while detecting or removing MS-OFFCRYPTO protection.
#[derive(Error, Debug)]
pub enum OfficeCryptoError {
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Password is required")]
    PasswordRequired,

    #[error("Unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid encryption info: {0}")]
    InvalidEncryptionInfo(&'static str),

    #[error("XML parsing error: {0}")]
    XmlError(String),

    #[error("Data integrity check failed")]
    IntegrityCheckFailed,

    #[error("Decrypted data is not a valid OOXML package")]
    CorruptPackage,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Base64 decoding error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

impl From<quick_xml::Error> for OfficeCryptoError {
    fn from(err: quick_xml::Error) -> Self {
        OfficeCryptoError::XmlError(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for OfficeCryptoError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OfficeCryptoError::XmlError(err.to_string())
    }
}

/// Pipeline errors. The `Display` text of each variant is what ends up in
/// the `error` field of a failed result record.
#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("conversion failed for {}: {message}", path.display())]
    Conversion { path: PathBuf, message: String },

    #[error(transparent)]
    Decrypt(#[from] OfficeCryptoError),

    #[error("failed to parse worksheet: {0}")]
    Parse(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
