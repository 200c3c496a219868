//! BIFF8 workbooks protected by a FILEPASS record.
//!
//! Record headers stay in the clear; payloads are XORed with an RC4
//! keystream indexed by absolute stream offset. A few records are never
//! encrypted, and neither is the `lbPlyPos` field of `BoundSheet8`.

use std::io::{Cursor, Read, Write};
use std::ops::Range;

use cfb::CompoundFile;

use crate::crypto::rc4::{self, Rc4Key};
use crate::crypto::rc4_apply_blocks;
use crate::crypto::rc4_cryptoapi::{self, CryptoApiKey};
use crate::error::OfficeCryptoError;
use crate::util::ByteReader;

type Result<T> = std::result::Result<T, OfficeCryptoError>;

const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_FILE_PASS: u16 = 0x002F;
const RECORD_BOUND_SHEET8: u16 = 0x0085;
const RECORD_INTERFACE_HDR: u16 = 0x00E1;
const RECORD_RRD_HEAD: u16 = 0x0138;
const RECORD_USR_EXCL: u16 = 0x0194;
const RECORD_FILE_LOCK: u16 = 0x0195;
const RECORD_RRD_INFO: u16 = 0x0196;
// Not a defined record number; readers skip it.
const RECORD_MASKED: u16 = 0xFFFF;

const ENCRYPTION_XOR: u16 = 0x0000;
const ENCRYPTION_RC4: u16 = 0x0001;

const WORKBOOK_STREAMS: [&str; 2] = ["/Workbook", "/Book"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Record {
    offset: usize,
    num: u16,
    size: usize,
}

impl Record {
    fn data(&self) -> Range<usize> {
        self.offset + 4..self.offset + 4 + self.size
    }
}

/// Records in stream order, up to the first truncated one.
fn records(stream: &[u8]) -> impl Iterator<Item = Record> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let header = stream.get(offset..offset + 4)?;
        let num = u16::from_le_bytes([header[0], header[1]]);
        let size = u16::from_le_bytes([header[2], header[3]]) as usize;
        if offset + 4 + size > stream.len() {
            return None;
        }
        let record = Record { offset, num, size };
        offset += 4 + size;
        Some(record)
    })
}

/// FILEPASS can only appear in the workbook globals, before their EOF.
fn find_file_pass(stream: &[u8]) -> Option<Record> {
    records(stream)
        .take_while(|record| record.num != RECORD_EOF)
        .find(|record| record.num == RECORD_FILE_PASS)
}

/// Whether a workbook stream carries FILEPASS protection.
pub fn is_file_pass_protected(stream: &[u8]) -> bool {
    find_file_pass(stream).is_some()
}

/// Verified key for the cipher a FILEPASS record announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePassKey {
    Rc4(Rc4Key),
    CryptoApi(CryptoApiKey),
}

impl FilePassKey {
    /// Parse a FILEPASS payload and check `password` against its verifier.
    pub fn unlock(payload: &[u8], password: &str) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        match r.read_u16("FILEPASS.wEncryptionType truncated")? {
            ENCRYPTION_RC4 => {}
            ENCRYPTION_XOR => {
                return Err(OfficeCryptoError::UnsupportedAlgorithm(
                    "XOR obfuscation".to_string(),
                ))
            }
            other => {
                return Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
                    "FILEPASS encryption type {:#06x}",
                    other
                )))
            }
        }

        let major = r.read_u16("FILEPASS version truncated")?;
        let minor = r.read_u16("FILEPASS version truncated")?;
        match (major, minor) {
            (1, 1) => {
                let header = rc4::parse_header(r.remaining())?;
                Ok(FilePassKey::Rc4(rc4::verify_password(&header, password)?))
            }
            (2..=4, 2) => {
                let header = rc4_cryptoapi::parse_header(r.remaining())?;
                Ok(FilePassKey::CryptoApi(rc4_cryptoapi::verify_password(
                    &header, password,
                )?))
            }
            _ => Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
                "RC4 version {}.{}",
                major, minor
            ))),
        }
    }

    pub fn block_key(&self, block: u32) -> [u8; 16] {
        match self {
            FilePassKey::Rc4(key) => key.block_key(block),
            FilePassKey::CryptoApi(key) => key.block_key(block),
        }
    }
}

/// Payload bytes that are stored encrypted.
fn encrypted_ranges(stream: &[u8]) -> Vec<Range<usize>> {
    records(stream)
        .filter_map(|record| {
            let data = record.data();
            match record.num {
                RECORD_BOF | RECORD_FILE_PASS | RECORD_USR_EXCL | RECORD_FILE_LOCK
                | RECORD_INTERFACE_HDR | RECORD_RRD_INFO | RECORD_RRD_HEAD => None,
                RECORD_BOUND_SHEET8 => Some(data.start + record.size.min(4)..data.end),
                _ => Some(data),
            }
        })
        .filter(|range| !range.is_empty())
        .collect()
}

/// XOR the encrypted payloads of `stream` with the keystream of `key`.
/// RC4 is symmetric, so this both seals and opens a stream.
pub fn apply_keystream(stream: &mut [u8], key: &FilePassKey) {
    let ranges = encrypted_ranges(stream);
    let mut keystream = vec![0u8; stream.len()];
    rc4_apply_blocks(&mut keystream, |block| key.block_key(block));
    for range in ranges {
        for (byte, k) in stream[range.clone()].iter_mut().zip(&keystream[range]) {
            *byte ^= k;
        }
    }
}

/// Decrypt a FILEPASS-protected workbook stream in place.
///
/// The FILEPASS record number is masked so readers see a plaintext
/// workbook. Its length is kept, so `BoundSheet8.lbPlyPos` offsets stay valid.
pub fn decrypt_workbook_stream(stream: &mut [u8], password: &str) -> Result<()> {
    let file_pass = find_file_pass(stream).ok_or(OfficeCryptoError::InvalidEncryptionInfo(
        "workbook stream has no FILEPASS record",
    ))?;
    if password.is_empty() {
        return Err(OfficeCryptoError::PasswordRequired);
    }

    let key = FilePassKey::unlock(&stream[file_pass.data()], password)?;
    apply_keystream(stream, &key);
    stream[file_pass.offset..file_pass.offset + 2].copy_from_slice(&RECORD_MASKED.to_le_bytes());
    Ok(())
}

/// Decrypt the workbook stream of a legacy compound file.
///
/// Returns the rewritten compound file, or `None` when the workbook is not
/// FILEPASS-protected. Every other stream is kept as is.
pub fn decrypt_compound_file(data: &[u8], password: &str) -> Result<Option<Vec<u8>>> {
    let mut cfb = CompoundFile::open(Cursor::new(data.to_vec()))?;
    let Some(name) = WORKBOOK_STREAMS.into_iter().find(|name| cfb.is_stream(name)) else {
        return Ok(None);
    };

    let mut stream = Vec::new();
    cfb.open_stream(name)?.read_to_end(&mut stream)?;
    if !is_file_pass_protected(&stream) {
        return Ok(None);
    }

    log::debug!("decrypting FILEPASS-protected {} stream", name);
    decrypt_workbook_stream(&mut stream, password)?;

    {
        let mut out = cfb.create_stream(name)?;
        out.write_all(&stream)?;
        out.flush()?;
    }
    cfb.flush()?;
    Ok(Some(cfb.into_inner().into_inner()))
}
