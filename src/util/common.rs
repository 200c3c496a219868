use crate::error::OfficeCryptoError;

type Result<T> = std::result::Result<T, OfficeCryptoError>;

/// OLE/CFB compound file signature.
pub const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Sequential little-endian reader over a borrowed buffer.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(OfficeCryptoError::InvalidEncryptionInfo(context))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn read_u16(&mut self, context: &'static str) -> Result<u16> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self, context: &'static str) -> Result<u64> {
        let b = self.take(8, context)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }
}

/// `EncryptionInfo` stream version (MS-OFFCRYPTO 2.1.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoVersion {
    pub major: u16,
    pub minor: u16,
}

/// Encryption scheme announced by an `EncryptionInfo` stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionScheme {
    Standard,
    Agile,
    Extensible,
}

/// Parse encryption info version
pub fn parse_crypto_version(data: &[u8]) -> Result<CryptoVersion> {
    let mut reader = ByteReader::new(data);
    let major = reader.read_u16("EncryptionInfo version truncated")?;
    let minor = reader.read_u16("EncryptionInfo version truncated")?;
    Ok(CryptoVersion { major, minor })
}

/// Identify which scheme an `EncryptionInfo` stream uses.
pub fn detect_scheme(encryption_info: &[u8]) -> Result<EncryptionScheme> {
    let CryptoVersion { major, minor } = parse_crypto_version(encryption_info)?;
    match (major, minor) {
        (2..=4, 0x02) => Ok(EncryptionScheme::Standard),
        (4, 0x04) => Ok(EncryptionScheme::Agile),
        (3 | 4, 0x03) => Ok(EncryptionScheme::Extensible),
        _ => Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
            "EncryptionInfo version {}.{}",
            major, minor
        ))),
    }
}

/// Encode a password the way Office hashes it.
pub fn password_to_utf16le(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// MS-OFFCRYPTO `TruncateHash`: cut `bytes` to `len`, or pad with `0x36`.
pub fn normalize_key_material(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0x36u8; len];
    let n = bytes.len().min(len);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Whether `data` starts like a ZIP archive (every OOXML package does).
pub fn is_valid_zip(data: &[u8]) -> bool {
    data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06")
}

/// Whether `data` starts with the OLE/CFB signature.
pub fn is_compound_file(data: &[u8]) -> bool {
    data.starts_with(&CFB_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_reader_reads_little_endian() {
        let data = [0x04, 0x00, 0x02, 0x00, 0x24, 0x00, 0x00, 0x00, 0xFF];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16("a").unwrap(), 4);
        assert_eq!(r.read_u16("b").unwrap(), 2);
        assert_eq!(r.read_u32("c").unwrap(), 0x24);
        assert_eq!(r.position(), 8);
        assert_eq!(r.remaining(), &[0xFF]);
    }

    #[test]
    fn byte_reader_reports_truncation_context() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        let err = r.read_u32("header truncated").unwrap_err();
        assert!(matches!(
            err,
            OfficeCryptoError::InvalidEncryptionInfo("header truncated")
        ));
    }

    #[test]
    fn detects_schemes_by_version() {
        assert_eq!(detect_scheme(&[4, 0, 4, 0]).unwrap(), EncryptionScheme::Agile);
        assert_eq!(detect_scheme(&[3, 0, 2, 0]).unwrap(), EncryptionScheme::Standard);
        assert_eq!(detect_scheme(&[4, 0, 2, 0]).unwrap(), EncryptionScheme::Standard);
        assert_eq!(detect_scheme(&[4, 0, 3, 0]).unwrap(), EncryptionScheme::Extensible);
        assert!(matches!(
            detect_scheme(&[1, 0, 1, 0]),
            Err(OfficeCryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn normalize_key_material_pads_with_0x36() {
        assert_eq!(normalize_key_material(&[1, 2], 4), vec![1, 2, 0x36, 0x36]);
        assert_eq!(normalize_key_material(&[1, 2, 3, 4, 5], 3), vec![1, 2, 3]);
    }

    #[test]
    fn password_is_utf16le() {
        assert_eq!(password_to_utf16le("Ab"), vec![0x41, 0x00, 0x62, 0x00]);
        assert_eq!(password_to_utf16le("한"), vec![0x5C, 0xD5]);
    }

    #[test]
    fn recognises_container_signatures() {
        assert!(is_valid_zip(b"PK\x03\x04rest"));
        assert!(!is_valid_zip(b"PK"));
        assert!(is_compound_file(&CFB_SIGNATURE));
        assert!(!is_compound_file(b"PK\x03\x04"));
    }
}
