//! RC4 CryptoAPI encryption (FILEPASS versions 2.2, 3.2 and 4.2), keyed with SHA-1.

use crate::crypto::{rc4_apply, HashAlgorithm};
use crate::error::OfficeCryptoError;
use crate::util::{password_to_utf16le, ByteReader};

type Result<T> = std::result::Result<T, OfficeCryptoError>;

const CALG_RC4: u32 = 0x0000_6801;
const CALG_SHA1: u32 = 0x0000_8004;
const SHA1_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct CryptoApiHeader {
    pub flags: u32,
    pub alg_id: u32,
    pub alg_id_hash: u32,
    /// Key length in bits; 0 in the file means 40.
    pub key_size: u32,
    pub salt: Vec<u8>,
    pub encrypted_verifier: [u8; 16],
    pub encrypted_verifier_hash: Vec<u8>,
}

/// Parse the encryption header and verifier stored after the version fields.
pub fn parse_header(data: &[u8]) -> Result<CryptoApiHeader> {
    let mut r = ByteReader::new(data);
    let flags = r.read_u32("RC4 CryptoAPI flags truncated")?;
    let header_size = r.read_u32("RC4 CryptoAPI header size truncated")? as usize;
    let header = r.take(header_size, "RC4 CryptoAPI EncryptionHeader truncated")?;

    let mut h = ByteReader::new(header);
    let _flags = h.read_u32("EncryptionHeader.flags")?;
    let _size_extra = h.read_u32("EncryptionHeader.sizeExtra")?;
    let alg_id = h.read_u32("EncryptionHeader.algID")?;
    let alg_id_hash = h.read_u32("EncryptionHeader.algIDHash")?;
    let key_size = match h.read_u32("EncryptionHeader.keySize")? {
        0 => 40,
        bits => bits,
    };

    if !matches!(alg_id, 0 | CALG_RC4) || !matches!(alg_id_hash, 0 | CALG_SHA1) {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
            "RC4 CryptoAPI algID {:#x} / algIDHash {:#x}",
            alg_id, alg_id_hash
        )));
    }
    // Office writes 40-bit (export) and 128-bit keys only.
    if !matches!(key_size, 40 | 128) {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
            "RC4 CryptoAPI with a {}-bit key",
            key_size
        )));
    }

    let salt_size = r.read_u32("EncryptionVerifier.saltSize")? as usize;
    let salt = r.take(salt_size, "EncryptionVerifier.salt")?.to_vec();
    let mut encrypted_verifier = [0u8; 16];
    encrypted_verifier.copy_from_slice(r.take(16, "EncryptionVerifier.encryptedVerifier")?);
    let verifier_hash_size = r.read_u32("EncryptionVerifier.verifierHashSize")? as usize;
    if verifier_hash_size != SHA1_LEN {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "RC4 CryptoAPI verifier hash is not SHA-1 sized",
        ));
    }
    let encrypted_verifier_hash = r
        .take(verifier_hash_size, "EncryptionVerifier.encryptedVerifierHash")?
        .to_vec();

    Ok(CryptoApiHeader {
        flags,
        alg_id,
        alg_id_hash,
        key_size,
        salt,
        encrypted_verifier,
        encrypted_verifier_hash,
    })
}

/// SHA-1 of salt and password, plus the key length it is cut to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoApiKey {
    h0: [u8; SHA1_LEN],
    key_size: u32,
}

impl CryptoApiKey {
    pub fn derive(password: &str, salt: &[u8], key_size: u32) -> Self {
        let digest = HashAlgorithm::Sha1.digest(&[salt, &password_to_utf16le(password)]);
        let mut h0 = [0u8; SHA1_LEN];
        h0.copy_from_slice(&digest);
        CryptoApiKey { h0, key_size }
    }

    /// 40-bit keys keep five digest bytes and are zero-padded to 16.
    pub fn block_key(&self, block: u32) -> [u8; 16] {
        let digest = HashAlgorithm::Sha1.digest(&[&self.h0, &block.to_le_bytes()]);
        let len = if self.key_size == 40 { 5 } else { 16 };
        let mut key = [0u8; 16];
        key[..len].copy_from_slice(&digest[..len]);
        key
    }
}

/// Check `password` against the verifier and return the stream key.
pub fn verify_password(header: &CryptoApiHeader, password: &str) -> Result<CryptoApiKey> {
    let key = CryptoApiKey::derive(password, &header.salt, header.key_size);

    let mut sealed = header.encrypted_verifier.to_vec();
    sealed.extend_from_slice(&header.encrypted_verifier_hash);
    rc4_apply(&key.block_key(0), &mut sealed);

    if HashAlgorithm::Sha1.digest(&[&sealed[..16]]) != &sealed[16..] {
        return Err(OfficeCryptoError::InvalidPassword);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(password: &str, salt: [u8; 16], key_size: u32) -> Vec<u8> {
        let key = CryptoApiKey::derive(password, &salt, if key_size == 0 { 40 } else { key_size });
        let verifier = [0x42u8; 16];
        let mut sealed = verifier.to_vec();
        sealed.extend_from_slice(&HashAlgorithm::Sha1.digest(&[&verifier]));
        rc4_apply(&key.block_key(0), &mut sealed);

        let mut header = Vec::new();
        for v in [0x04u32, 0, CALG_RC4, CALG_SHA1, key_size, 0x01, 0, 0] {
            header.extend_from_slice(&v.to_le_bytes());
        }
        let mut data = 0x04u32.to_le_bytes().to_vec();
        data.extend_from_slice(&(header.len() as u32).to_le_bytes());
        data.extend_from_slice(&header);
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&salt);
        data.extend_from_slice(&sealed[..16]);
        data.extend_from_slice(&20u32.to_le_bytes());
        data.extend_from_slice(&sealed[16..]);
        data
    }

    #[test]
    fn derive_follows_sha1_construction() {
        let salt = [9u8; 16];
        let h0 = HashAlgorithm::Sha1.digest(&[&salt, &password_to_utf16le("pw")]);
        let expected = HashAlgorithm::Sha1.digest(&[&h0, &3u32.to_le_bytes()]);

        let strong = CryptoApiKey::derive("pw", &salt, 128).block_key(3);
        assert_eq!(strong[..], expected[..16]);

        let weak = CryptoApiKey::derive("pw", &salt, 40).block_key(3);
        assert_eq!(weak[..5], expected[..5]);
        assert_eq!(weak[5..], [0u8; 11]);
    }

    #[test]
    fn parses_and_verifies() {
        let header = parse_header(&header_bytes("s3cret", [1u8; 16], 128)).unwrap();
        assert_eq!(header.key_size, 128);
        assert_eq!(header.alg_id, CALG_RC4);
        assert!(verify_password(&header, "s3cret").is_ok());
        assert!(matches!(
            verify_password(&header, "s3cre"),
            Err(OfficeCryptoError::InvalidPassword)
        ));
    }

    #[test]
    fn zero_key_size_means_40_bits() {
        let header = parse_header(&header_bytes("pw", [2u8; 16], 0)).unwrap();
        assert_eq!(header.key_size, 40);
        assert!(verify_password(&header, "pw").is_ok());
    }

    #[test]
    fn rejects_unusual_key_sizes() {
        assert!(matches!(
            parse_header(&header_bytes("pw", [2u8; 16], 56)),
            Err(OfficeCryptoError::UnsupportedAlgorithm(_))
        ));
    }
}
