use sha1::{Digest, Sha1};

use crate::crypto::{aes_ecb_decrypt, split_encrypted_package};
use crate::error::OfficeCryptoError;
use crate::util::{password_to_utf16le, ByteReader};

type Result<T> = std::result::Result<T, OfficeCryptoError>;

const ITER_COUNT: u32 = 50_000;
const SHA1_LEN: usize = 20;

const FLAG_CRYPTO_API: u32 = 0x04;
const FLAG_EXTERNAL: u32 = 0x10;
const FLAG_AES: u32 = 0x20;

const CALG_AES_128: u32 = 0x0000_660E;
const CALG_AES_192: u32 = 0x0000_660F;
const CALG_AES_256: u32 = 0x0000_6610;

#[derive(Debug, Clone)]
pub struct StandardEncryptionInfo {
    pub flags: u32,
    pub alg_id: u32,
    pub alg_id_hash: u32,
    pub key_size: u32,
    pub provider_type: u32,
    pub csp_name: String,
    pub salt: Vec<u8>,
    pub encrypted_verifier: Vec<u8>,
    pub verifier_hash_size: u32,
    pub encrypted_verifier_hash: Vec<u8>,
}

/// Parse a Standard `EncryptionInfo` stream (version header included).
pub fn parse_encryption_info(data: &[u8]) -> Result<StandardEncryptionInfo> {
    let mut r = ByteReader::new(data);
    r.take(4, "EncryptionInfo version truncated")?;
    let flags = r.read_u32("EncryptionInfo flags truncated")?;
    if flags & FLAG_EXTERNAL != 0 {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(
            "external encryption provider".to_string(),
        ));
    }
    if flags & (FLAG_CRYPTO_API | FLAG_AES) != FLAG_CRYPTO_API | FLAG_AES {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
            "Standard encryption flags {:#x}",
            flags
        )));
    }

    let header_size = r.read_u32("EncryptionHeader size truncated")? as usize;
    let header = r.take(header_size, "EncryptionHeader truncated")?;
    let mut h = ByteReader::new(header);
    let header_flags = h.read_u32("EncryptionHeader.flags")?;
    let _size_extra = h.read_u32("EncryptionHeader.sizeExtra")?;
    let alg_id = h.read_u32("EncryptionHeader.algID")?;
    let alg_id_hash = h.read_u32("EncryptionHeader.algIDHash")?;
    let mut key_size = h.read_u32("EncryptionHeader.keySize")?;
    let provider_type = h.read_u32("EncryptionHeader.providerType")?;
    let _reserved1 = h.read_u32("EncryptionHeader.reserved1")?;
    let _reserved2 = h.read_u32("EncryptionHeader.reserved2")?;
    let csp_name = decode_csp_name(h.remaining());

    if key_size == 0 {
        key_size = match alg_id {
            CALG_AES_192 => 192,
            CALG_AES_256 => 256,
            _ => 128,
        };
    }
    if !matches!(alg_id, 0 | CALG_AES_128 | CALG_AES_192 | CALG_AES_256) {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(format!(
            "Standard algID {:#x}",
            alg_id
        )));
    }

    let salt_size = r.read_u32("EncryptionVerifier.saltSize")? as usize;
    let salt = r.take(salt_size, "EncryptionVerifier.salt")?.to_vec();
    let encrypted_verifier = r.take(16, "EncryptionVerifier.encryptedVerifier")?.to_vec();
    let verifier_hash_size = r.read_u32("EncryptionVerifier.verifierHashSize")?;
    // AES pads the 20-byte SHA-1 verifier hash to 32 bytes.
    let encrypted_verifier_hash = r
        .take(32, "EncryptionVerifier.encryptedVerifierHash")?
        .to_vec();

    Ok(StandardEncryptionInfo {
        flags: header_flags,
        alg_id,
        alg_id_hash,
        key_size,
        provider_type,
        csp_name,
        salt,
        encrypted_verifier,
        verifier_hash_size,
        encrypted_verifier_hash,
    })
}

fn decode_csp_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn sha1(parts: &[&[u8]]) -> [u8; SHA1_LEN] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Convert password to encryption key using ECMA-376 Standard algorithm
pub fn convert_password_to_key(password: &str, salt: &[u8], key_size: u32) -> Result<Vec<u8>> {
    if key_size == 0 || key_size % 8 != 0 || key_size / 8 > 2 * SHA1_LEN as u32 {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "EncryptionHeader.keySize is out of range",
        ));
    }
    let password = password_to_utf16le(password);

    let mut h = sha1(&[salt, &password]);
    for i in 0..ITER_COUNT {
        h = sha1(&[&i.to_le_bytes(), &h]);
    }
    let h_final = sha1(&[&h, &0u32.to_le_bytes()]);

    let mut buf1 = [0x36u8; 64];
    let mut buf2 = [0x5cu8; 64];
    for i in 0..SHA1_LEN {
        buf1[i] ^= h_final[i];
        buf2[i] ^= h_final[i];
    }

    let mut derived = Vec::with_capacity(2 * SHA1_LEN);
    derived.extend_from_slice(&sha1(&[&buf1]));
    derived.extend_from_slice(&sha1(&[&buf2]));
    derived.truncate((key_size / 8) as usize);
    Ok(derived)
}

/// Verify password with encrypted verifier
pub fn verify_key(key: &[u8], info: &StandardEncryptionInfo) -> Result<()> {
    let verifier = aes_ecb_decrypt(key, &info.encrypted_verifier)?;
    let verifier_hash = aes_ecb_decrypt(key, &info.encrypted_verifier_hash)?;
    if sha1(&[&verifier])[..] != verifier_hash[..SHA1_LEN] {
        return Err(OfficeCryptoError::InvalidPassword);
    }
    Ok(())
}

/// Decrypt encrypted package using ECMA-376 Standard
pub fn decrypt(encryption_info: &[u8], encrypted_package: &[u8], password: &str) -> Result<Vec<u8>> {
    let info = parse_encryption_info(encryption_info)?;
    let key = convert_password_to_key(password, &info.salt, info.key_size)?;
    verify_key(&key, &info)?;

    let (size, ciphertext) = split_encrypted_package(encrypted_package)?;
    let mut output = aes_ecb_decrypt(&key, ciphertext)?;
    output.truncate(size);
    Ok(output)
}
