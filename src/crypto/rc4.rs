//! RC4 encryption keyed with MD5 (FILEPASS version 1.1).

use md5::{Digest, Md5};

use crate::crypto::rc4_apply;
use crate::error::OfficeCryptoError;
use crate::util::{password_to_utf16le, ByteReader};

type Result<T> = std::result::Result<T, OfficeCryptoError>;

/// Salt and password verifier stored after the version fields.
#[derive(Debug, Clone)]
pub struct Rc4Header {
    pub salt: [u8; 16],
    pub encrypted_verifier: [u8; 16],
    pub encrypted_verifier_hash: [u8; 16],
}

pub fn parse_header(data: &[u8]) -> Result<Rc4Header> {
    let mut r = ByteReader::new(data);
    let mut field = |context: &'static str| -> Result<[u8; 16]> {
        let mut out = [0u8; 16];
        out.copy_from_slice(r.take(16, context)?);
        Ok(out)
    };
    Ok(Rc4Header {
        salt: field("RC4 salt truncated")?,
        encrypted_verifier: field("RC4 encryptedVerifier truncated")?,
        encrypted_verifier_hash: field("RC4 encryptedVerifierHash truncated")?,
    })
}

/// Password-derived material shared by every block of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rc4Key([u8; 5]);

impl Rc4Key {
    pub fn derive(password: &str, salt: &[u8]) -> Self {
        let h0 = Md5::digest(password_to_utf16le(password));
        let mut intermediate = Vec::with_capacity(16 * (5 + salt.len()));
        for _ in 0..16 {
            intermediate.extend_from_slice(&h0[..5]);
            intermediate.extend_from_slice(salt);
        }
        let h1 = Md5::digest(&intermediate);

        let mut truncated = [0u8; 5];
        truncated.copy_from_slice(&h1[..5]);
        Rc4Key(truncated)
    }

    pub fn block_key(&self, block: u32) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.0);
        hasher.update(block.to_le_bytes());
        hasher.finalize().into()
    }
}

/// Check `password` against the verifier and return the stream key.
pub fn verify_password(header: &Rc4Header, password: &str) -> Result<Rc4Key> {
    let key = Rc4Key::derive(password, &header.salt);

    // Verifier and its hash are one keystream under the block 0 key.
    let mut sealed = [0u8; 32];
    sealed[..16].copy_from_slice(&header.encrypted_verifier);
    sealed[16..].copy_from_slice(&header.encrypted_verifier_hash);
    rc4_apply(&key.block_key(0), &mut sealed);

    if Md5::digest(&sealed[..16]).as_slice() != &sealed[16..] {
        return Err(OfficeCryptoError::InvalidPassword);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(password: &str, salt: [u8; 16]) -> Rc4Header {
        let key = Rc4Key::derive(password, &salt);
        let verifier = [0x5Cu8; 16];
        let mut sealed = verifier.to_vec();
        sealed.extend_from_slice(&Md5::digest(verifier));
        rc4_apply(&key.block_key(0), &mut sealed);

        let mut data = salt.to_vec();
        data.extend_from_slice(&sealed);
        parse_header(&data).unwrap()
    }

    #[test]
    fn derive_follows_md5_construction() {
        let salt = [0xA5u8; 16];
        let h0 = Md5::digest(password_to_utf16le("secret"));
        let block: Vec<u8> = [&h0[..5], &salt[..]].concat();
        let h1 = Md5::digest(block.repeat(16));
        let expected: [u8; 16] = Md5::digest([&h1[..5], &7u32.to_le_bytes()[..]].concat()).into();

        assert_eq!(Rc4Key::derive("secret", &salt).block_key(7), expected);
    }

    #[test]
    fn block_keys_differ() {
        let key = Rc4Key::derive("secret", &[0u8; 16]);
        assert_ne!(key.block_key(0), key.block_key(1));
    }

    #[test]
    fn verifies_correct_password_only() {
        let header = header_for("Password1", [3u8; 16]);
        assert_eq!(
            verify_password(&header, "Password1").unwrap(),
            Rc4Key::derive("Password1", &[3u8; 16])
        );
        assert!(matches!(
            verify_password(&header, "password1"),
            Err(OfficeCryptoError::InvalidPassword)
        ));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(matches!(
            parse_header(&[0u8; 40]),
            Err(OfficeCryptoError::InvalidEncryptionInfo(
                "RC4 encryptedVerifierHash truncated"
            ))
        ));
    }
}
