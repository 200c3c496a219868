pub mod ecma376_agile;
pub mod ecma376_standard;
pub mod rc4;
pub mod rc4_cryptoapi;

use ::rc4::consts::U16;
use ::rc4::Rc4;
use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::generic_array::GenericArray;
use cipher::{BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::OfficeCryptoError;

type Result<T> = std::result::Result<T, OfficeCryptoError>;

pub const AES_BLOCK_SIZE: usize = 16;

/// BIFF8 RC4 streams are rekeyed every 1024 bytes.
pub const RC4_BLOCK_SIZE: usize = 1024;

/// Hash algorithms allowed in Agile descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "SHA-384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            _ => Err(OfficeCryptoError::UnsupportedAlgorithm(name.to_string())),
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Hash the concatenation of `parts`.
    pub fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }

        match self {
            HashAlgorithm::Sha1 => run::<Sha1>(parts),
            HashAlgorithm::Sha256 => run::<Sha256>(parts),
            HashAlgorithm::Sha384 => run::<Sha384>(parts),
            HashAlgorithm::Sha512 => run::<Sha512>(parts),
        }
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        fn run<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
            let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| {
                OfficeCryptoError::InvalidEncryptionInfo("HMAC key has an invalid length")
            })?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }

        match self {
            HashAlgorithm::Sha1 => run::<Hmac<Sha1>>(key, data),
            HashAlgorithm::Sha256 => run::<Hmac<Sha256>>(key, data),
            HashAlgorithm::Sha384 => run::<Hmac<Sha384>>(key, data),
            HashAlgorithm::Sha512 => run::<Hmac<Sha512>>(key, data),
        }
    }
}

fn check_block_aligned(data: &[u8]) -> Result<()> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "ciphertext is not a multiple of the AES block size",
        ));
    }
    Ok(())
}

fn unsupported_key_len(len: usize) -> OfficeCryptoError {
    OfficeCryptoError::UnsupportedAlgorithm(format!("AES with a {}-bit key", len * 8))
}

/// AES-CBC decryption without padding; key length selects AES-128/192/256.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    fn run<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
    where
        C: BlockCipher + BlockDecryptMut + KeyInit,
    {
        let dec = cbc::Decryptor::<C>::new_from_slices(key, iv)
            .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("AES-CBC key or IV length"))?;
        dec.decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("AES-CBC ciphertext length"))?;
        Ok(())
    }

    check_block_aligned(data)?;
    let mut buf = data.to_vec();
    match key.len() {
        16 => run::<Aes128>(key, iv, &mut buf)?,
        24 => run::<Aes192>(key, iv, &mut buf)?,
        32 => run::<Aes256>(key, iv, &mut buf)?,
        n => return Err(unsupported_key_len(n)),
    }
    Ok(buf)
}

/// AES-ECB decryption without padding; key length selects AES-128/192/256.
pub fn aes_ecb_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    fn run<C>(key: &[u8], buf: &mut [u8]) -> Result<()>
    where
        C: BlockCipher + BlockDecryptMut + KeyInit,
    {
        let dec = ecb::Decryptor::<C>::new_from_slice(key)
            .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("AES-ECB key length"))?;
        dec.decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("AES-ECB ciphertext length"))?;
        Ok(())
    }

    check_block_aligned(data)?;
    let mut buf = data.to_vec();
    match key.len() {
        16 => run::<Aes128>(key, &mut buf)?,
        24 => run::<Aes192>(key, &mut buf)?,
        32 => run::<Aes256>(key, &mut buf)?,
        n => return Err(unsupported_key_len(n)),
    }
    Ok(buf)
}

/// XOR `data` with the RC4 keystream of a 128-bit key. RC4 is symmetric, so
/// this both encrypts and decrypts.
pub fn rc4_apply(key: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Rc4::<U16>::new(GenericArray::from_slice(key));
    cipher.apply_keystream(data);
}

/// Apply a rekeyed RC4 keystream to a whole stream starting at offset 0.
/// Block `n` covers bytes `n * RC4_BLOCK_SIZE..` and is keyed by `block_key(n)`.
pub fn rc4_apply_blocks(data: &mut [u8], block_key: impl Fn(u32) -> [u8; 16]) {
    for (block, chunk) in data.chunks_mut(RC4_BLOCK_SIZE).enumerate() {
        rc4_apply(&block_key(block as u32), chunk);
    }
}

/// Split an `EncryptedPackage` stream into its declared plaintext size and
/// the block-aligned ciphertext that follows.
///
/// Producers sometimes leave slack after the last block; bytes past the final
/// whole block are dropped.
pub fn split_encrypted_package(stream: &[u8]) -> Result<(usize, &[u8])> {
    let mut reader = crate::util::ByteReader::new(stream);
    let size = reader.read_u64("EncryptedPackage size header truncated")?;
    let size = usize::try_from(size)
        .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("EncryptedPackage size overflow"))?;
    let ciphertext = reader.remaining();
    let aligned = ciphertext.len() - ciphertext.len() % AES_BLOCK_SIZE;
    if size > aligned {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "EncryptedPackage is shorter than its declared size",
        ));
    }
    Ok((size, &ciphertext[..aligned]))
}
