//! ECMA-376 Agile encryption (`EncryptionInfo` version 4.4).
//!
//! The descriptor is an XML document following an 8-byte header. Password
//! verification decrypts `encryptedVerifierHashInput` and
//! `encryptedVerifierHashValue` with keys derived from the password and checks
//! `Hash(verifierHashInput) == verifierHashValue`. The package key is then
//! recovered from `encryptedKeyValue` and used to decrypt the package in
//! 4096-byte segments.

use base64::{engine::general_purpose, Engine as _};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::crypto::{aes_cbc_decrypt, split_encrypted_package, HashAlgorithm, AES_BLOCK_SIZE};
use crate::error::OfficeCryptoError;
use crate::util::{normalize_key_material, password_to_utf16le};

type Result<T> = std::result::Result<T, OfficeCryptoError>;

const ENCRYPTION_INFO_HEADER_LEN: usize = 8;
const SEGMENT_LEN: usize = 4096;
const PASSWORD_KEY_ENCRYPTOR_URI: &str =
    "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

struct BlockKeys;

impl BlockKeys {
    const VERIFIER_HASH_INPUT: [u8; 8] = [0xfe, 0xa7, 0xd2, 0x76, 0x3b, 0x4b, 0x9e, 0x79];
    const VERIFIER_HASH_VALUE: [u8; 8] = [0xd7, 0xaa, 0x0f, 0x6d, 0x30, 0x61, 0x34, 0x4e];
    const KEY_VALUE: [u8; 8] = [0x14, 0x6e, 0x0b, 0xe7, 0xab, 0xac, 0xd0, 0xd6];
    const INTEGRITY_HMAC_KEY: [u8; 8] = [0x5f, 0xb2, 0xad, 0x01, 0x0c, 0xb9, 0xe1, 0xf6];
    const INTEGRITY_HMAC_VALUE: [u8; 8] = [0xa0, 0x67, 0x7f, 0x02, 0xb2, 0x2c, 0x84, 0x33];
}

/// `keyData`: parameters for the package itself.
#[derive(Debug, Clone)]
pub struct KeyData {
    pub salt: Vec<u8>,
    pub block_size: usize,
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
}

/// `dataIntegrity`: encrypted HMAC key and value over the package stream.
#[derive(Debug, Clone)]
pub struct DataIntegrity {
    pub encrypted_hmac_key: Vec<u8>,
    pub encrypted_hmac_value: Vec<u8>,
}

/// The password `encryptedKey` element.
#[derive(Debug, Clone)]
pub struct PasswordKey {
    pub salt: Vec<u8>,
    pub block_size: usize,
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
    pub spin_count: u32,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
    pub encrypted_key_value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AgileEncryptionInfo {
    pub key_data: KeyData,
    pub data_integrity: Option<DataIntegrity>,
    pub password_key: PasswordKey,
}

fn attr_map(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn required<'a>(
    attrs: &'a [(String, String)],
    name: &str,
    context: &'static str,
) -> Result<&'a str> {
    attr(attrs, name).ok_or(OfficeCryptoError::InvalidEncryptionInfo(context))
}

fn base64_attr(attrs: &[(String, String)], name: &str, context: &'static str) -> Result<Vec<u8>> {
    let value: String = required(attrs, name, context)?
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(general_purpose::STANDARD.decode(value)?)
}

fn number_attr<T: std::str::FromStr>(
    attrs: &[(String, String)],
    name: &str,
    context: &'static str,
) -> Result<T> {
    required(attrs, name, context)?
        .trim()
        .parse()
        .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo(context))
}

fn check_cipher(attrs: &[(String, String)]) -> Result<()> {
    let algorithm = attr(attrs, "cipherAlgorithm").unwrap_or("AES");
    if !algorithm.eq_ignore_ascii_case("AES") {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(algorithm.to_string()));
    }
    let chaining = attr(attrs, "cipherChaining").unwrap_or("ChainingModeCBC");
    if chaining != "ChainingModeCBC" {
        return Err(OfficeCryptoError::UnsupportedAlgorithm(chaining.to_string()));
    }
    Ok(())
}

fn parse_key_data(attrs: &[(String, String)]) -> Result<KeyData> {
    check_cipher(attrs)?;
    Ok(KeyData {
        salt: base64_attr(attrs, "saltValue", "keyData.saltValue")?,
        block_size: number_attr(attrs, "blockSize", "keyData.blockSize")?,
        key_bits: number_attr(attrs, "keyBits", "keyData.keyBits")?,
        hash_algorithm: HashAlgorithm::from_name(required(
            attrs,
            "hashAlgorithm",
            "keyData.hashAlgorithm",
        )?)?,
    })
}

fn parse_password_key(attrs: &[(String, String)]) -> Result<PasswordKey> {
    check_cipher(attrs)?;
    Ok(PasswordKey {
        salt: base64_attr(attrs, "saltValue", "encryptedKey.saltValue")?,
        block_size: number_attr(attrs, "blockSize", "encryptedKey.blockSize")?,
        key_bits: number_attr(attrs, "keyBits", "encryptedKey.keyBits")?,
        hash_algorithm: HashAlgorithm::from_name(required(
            attrs,
            "hashAlgorithm",
            "encryptedKey.hashAlgorithm",
        )?)?,
        spin_count: number_attr(attrs, "spinCount", "encryptedKey.spinCount")?,
        encrypted_verifier_hash_input: base64_attr(
            attrs,
            "encryptedVerifierHashInput",
            "encryptedKey.encryptedVerifierHashInput",
        )?,
        encrypted_verifier_hash_value: base64_attr(
            attrs,
            "encryptedVerifierHashValue",
            "encryptedKey.encryptedVerifierHashValue",
        )?,
        encrypted_key_value: base64_attr(
            attrs,
            "encryptedKeyValue",
            "encryptedKey.encryptedKeyValue",
        )?,
    })
}

/// Parse agile encryption info from the raw `EncryptionInfo` stream.
pub fn parse_encryption_info(buffer: &[u8]) -> Result<AgileEncryptionInfo> {
    let xml = buffer
        .get(ENCRYPTION_INFO_HEADER_LEN..)
        .ok_or(OfficeCryptoError::InvalidEncryptionInfo("EncryptionInfo header truncated"))?;
    let xml = std::str::from_utf8(xml)
        .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("descriptor is not UTF-8"))?;
    // Some producers prefix the XML with a byte-order mark.
    let xml = xml.trim_start_matches('\u{feff}');

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut key_data = None;
    let mut data_integrity = None;
    let mut password_key = None;
    // Set while inside a `keyEncryptor` whose uri names the password encryptor.
    let mut in_password_encryptor = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let attrs = attr_map(&e)?;
                match e.local_name().as_ref() {
                    b"keyData" => key_data = Some(parse_key_data(&attrs)?),
                    b"dataIntegrity" => {
                        data_integrity = Some(DataIntegrity {
                            encrypted_hmac_key: base64_attr(
                                &attrs,
                                "encryptedHmacKey",
                                "dataIntegrity.encryptedHmacKey",
                            )?,
                            encrypted_hmac_value: base64_attr(
                                &attrs,
                                "encryptedHmacValue",
                                "dataIntegrity.encryptedHmacValue",
                            )?,
                        })
                    }
                    b"keyEncryptor" => {
                        in_password_encryptor =
                            attr(&attrs, "uri") == Some(PASSWORD_KEY_ENCRYPTOR_URI);
                    }
                    b"encryptedKey" if in_password_encryptor && password_key.is_none() => {
                        password_key = Some(parse_password_key(&attrs)?);
                    }
                    _ => {}
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"keyEncryptor" => {
                in_password_encryptor = false;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(AgileEncryptionInfo {
        key_data: key_data.ok_or(OfficeCryptoError::InvalidEncryptionInfo("missing keyData"))?,
        data_integrity,
        password_key: password_key.ok_or(OfficeCryptoError::InvalidEncryptionInfo(
            "missing password key encryptor",
        ))?,
    })
}

/// Iterated password hash: `H0 = Hash(salt || pw)`, `Hn+1 = Hash(LE32(n) || Hn)`.
pub fn iterated_hash(
    password: &str,
    salt: &[u8],
    hash_algorithm: HashAlgorithm,
    spin_count: u32,
) -> Vec<u8> {
    let password = password_to_utf16le(password);
    let mut h = hash_algorithm.digest(&[salt, &password]);
    for i in 0..spin_count {
        h = hash_algorithm.digest(&[&i.to_le_bytes(), &h]);
    }
    h
}

/// Final derivation step for one block key.
pub fn derive_key(
    iterated: &[u8],
    block_key: &[u8],
    hash_algorithm: HashAlgorithm,
    key_bits: usize,
) -> Result<Vec<u8>> {
    if key_bits == 0 || key_bits % 8 != 0 {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "keyBits is not a positive multiple of 8",
        ));
    }
    let h = hash_algorithm.digest(&[iterated, block_key]);
    Ok(normalize_key_material(&h, key_bits / 8))
}

fn derive_iv(salt: &[u8], block_key: &[u8], info: &KeyData) -> Vec<u8> {
    let h = info.hash_algorithm.digest(&[salt, block_key]);
    normalize_key_material(&h, info.block_size)
}

/// Verify the password and recover the package secret key.
pub fn secret_key_from_password(info: &AgileEncryptionInfo, password: &str) -> Result<Vec<u8>> {
    let key = &info.password_key;
    if key.block_size != AES_BLOCK_SIZE {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "encryptedKey.blockSize must be 16 for AES",
        ));
    }
    let iv = normalize_key_material(&key.salt, key.block_size);
    let h = iterated_hash(password, &key.salt, key.hash_algorithm, key.spin_count);

    let input_key = derive_key(
        &h,
        &BlockKeys::VERIFIER_HASH_INPUT,
        key.hash_algorithm,
        key.key_bits,
    )?;
    let verifier_input = aes_cbc_decrypt(&input_key, &iv, &key.encrypted_verifier_hash_input)?;
    let verifier_input = &verifier_input[..verifier_input.len().min(key.salt.len())];

    let value_key = derive_key(
        &h,
        &BlockKeys::VERIFIER_HASH_VALUE,
        key.hash_algorithm,
        key.key_bits,
    )?;
    let verifier_value = aes_cbc_decrypt(&value_key, &iv, &key.encrypted_verifier_hash_value)?;

    // The decrypted value is padded up to the AES block size; compare the digest prefix.
    let expected = key.hash_algorithm.digest(&[verifier_input]);
    if verifier_value.get(..expected.len()) != Some(expected.as_slice()) {
        return Err(OfficeCryptoError::InvalidPassword);
    }

    let value_key = derive_key(&h, &BlockKeys::KEY_VALUE, key.hash_algorithm, key.key_bits)?;
    let mut secret = aes_cbc_decrypt(&value_key, &iv, &key.encrypted_key_value)?;
    let secret_len = info.key_data.key_bits / 8;
    if secret.len() < secret_len {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "decrypted keyValue is truncated",
        ));
    }
    secret.truncate(secret_len);
    Ok(secret)
}

/// Check the `dataIntegrity` HMAC over the whole `EncryptedPackage` stream.
pub fn verify_integrity(
    info: &AgileEncryptionInfo,
    secret_key: &[u8],
    encrypted_package: &[u8],
) -> Result<()> {
    let integrity = info
        .data_integrity
        .as_ref()
        .ok_or(OfficeCryptoError::InvalidEncryptionInfo("missing dataIntegrity"))?;
    let key_data = &info.key_data;
    let digest_len = key_data.hash_algorithm.output_len();

    let iv = derive_iv(&key_data.salt, &BlockKeys::INTEGRITY_HMAC_KEY, key_data);
    let hmac_key = aes_cbc_decrypt(secret_key, &iv, &integrity.encrypted_hmac_key)?;
    let hmac_key = hmac_key
        .get(..digest_len)
        .ok_or(OfficeCryptoError::InvalidEncryptionInfo("HMAC key is truncated"))?;

    let iv = derive_iv(&key_data.salt, &BlockKeys::INTEGRITY_HMAC_VALUE, key_data);
    let hmac_value = aes_cbc_decrypt(secret_key, &iv, &integrity.encrypted_hmac_value)?;
    let expected = hmac_value
        .get(..digest_len)
        .ok_or(OfficeCryptoError::InvalidEncryptionInfo("HMAC value is truncated"))?;

    let actual = key_data.hash_algorithm.hmac(hmac_key, encrypted_package)?;
    if actual.as_slice() != expected {
        return Err(OfficeCryptoError::IntegrityCheckFailed);
    }
    Ok(())
}

/// Decrypt the segmented package with the recovered secret key.
pub fn decrypt_package(
    info: &AgileEncryptionInfo,
    secret_key: &[u8],
    encrypted_package: &[u8],
) -> Result<Vec<u8>> {
    let key_data = &info.key_data;
    if key_data.block_size != AES_BLOCK_SIZE {
        return Err(OfficeCryptoError::InvalidEncryptionInfo(
            "keyData.blockSize must be 16 for AES",
        ));
    }
    let (size, ciphertext) = split_encrypted_package(encrypted_package)?;

    let mut output = Vec::with_capacity(ciphertext.len());
    for (index, segment) in ciphertext.chunks(SEGMENT_LEN).enumerate() {
        let index = u32::try_from(index)
            .map_err(|_| OfficeCryptoError::InvalidEncryptionInfo("too many segments"))?;
        let iv = derive_iv(&key_data.salt, &index.to_le_bytes(), key_data);
        output.extend_from_slice(&aes_cbc_decrypt(secret_key, &iv, segment)?);
    }
    output.truncate(size);
    Ok(output)
}

/// Decrypt with agile encryption
pub fn decrypt(
    encryption_info_buffer: &[u8],
    encrypted_package_buffer: &[u8],
    password: &str,
    verify: bool,
) -> Result<Vec<u8>> {
    let info = parse_encryption_info(encryption_info_buffer)?;
    let secret_key = secret_key_from_password(&info, password)?;

    if verify {
        verify_integrity(&info, &secret_key, encrypted_package_buffer)?;
    }

    decrypt_package(&info, &secret_key, encrypted_package_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
  <keyData saltSize="16" blockSize="16" keyBits="256" hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="AAECAwQFBgcICQoLDA0ODw=="/>
  <dataIntegrity encryptedHmacKey="EBESEw==" encryptedHmacValue="qrvM"/>
  <keyEncryptors>
    <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
      <p:encryptedKey spinCount="100000" saltSize="16" blockSize="16" keyBits="256" hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="EBESExQVFhcYGRobHB0eHw==" encryptedVerifierHashInput="AQID" encryptedVerifierHashValue="BAUG" encryptedKeyValue="BwgJ"/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>"#;

    fn stream(xml: &str) -> Vec<u8> {
        let mut out = vec![0x04, 0x00, 0x04, 0x00, 0x40, 0x00, 0x00, 0x00];
        out.extend_from_slice(xml.as_bytes());
        out
    }

    #[test]
    fn parses_prefixed_password_key_encryptor() {
        let info = parse_encryption_info(&stream(DESCRIPTOR)).unwrap();
        assert_eq!(info.key_data.key_bits, 256);
        assert_eq!(info.key_data.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(info.key_data.salt, (0u8..16).collect::<Vec<_>>());
        assert_eq!(info.password_key.spin_count, 100_000);
        assert_eq!(info.password_key.salt, (16u8..32).collect::<Vec<_>>());
        assert_eq!(info.password_key.encrypted_verifier_hash_input, vec![1, 2, 3]);
        assert_eq!(info.password_key.encrypted_key_value, vec![7, 8, 9]);
        let integrity = info.data_integrity.unwrap();
        assert_eq!(integrity.encrypted_hmac_key, vec![0x10, 0x11, 0x12, 0x13]);
        assert_eq!(integrity.encrypted_hmac_value, vec![0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn missing_password_encryptor_is_invalid() {
        let xml = DESCRIPTOR.replace(PASSWORD_KEY_ENCRYPTOR_URI, "urn:certificate");
        let err = parse_encryption_info(&stream(&xml)).unwrap_err();
        assert!(matches!(err, OfficeCryptoError::InvalidEncryptionInfo(_)));
    }

    #[test]
    fn rejects_non_cbc_chaining() {
        let xml = DESCRIPTOR.replacen("ChainingModeCBC", "ChainingModeCFB", 1);
        let err = parse_encryption_info(&stream(&xml)).unwrap_err();
        assert!(matches!(err, OfficeCryptoError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn iterated_hash_with_zero_spins_is_salted_hash() {
        let h = iterated_hash("pw", b"salt", HashAlgorithm::Sha1, 0);
        let expected = HashAlgorithm::Sha1.digest(&[b"salt", &password_to_utf16le("pw")]);
        assert_eq!(h, expected);

        let one = iterated_hash("pw", b"salt", HashAlgorithm::Sha1, 1);
        assert_eq!(one, HashAlgorithm::Sha1.digest(&[&0u32.to_le_bytes(), &expected]));
    }

    #[test]
    fn derive_key_pads_short_digests() {
        let key = derive_key(&[0u8; 20], &BlockKeys::KEY_VALUE, HashAlgorithm::Sha1, 256).unwrap();
        assert_eq!(key.len(), 32);
        assert!(key[20..].iter().all(|b| *b == 0x36));
        assert!(derive_key(&[0u8; 20], &BlockKeys::KEY_VALUE, HashAlgorithm::Sha1, 12).is_err());
    }
}
