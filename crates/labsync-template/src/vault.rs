//! Ansible Vault (format 1.1 / 1.2, AES256) decryption

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::VaultError;

/// Prefix every vault payload starts with
pub const VAULT_HEADER_PREFIX: &str = "$ANSIBLE_VAULT;";

const PBKDF2_ITERATIONS: u32 = 10_000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Check whether a raw value looks like vault ciphertext
#[must_use]
pub fn is_vault_payload(value: &str) -> bool {
    value.trim_start().starts_with(VAULT_HEADER_PREFIX)
}

/// Decrypts vault payloads with a single password
#[derive(Clone)]
pub struct VaultDecryptor {
    password: String,
}

impl std::fmt::Debug for VaultDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultDecryptor").finish_non_exhaustive()
    }
}

/// Key material derived from password and salt
struct DerivedKeys {
    cipher_key: [u8; KEY_LEN],
    hmac_key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl VaultDecryptor {
    /// Create a decryptor for the given password
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    /// Decrypt a complete vault payload (header line plus hex body)
    ///
    /// # Errors
    /// Returns `VaultError` when the password is empty, the payload is
    /// malformed, the HMAC does not match, or the plaintext is invalid.
    pub fn decrypt(&self, payload: &str) -> Result<String, VaultError> {
        if self.password.is_empty() {
            return Err(VaultError::MissingPassword);
        }

        let mut lines = payload.trim().lines();
        let header = lines.next().unwrap_or_default().trim();
        parse_header(header)?;

        let body: String = lines.map(str::trim).collect();
        if body.is_empty() {
            return Err(VaultError::Malformed("empty body".to_string()));
        }

        let inner = hex::decode(&body)
            .map_err(|e| VaultError::Malformed(format!("body is not hex: {e}")))?;
        let inner = String::from_utf8(inner)
            .map_err(|_| VaultError::Malformed("body is not valid UTF-8".to_string()))?;

        let mut sections = inner.split('\n');
        let salt = decode_section(sections.next(), "salt")?;
        let expected_mac = decode_section(sections.next(), "hmac")?;
        let mut data = decode_section(sections.next(), "ciphertext")?;

        let keys = self.derive_keys(&salt);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys.hmac_key)
            .map_err(|e| VaultError::Malformed(e.to_string()))?;
        mac.update(&data);
        mac.verify_slice(&expected_mac)
            .map_err(|_| VaultError::IntegrityCheckFailed)?;

        let mut cipher = Aes256Ctr::new_from_slices(&keys.cipher_key, &keys.iv)
            .map_err(|e| VaultError::Malformed(e.to_string()))?;
        cipher.apply_keystream(&mut data);

        let plaintext = strip_padding(&data)?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| VaultError::InvalidPlaintext("not valid UTF-8".to_string()))
    }

    fn derive_keys(&self, salt: &[u8]) -> DerivedKeys {
        let mut derived = [0u8; 2 * KEY_LEN + IV_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            salt,
            PBKDF2_ITERATIONS,
            &mut derived,
        );

        let mut keys = DerivedKeys {
            cipher_key: [0u8; KEY_LEN],
            hmac_key: [0u8; KEY_LEN],
            iv: [0u8; IV_LEN],
        };
        keys.cipher_key.copy_from_slice(&derived[..KEY_LEN]);
        keys.hmac_key.copy_from_slice(&derived[KEY_LEN..2 * KEY_LEN]);
        keys.iv.copy_from_slice(&derived[2 * KEY_LEN..]);
        keys
    }

    /// Encrypt plaintext with a fixed salt, producing a full vault payload
    #[cfg(test)]
    pub(crate) fn encrypt_with_salt(&self, plaintext: &str, salt: &[u8]) -> String {
        let keys = self.derive_keys(salt);

        let pad = BLOCK_LEN - plaintext.len() % BLOCK_LEN;
        let mut data = plaintext.as_bytes().to_vec();
        data.extend(std::iter::repeat_n(pad as u8, pad));

        let mut cipher = Aes256Ctr::new_from_slices(&keys.cipher_key, &keys.iv).unwrap();
        cipher.apply_keystream(&mut data);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys.hmac_key).unwrap();
        mac.update(&data);
        let tag = mac.finalize().into_bytes();

        let inner = format!(
            "{}\n{}\n{}",
            hex::encode(salt),
            hex::encode(tag),
            hex::encode(&data)
        );
        let body = hex::encode(inner.as_bytes());
        let lines: Vec<&str> = body
            .as_bytes()
            .chunks(80)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();

        format!("$ANSIBLE_VAULT;1.1;AES256\n{}", lines.join("\n"))
    }
}

fn parse_header(header: &str) -> Result<(), VaultError> {
    let parts: Vec<&str> = header.split(';').collect();
    if parts.len() < 3 || parts[0] != "$ANSIBLE_VAULT" {
        return Err(VaultError::InvalidHeader(header.to_string()));
    }
    match parts[1] {
        "1.1" | "1.2" => {}
        other => return Err(VaultError::Unsupported(format!("version {other}"))),
    }
    if parts[2].trim() != "AES256" {
        return Err(VaultError::Unsupported(format!("cipher {}", parts[2])));
    }
    Ok(())
}

fn decode_section(section: Option<&str>, name: &str) -> Result<Vec<u8>, VaultError> {
    let section = section
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VaultError::Malformed(format!("missing {name}")))?;
    hex::decode(section).map_err(|e| VaultError::Malformed(format!("{name} is not hex: {e}")))
}

fn strip_padding(data: &[u8]) -> Result<&[u8], VaultError> {
    let pad = *data
        .last()
        .ok_or_else(|| VaultError::InvalidPlaintext("empty plaintext".to_string()))?
        as usize;
    if pad == 0 || pad > BLOCK_LEN || pad > data.len() {
        return Err(VaultError::InvalidPlaintext("bad padding".to_string()));
    }
    let (plain, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(VaultError::InvalidPlaintext("bad padding".to_string()));
    }
    Ok(plain)
}
