//! Variable store backed by YAML files, with Ansible Vault support

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::{VarError, VaultError};
use crate::vault::{VaultDecryptor, is_vault_payload};

/// Environment variable consulted when no password file is passed explicitly
pub const VAULT_PASSWORD_FILE_ENV: &str = "ANSIBLE_VAULT_PASSWORD_FILE";

#[derive(Debug, Clone)]
enum VarValue {
    Plain(String),
    Vault {
        ciphertext: String,
        /// Decrypted value, filled on first successful read
        plaintext: OnceLock<String>,
    },
}

impl VarValue {
    fn from_raw(raw: String) -> Self {
        if is_vault_payload(&raw) {
            VarValue::Vault {
                ciphertext: raw,
                plaintext: OnceLock::new(),
            }
        } else {
            VarValue::Plain(raw)
        }
    }
}

/// Flat, string-keyed collection of variables
///
/// Values are plain strings or vault ciphertext; ciphertext is only
/// decrypted when read through [`Variables::get`].
#[derive(Debug, Clone, Default)]
pub struct Variables {
    data: BTreeMap<String, VarValue>,
    decryptor: Option<VaultDecryptor>,
}

impl Variables {
    /// Create an empty store with an optional vault password
    #[must_use]
    pub fn new(vault_password: Option<String>) -> Self {
        Self {
            data: BTreeMap::new(),
            decryptor: vault_password
                .filter(|p| !p.is_empty())
                .map(VaultDecryptor::new),
        }
    }

    /// Create an empty store, reading the vault password from a file
    ///
    /// Falls back to `ANSIBLE_VAULT_PASSWORD_FILE` when `path` is `None`;
    /// with neither set, encrypted values fail to resolve at read time.
    ///
    /// # Errors
    /// Returns `VarError::Io` if the password file cannot be read
    pub fn from_password_file(path: Option<&Path>) -> Result<Self, VarError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(VAULT_PASSWORD_FILE_ENV).map(PathBuf::from));

        let Some(path) = path else {
            return Ok(Self::new(None));
        };

        let content = std::fs::read_to_string(&path).map_err(|e| VarError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let password = content.lines().next().unwrap_or_default().trim().to_string();
        debug!(path = %path.display(), "loaded vault password file");

        Ok(Self::new(Some(password)))
    }

    /// Merge variables from a YAML mapping file; later files override earlier keys
    ///
    /// # Errors
    /// Returns `VarError` if the file cannot be read, is not a mapping,
    /// or contains non-scalar values
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), VarError> {
        let content = std::fs::read_to_string(path).map_err(|e| VarError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let doc: Value = serde_yaml::from_str(&content).map_err(|e| VarError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mapping = match doc {
            Value::Mapping(m) => m,
            Value::Null => return Ok(()),
            _ => {
                return Err(VarError::Parse {
                    path: path.to_path_buf(),
                    message: "top level is not a mapping".to_string(),
                });
            }
        };

        let before = self.data.len();
        for (key, value) in mapping {
            let key = scalar_to_string(&key).ok_or_else(|| VarError::Parse {
                path: path.to_path_buf(),
                message: format!("non-scalar key {key:?}"),
            })?;
            let raw = raw_value(&value).ok_or_else(|| VarError::NotScalar {
                key: key.clone(),
                path: path.to_path_buf(),
            })?;
            self.data.insert(key, VarValue::from_raw(raw));
        }

        info!(
            path = %path.display(),
            added = self.data.len() - before,
            total = self.data.len(),
            "loaded variables"
        );
        Ok(())
    }

    /// Set a variable; vault ciphertext is detected automatically
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), VarValue::from_raw(value.into()));
    }

    /// Get a variable's plaintext value
    ///
    /// # Errors
    /// Returns `VarError::NotFound` for unknown keys and `VarError::Vault`
    /// when an encrypted value cannot be decrypted
    pub fn get(&self, key: &str) -> Result<String, VarError> {
        match self.data.get(key) {
            None => Err(VarError::NotFound(key.to_string())),
            Some(VarValue::Plain(value)) => Ok(value.clone()),
            Some(VarValue::Vault {
                ciphertext,
                plaintext,
            }) => {
                if let Some(value) = plaintext.get() {
                    return Ok(value.clone());
                }
                let decryptor = self.decryptor.as_ref().ok_or_else(|| VarError::Vault {
                    key: key.to_string(),
                    source: VaultError::MissingPassword,
                })?;
                let value = decryptor
                    .decrypt(ciphertext)
                    .map_err(|source| VarError::Vault {
                        key: key.to_string(),
                        source,
                    })?;
                Ok(plaintext.get_or_init(|| value).clone())
            }
        }
    }

    /// Whether a variable holds vault ciphertext
    #[must_use]
    pub fn is_vault_encrypted(&self, key: &str) -> bool {
        matches!(self.data.get(key), Some(VarValue::Vault { .. }))
    }

    /// Whether a variable exists
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// All variable keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn raw_value(value: &Value) -> Option<String> {
    match value {
        // `!vault |` blocks carry the ciphertext as a tagged string
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            if tag.trim_start_matches('!') == "vault" {
                tagged.value.as_str().map(str::to_string)
            } else {
                scalar_to_string(&tagged.value)
            }
        }
        other => scalar_to_string(other),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_vars(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_scalars() {
        let file = write_vars("simple_var: \"hello world\"\nnumber_var: 42\nbool_var: true\n");
        let mut vars = Variables::new(None);
        vars.load_from_file(file.path()).unwrap();

        assert_eq!(vars.len(), 3);
        assert_eq!(vars.get("simple_var").unwrap(), "hello world");
        assert_eq!(vars.get("number_var").unwrap(), "42");
        assert_eq!(vars.get("bool_var").unwrap(), "true");
    }

    #[test]
    fn test_load_vault_tagged_value() {
        let payload = VaultDecryptor::new("pw").encrypt_with_salt("s3cret", &[7u8; 32]);
        let indented: String = payload.lines().map(|l| format!("  {l}\n")).collect();
        let file = write_vars(&format!("plain: x\nsecret: !vault |\n{indented}"));

        let mut vars = Variables::new(Some("pw".to_string()));
        vars.load_from_file(file.path()).unwrap();

        assert!(vars.is_vault_encrypted("secret"));
        assert!(!vars.is_vault_encrypted("plain"));
        assert_eq!(vars.get("secret").unwrap(), "s3cret");
    }

    #[test]
    fn test_load_ansible_vault_file() {
        // encrypted outside this crate, password "rack-7-vault"
        let file = write_vars(
            "token: !vault |
  $ANSIBLE_VAULT;1.1;AES256
  38336138346364613237326536376265646632386362313836616637303431346430303566633733
  6134663666613335313233383131623738636631643038620a346261373930326163336161316132
  62386164343135393239303663343439623136356437323466336462376161313561616236396439
  3933616462356433650a393162373536363532383862643634353561316335633133623766646435
  35306664646163346333383032616138306639313532326431316566656531653935
",
        );

        let mut vars = Variables::new(Some("rack-7-vault".to_string()));
        vars.load_from_file(file.path()).unwrap();
        assert_eq!(vars.get("token").unwrap(), "exporter token for rack 7");

        let mut wrong = Variables::new(Some("rack-8-vault".to_string()));
        wrong.load_from_file(file.path()).unwrap();
        assert!(matches!(
            wrong.get("token"),
            Err(VarError::Vault {
                source: VaultError::IntegrityCheckFailed,
                ..
            })
        ));
    }

    #[test]
    fn test_later_files_override() {
        let first = write_vars("a: one\nb: two\n");
        let second = write_vars("b: three\n");
        let mut vars = Variables::new(None);
        vars.load_from_file(first.path()).unwrap();
        vars.load_from_file(second.path()).unwrap();

        assert_eq!(vars.get("a").unwrap(), "one");
        assert_eq!(vars.get("b").unwrap(), "three");
    }

    #[test]
    fn test_load_errors() {
        let mut vars = Variables::new(None);
        assert!(matches!(
            vars.load_from_file(Path::new("non_existent_file.yaml")),
            Err(VarError::Io { .. })
        ));

        let invalid = write_vars("invalid: yaml: content:\n  - missing\n    proper: indentation\n");
        assert!(matches!(
            vars.load_from_file(invalid.path()),
            Err(VarError::Parse { .. })
        ));

        let nested = write_vars("list:\n  - a\n  - b\n");
        assert!(matches!(
            vars.load_from_file(nested.path()),
            Err(VarError::NotScalar { key, .. }) if key == "list"
        ));
    }

    #[test]
    fn test_get_missing() {
        let vars = Variables::new(None);
        assert!(matches!(vars.get("nope"), Err(VarError::NotFound(k)) if k == "nope"));
    }

    #[test]
    fn test_encrypted_without_password() {
        let mut vars = Variables::new(None);
        vars.set("vault_var", "$ANSIBLE_VAULT;1.1;AES256\n  6162636465666768696a6b6c6d6e6f70\n");

        assert!(vars.is_vault_encrypted("vault_var"));
        assert!(matches!(
            vars.get("vault_var"),
            Err(VarError::Vault {
                source: VaultError::MissingPassword,
                ..
            })
        ));
    }

    #[test]
    fn test_password_file() {
        let pw = write_vars("hunter2\n");
        let payload = VaultDecryptor::new("hunter2").encrypt_with_salt("value", &[1u8; 32]);

        let mut vars = Variables::from_password_file(Some(pw.path())).unwrap();
        vars.set("k", payload);

        assert_eq!(vars.get("k").unwrap(), "value");
        // second read hits the cached plaintext
        assert_eq!(vars.get("k").unwrap(), "value");
    }
}
