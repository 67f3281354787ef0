//! SSH credential resolution

use std::path::{Path, PathBuf};

use russh::keys::{PrivateKey, decode_secret_key, load_secret_key};
use tracing::{debug, warn};

/// One way of authenticating against an SSH server
#[derive(Clone)]
pub enum AuthMethod {
    /// Private key file, optionally encrypted
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// Inline private key (OpenSSH or PEM text), optionally encrypted
    KeyData {
        data: String,
        passphrase: Option<String>,
    },
    /// Plain password
    Password(String),
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::KeyFile { path, .. } => {
                f.debug_struct("KeyFile").field("path", path).finish_non_exhaustive()
            }
            AuthMethod::KeyData { .. } => f.write_str("KeyData(..)"),
            AuthMethod::Password(_) => f.write_str("Password(..)"),
        }
    }
}

/// Credential ready to hand to the SSH client
#[derive(Clone)]
pub enum ResolvedAuth {
    Key(PrivateKey),
    Password(String),
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Key(_) => f.write_str("Key(..)"),
            ResolvedAuth::Password(_) => f.write_str("Password(..)"),
        }
    }
}

impl AuthMethod {
    /// Load key material for this method
    ///
    /// # Errors
    /// Returns `KeyError` if the key file cannot be read or a key fails to parse
    pub fn resolve(&self) -> Result<ResolvedAuth, KeyError> {
        match self {
            AuthMethod::KeyFile { path, passphrase } => {
                if !path.exists() {
                    return Err(KeyError::NotFound(path.display().to_string()));
                }
                warn_on_open_permissions(path);
                let key = load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                    KeyError::Parse {
                        origin: "key file".to_string(),
                        message: e.to_string(),
                    }
                })?;
                debug!(path = %path.display(), "loaded SSH key file");
                Ok(ResolvedAuth::Key(key))
            }
            AuthMethod::KeyData { data, passphrase } => {
                let key = decode_secret_key(data, passphrase.as_deref()).map_err(|e| {
                    KeyError::Parse {
                        origin: "sshKeyData".to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(ResolvedAuth::Key(key))
            }
            AuthMethod::Password(password) => Ok(ResolvedAuth::Password(password.clone())),
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("failed to parse SSH private key from {origin}: {message}")]
    Parse { origin: String, message: String },
}

#[cfg(unix)]
fn warn_on_open_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = std::fs::metadata(path) {
        // group or other bits set
        if metadata.permissions().mode() & 0o77 != 0 {
            warn!(path = %path.display(), "SSH key file permissions are too open (should be 600)");
        }
    }
}

#[cfg(not(unix))]
fn warn_on_open_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_file() {
        let method = AuthMethod::KeyFile {
            path: PathBuf::from("/nonexistent/id_ed25519"),
            passphrase: None,
        };
        assert!(matches!(method.resolve(), Err(KeyError::NotFound(_))));
    }

    #[test]
    fn test_invalid_key_data() {
        let method = AuthMethod::KeyData {
            data: "not a key".to_string(),
            passphrase: None,
        };
        assert!(matches!(method.resolve(), Err(KeyError::Parse { .. })));
    }

    #[test]
    fn test_password_passthrough() {
        let method = AuthMethod::Password("hunter2".to_string());
        assert!(matches!(method.resolve(), Ok(ResolvedAuth::Password(p)) if p == "hunter2"));
        // secrets stay out of debug output
        assert_eq!(format!("{method:?}"), "Password(..)");
    }
}
