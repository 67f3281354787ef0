//! Per-device service parameters issued by the control plane

use serde::{Deserialize, Serialize};

/// Credentials an exporter needs to register with its jumpstarter instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceParameters {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "tlsCA")]
    pub tls_ca: String,
}

impl ServiceParameters {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            tls_ca: String::new(),
        }
    }
}

/// Lookup key `"<jumpstarter instance>:<device>"`
#[must_use]
pub fn service_parameters_key(jumpstarter_instance: &str, device: &str) -> String {
    format!("{jumpstarter_instance}:{device}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(service_parameters_key("prod", "rig-1"), "prod:rig-1");
    }

    #[test]
    fn test_decode_tls_ca() {
        let params: ServiceParameters =
            serde_yaml::from_str("token: abc\ntlsCA: \"-----BEGIN\"\n").unwrap();
        assert_eq!(params.token, "abc");
        assert_eq!(params.tls_ca, "-----BEGIN");
    }
}
