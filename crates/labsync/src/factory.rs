//! SSH session factory

use async_trait::async_trait;
use labsync_api::{ExporterHost, LabResource};
use labsync_core::SessionFactory;
use labsync_host::{HostError, HostSession, RemoteHostSession};
use tracing::debug;

/// Opens [`RemoteHostSession`]s over SSH from rendered host records
#[derive(Debug, Default)]
pub struct SshSessionFactory;

impl SshSessionFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(&self, host: &ExporterHost) -> Result<Box<dyn HostSession>, HostError> {
        let session = RemoteHostSession::for_exporter_host(host)?;
        debug!(host = %host.name(), "SSH session prepared");
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_api::{ExporterHostSpec, Management, SshCredentials};

    #[tokio::test]
    async fn test_host_without_address_fails_to_open() {
        let host = ExporterHost::new("host-a", ExporterHostSpec::default());
        let err = SshSessionFactory::new().open(&host).await.err().unwrap();
        assert!(matches!(err, HostError::Config { .. }));
    }

    #[tokio::test]
    async fn test_host_without_credentials_fails() {
        let host = ExporterHost::new(
            "host-a",
            ExporterHostSpec {
                addresses: vec!["10.0.0.5".to_string()],
                management: Management {
                    ssh: SshCredentials {
                        user: "root".to_string(),
                        ..SshCredentials::default()
                    },
                },
                ..ExporterHostSpec::default()
            },
        );
        let err = SshSessionFactory::new().open(&host).await.err().unwrap();
        // no credentials configured
        assert!(matches!(err, HostError::Exec(_)));
    }

    #[tokio::test]
    async fn test_password_host_opens_lazily() {
        let host = ExporterHost::new(
            "host-a",
            ExporterHostSpec {
                addresses: vec!["10.0.0.5".to_string()],
                management: Management {
                    ssh: SshCredentials {
                        user: "root".to_string(),
                        password: "secret".to_string(),
                        ..SshCredentials::default()
                    },
                },
                ..ExporterHostSpec::default()
            },
        );
        // no network traffic until the first command
        assert!(SshSessionFactory::new().open(&host).await.is_ok());
    }
}
