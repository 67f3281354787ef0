//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExecError;
use crate::keys::{AuthMethod, ResolvedAuth};
use crate::result::{CommandResult, ConnectionInfo};
use crate::traits::RemoteExecutor;

/// Default TCP connect and handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Lab hosts are reinstalled often; host keys are not pinned
        Ok(true)
    }
}

/// SSH command executor
///
/// Holds one SSH session, opened on first use and shared by every command.
pub struct SshExecutor {
    /// Connection configuration
    conn_info: ConnectionInfo,
    /// Credentials, tried in order
    auth: Vec<ResolvedAuth>,
    connect_timeout: Duration,
    /// SSH session (initialized on first use)
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("auth_methods", &self.auth.len())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    ///
    /// Key material is loaded immediately so that bad credentials surface
    /// before any network traffic.
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if a key cannot be loaded and
    /// `ExecError::ConfigError` if no credential is given
    pub fn new(conn_info: ConnectionInfo, methods: &[AuthMethod]) -> Result<Self, ExecError> {
        if methods.is_empty() {
            return Err(ExecError::ConfigError(format!(
                "no SSH credentials configured for {}",
                conn_info.host
            )));
        }

        let auth = methods
            .iter()
            .map(AuthMethod::resolve)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        Ok(Self {
            conn_info,
            auth,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session: Mutex::new(None),
        })
    }

    /// Connect and authenticate if no session is open yet
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn ensure_connected(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());

        let connect = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            SshClientHandler,
        );
        let mut session = timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| ExecError::Timeout {
                timeout: self.connect_timeout,
            })?
            .map_err(|e| {
                ExecError::ConnectionFailed(format!(
                    "{}:{}: {e}",
                    self.conn_info.host, self.conn_info.port
                ))
            })?;

        self.authenticate(&mut session).await?;

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    async fn authenticate(
        &self,
        session: &mut client::Handle<SshClientHandler>,
    ) -> Result<(), ExecError> {
        let user = &self.conn_info.user;

        for auth in &self.auth {
            let result = match auth {
                ResolvedAuth::Key(key) => {
                    let hash_alg = session
                        .best_supported_rsa_hash()
                        .await
                        .ok()
                        .flatten()
                        .flatten();
                    session
                        .authenticate_publickey(
                            user,
                            PrivateKeyWithHashAlg::new(Arc::new(key.clone()), hash_alg),
                        )
                        .await
                }
                ResolvedAuth::Password(password) => {
                    session.authenticate_password(user, password).await
                }
            };

            match result {
                Ok(res) if res.success() => return Ok(()),
                Ok(_) => debug!(method = ?auth, "SSH auth method rejected"),
                Err(e) => return Err(ExecError::AuthenticationFailed(e.to_string())),
            }
        }

        Err(ExecError::AuthenticationFailed(format!(
            "all methods rejected for {user}@{}",
            self.conn_info.host
        )))
    }

    /// Execute command on remote host
    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let mut session_lock = self.session.lock().await;

        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                None => break,
                _ => {}
            }
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.ensure_connected().await?;
        self.execute_remote(cmd).await
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, timeout = ?timeout_duration, "executing with timeout");

        // connection setup has its own timeout
        self.ensure_connected().await?;

        match timeout(timeout_duration, self.execute_remote(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    async fn connect(&self) -> Result<(), ExecError> {
        self.ensure_connected().await
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            if let Err(e) = session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
            {
                warn!(host = %self.conn_info.host, error = %e, "SSH disconnect failed");
                return Err(ExecError::IoError(e.to_string()));
            }
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        // a held lock means a command is in flight on an open session
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(true)
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

/// Builder for `SshExecutor`
pub struct SshExecutorBuilder {
    conn_info: ConnectionInfo,
    methods: Vec<AuthMethod>,
    connect_timeout: Duration,
}

impl SshExecutorBuilder {
    /// Create builder with required fields
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            conn_info: ConnectionInfo::new(host, user),
            methods: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set custom port; 0 keeps the default
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.conn_info = self.conn_info.with_port(port);
        self
    }

    /// Add a private key file
    #[must_use]
    pub fn with_key_file(
        mut self,
        path: impl Into<std::path::PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        self.methods.push(AuthMethod::KeyFile {
            path: path.into(),
            passphrase,
        });
        self
    }

    /// Add an inline private key
    #[must_use]
    pub fn with_key_data(mut self, data: impl Into<String>, passphrase: Option<String>) -> Self {
        self.methods.push(AuthMethod::KeyData {
            data: data.into(),
            passphrase,
        });
        self
    }

    /// Add password authentication
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.methods.push(AuthMethod::Password(password.into()));
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Build the executor
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn build(self) -> Result<SshExecutor, ExecError> {
        let mut executor = SshExecutor::new(self.conn_info, &self.methods)?;
        executor.connect_timeout = self.connect_timeout;
        Ok(executor)
    }
}
