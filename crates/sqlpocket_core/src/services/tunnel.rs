//! SSH local port forwarding to a remote SQL server.
//!
//! At most one tunnel is live per [`SecureTunnel`]; opening a new one always
//! tears down the previous one first.
//!
//! Host key verification is relaxed: every server key is accepted. This is an
//! accepted risk for ad-hoc mobile use where no known_hosts store exists, and
//! it leaves the tunnel open to man-in-the-middle interception on hostile
//! networks.

use crate::error::{PocketError, TunnelStage};
use crate::models::{SessionOptions, TunnelAuth, TunnelSpec};

use async_trait::async_trait;
use russh::client;
use russh_keys::key::KeyPair;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a graceful SSH disconnect may take before it is abandoned.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns at most one forwarding tunnel.
#[async_trait]
pub trait TunnelProvider: Send {
    /// Open a tunnel and return the local port it listens on.
    ///
    /// Any previously open tunnel is closed first.
    async fn open(&mut self, spec: &TunnelSpec) -> Result<u16, PocketError>;

    /// Close the tunnel. Never fails; teardown errors are logged and dropped.
    async fn close(&mut self);

    /// Whether a tunnel is currently open.
    fn is_active(&self) -> bool;

    /// Local port of the open tunnel.
    fn local_port(&self) -> Option<u16>;
}

/// SSH client handler for russh.
struct TunnelClientHandler;

#[async_trait]
impl client::Handler for TunnelClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Relaxed host verification, see module docs
        Ok(true)
    }
}

type SshHandle = Arc<Mutex<client::Handle<TunnelClientHandler>>>;

/// A tunnel that is up and forwarding.
struct ActiveTunnel {
    id: Uuid,
    local_port: u16,
    ssh: SshHandle,
    cancel_token: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl Drop for ActiveTunnel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.accept_task.abort();
    }
}

/// SSH tunnel exposing a remote `host:port` on `127.0.0.1:<local_port>`.
pub struct SecureTunnel {
    connect_timeout: Duration,
    active: Option<ActiveTunnel>,
}

impl SecureTunnel {
    /// Create a closed tunnel using the configured connect timeout.
    pub fn new(options: &SessionOptions) -> Self {
        Self { connect_timeout: options.tunnel_connect_timeout(), active: None }
    }

    /// Load the private key before any network I/O.
    async fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<Arc<KeyPair>, PocketError> {
        let key_data = tokio::fs::read(path).await.map_err(|e| {
            PocketError::tunnel_with_source(
                TunnelStage::IdentityLoad,
                format!("Failed to read SSH key file {}", path.display()),
                e,
            )
        })?;

        let key = russh_keys::decode_secret_key(&String::from_utf8_lossy(&key_data), passphrase)
            .map_err(|e| {
                let message = if passphrase.is_some() {
                    "Failed to decrypt SSH key"
                } else {
                    "Failed to parse SSH key (it may need a passphrase)"
                };
                PocketError::tunnel_with_source(TunnelStage::IdentityLoad, message, e)
            })?;

        Ok(Arc::new(key))
    }

    /// Connect and complete the SSH handshake within the connect timeout.
    async fn connect_ssh(
        spec: &TunnelSpec,
        connect_timeout: Duration,
    ) -> Result<client::Handle<TunnelClientHandler>, PocketError> {
        let config = Arc::new(client::Config::default());
        let addr = (spec.ssh_host.as_str(), spec.ssh_port);

        match tokio::time::timeout(connect_timeout, client::connect(config, addr, TunnelClientHandler))
            .await
        {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(PocketError::tunnel_with_source(
                TunnelStage::Connect,
                format!("Failed to connect to SSH server {}:{}", spec.ssh_host, spec.ssh_port),
                e,
            )),
            Err(_) => Err(PocketError::tunnel(
                TunnelStage::Timeout,
                format!(
                    "SSH server {}:{} did not respond within {}s",
                    spec.ssh_host,
                    spec.ssh_port,
                    connect_timeout.as_secs()
                ),
            )),
        }
    }

    /// Authenticate with the configured method.
    async fn authenticate(
        handle: &mut client::Handle<TunnelClientHandler>,
        spec: &TunnelSpec,
        key: Option<Arc<KeyPair>>,
    ) -> Result<(), PocketError> {
        let result = match (&spec.auth, key) {
            (TunnelAuth::Password { password }, _) => {
                handle.authenticate_password(&spec.username, password).await
            }
            (TunnelAuth::KeyFile { .. }, Some(key)) => {
                handle.authenticate_publickey(&spec.username, key).await
            }
            (TunnelAuth::KeyFile { .. }, None) => {
                return Err(PocketError::tunnel(TunnelStage::IdentityLoad, "SSH key was not loaded"));
            }
        };

        match result {
            Ok(true) => {
                tracing::info!(user = %spec.username, host = %spec.ssh_host, "SSH authentication successful");
                Ok(())
            }
            Ok(false) => Err(PocketError::tunnel(
                TunnelStage::Authentication,
                format!("SSH server rejected credentials for {}", spec.username),
            )),
            Err(e) => Err(PocketError::tunnel_with_source(
                TunnelStage::Authentication,
                "SSH authentication failed",
                e,
            )),
        }
    }

    /// Best-effort SSH disconnect; errors are logged, never returned.
    async fn disconnect_quietly(ssh: &SshHandle, tunnel_id: Uuid) {
        let handle = ssh.lock().await;
        let disconnect =
            handle.disconnect(russh::Disconnect::ByApplication, "tunnel closed", "en");
        match tokio::time::timeout(DISCONNECT_TIMEOUT, disconnect).await {
            Ok(Ok(())) => tracing::debug!(tunnel_id = %tunnel_id, "SSH session disconnected"),
            Ok(Err(e)) => {
                tracing::warn!(tunnel_id = %tunnel_id, error = %e, "SSH disconnect failed; ignoring")
            }
            Err(_) => tracing::warn!(tunnel_id = %tunnel_id, "SSH disconnect timed out; ignoring"),
        }
    }

    /// Accept local connections until cancelled.
    async fn run_listener(
        listener: TcpListener,
        ssh: SshHandle,
        target_host: String,
        target_port: u16,
        tunnel_id: Uuid,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((local_stream, peer_addr)) => {
                            tracing::debug!(tunnel_id = %tunnel_id, peer = %peer_addr, "New tunnel connection");

                            let ssh = ssh.clone();
                            let target_host = target_host.clone();
                            let cancel = cancel_token.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::forward_connection(
                                    local_stream,
                                    ssh,
                                    &target_host,
                                    target_port,
                                    cancel,
                                )
                                .await
                                {
                                    tracing::warn!(tunnel_id = %tunnel_id, error = %e, "Tunnel forwarding error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(tunnel_id = %tunnel_id, error = %e, "Failed to accept tunnel connection");
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    tracing::debug!(tunnel_id = %tunnel_id, "Tunnel listener stopped");
                    break;
                }
            }
        }
    }

    /// Pipe one local connection through a direct-tcpip channel.
    async fn forward_connection(
        mut local_stream: TcpStream,
        ssh: SshHandle,
        target_host: &str,
        target_port: u16,
        cancel_token: CancellationToken,
    ) -> Result<(), PocketError> {
        let channel = {
            let handle = ssh.lock().await;
            handle
                .channel_open_direct_tcpip(target_host, target_port as u32, "127.0.0.1", 0)
                .await
                .map_err(|e| {
                    PocketError::tunnel_with_source(
                        TunnelStage::Forwarding,
                        format!("Failed to open SSH channel to {target_host}:{target_port}"),
                        e,
                    )
                })?
        };

        let mut channel = channel.into_stream();
        let mut buf_local = [0u8; 8192];
        let mut buf_remote = [0u8; 8192];

        loop {
            tokio::select! {
                n = local_stream.read(&mut buf_local) => {
                    match n {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if channel.write_all(&buf_local[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                n = channel.read(&mut buf_remote) => {
                    match n {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if local_stream.write_all(&buf_remote[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                _ = cancel_token.cancelled() => break,
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TunnelProvider for SecureTunnel {
    async fn open(&mut self, spec: &TunnelSpec) -> Result<u16, PocketError> {
        self.close().await;
        spec.validate()?;

        let tunnel_id = Uuid::new_v4();
        tracing::info!(
            tunnel_id = %tunnel_id,
            ssh_host = %spec.ssh_host,
            ssh_port = spec.ssh_port,
            target = %format!("{}:{}", spec.target_host, spec.target_port),
            "Opening SSH tunnel"
        );

        let key = match &spec.auth {
            TunnelAuth::KeyFile { path, passphrase } => {
                Some(Self::load_private_key(path, passphrase.as_deref()).await.inspect_err(|e| {
                    tracing::warn!(tunnel_id = %tunnel_id, error = %e, "SSH identity load failed");
                })?)
            }
            TunnelAuth::Password { .. } => None,
        };

        let mut handle = Self::connect_ssh(spec, self.connect_timeout).await.inspect_err(|e| {
            tracing::warn!(tunnel_id = %tunnel_id, error = %e, "SSH connect failed");
        })?;

        if let Err(e) = Self::authenticate(&mut handle, spec, key).await {
            tracing::warn!(tunnel_id = %tunnel_id, error = %e, "SSH authentication failed");
            Self::disconnect_quietly(&Arc::new(Mutex::new(handle)), tunnel_id).await;
            return Err(e);
        }

        let ssh: SshHandle = Arc::new(Mutex::new(handle));

        // Port 0 lets the OS pick a free local port
        let listener = match TcpListener::bind(("127.0.0.1", 0)).await {
            Ok(listener) => listener,
            Err(e) => {
                Self::disconnect_quietly(&ssh, tunnel_id).await;
                return Err(PocketError::tunnel_with_source(
                    TunnelStage::Forwarding,
                    "Failed to bind local port for SSH tunnel",
                    e,
                ));
            }
        };
        let local_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                Self::disconnect_quietly(&ssh, tunnel_id).await;
                return Err(PocketError::tunnel_with_source(
                    TunnelStage::Forwarding,
                    "Failed to read local tunnel port",
                    e,
                ));
            }
        };

        let cancel_token = CancellationToken::new();
        let accept_task = tokio::spawn(Self::run_listener(
            listener,
            ssh.clone(),
            spec.target_host.clone(),
            spec.target_port,
            tunnel_id,
            cancel_token.clone(),
        ));

        tracing::info!(tunnel_id = %tunnel_id, local_port, "SSH tunnel established");

        self.active = Some(ActiveTunnel { id: tunnel_id, local_port, ssh, cancel_token, accept_task });
        Ok(local_port)
    }

    async fn close(&mut self) {
        // State is cleared before teardown so is_active() holds whatever happens next
        let Some(active) = self.active.take() else {
            return;
        };

        tracing::info!(tunnel_id = %active.id, local_port = active.local_port, "Closing SSH tunnel");
        active.cancel_token.cancel();
        active.accept_task.abort();
        Self::disconnect_quietly(&active.ssh, active.id).await;
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }

    fn local_port(&self) -> Option<u16> {
        self.active.as_ref().map(|a| a.local_port)
    }
}

impl std::fmt::Debug for SecureTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTunnel")
            .field("connect_timeout", &self.connect_timeout)
            .field("local_port", &self.local_port())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn key_spec(path: &Path) -> TunnelSpec {
        TunnelSpec::new(
            "127.0.0.1",
            "ops",
            TunnelAuth::KeyFile { path: path.to_path_buf(), passphrase: None },
            "10.0.0.5",
            3306,
        )
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut tunnel = SecureTunnel::new(&SessionOptions::default());
        tunnel.close().await;
        tunnel.close().await;
        assert!(!tunnel.is_active());
        assert_eq!(tunnel.local_port(), None);
    }

    #[tokio::test]
    async fn test_missing_key_is_identity_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut tunnel = SecureTunnel::new(&SessionOptions::default());

        let err = tunnel.open(&key_spec(&dir.path().join("nope"))).await.unwrap_err();
        assert!(matches!(err, PocketError::Tunnel { stage: TunnelStage::IdentityLoad, .. }));
        assert!(!tunnel.is_active());
    }

    #[tokio::test]
    async fn test_garbage_key_is_identity_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_garbage");
        std::fs::File::create(&path).unwrap().write_all(b"not a key").unwrap();

        let mut tunnel = SecureTunnel::new(&SessionOptions::default());
        let err = tunnel.open(&key_spec(&path)).await.unwrap_err();
        assert!(matches!(err, PocketError::Tunnel { stage: TunnelStage::IdentityLoad, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_ssh_host_is_connect_error() {
        // Grab a free port and release it so nothing is listening there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let spec = TunnelSpec::new(
            "127.0.0.1",
            "ops",
            TunnelAuth::Password { password: "pw".into() },
            "10.0.0.5",
            3306,
        )
        .with_ssh_port(port);

        let mut tunnel = SecureTunnel::new(&SessionOptions::default());
        let err = tunnel.open(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            PocketError::Tunnel { stage: TunnelStage::Connect | TunnelStage::Timeout, .. }
        ));
        assert!(!tunnel.is_active());
    }

    #[tokio::test]
    async fn test_invalid_spec_rejected_before_io() {
        let mut tunnel = SecureTunnel::new(&SessionOptions::default());
        let spec = TunnelSpec::new("", "ops", TunnelAuth::Password { password: "x".into() }, "db", 3306);
        let err = tunnel.open(&spec).await.unwrap_err();
        assert!(matches!(err, PocketError::Validation { .. }));
    }
}
