use async_trait::async_trait;
use log::{debug, info, warn};
use ssh2::{ExtendedData, Session};
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::traits::{CommandOutput, Shell};
use crate::config::Target;
use crate::error::{HavocError, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Holds at most one open connection and counts how many were ever opened.
struct SessionSlot<S> {
    slot: Mutex<Option<S>>,
    opened: AtomicUsize,
}

impl<S: Clone + Send + 'static> SessionSlot<S> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            opened: AtomicUsize::new(0),
        }
    }

    /// The held connection, or a fresh one from `open` when the slot is empty.
    ///
    /// The lock is held across `open`, so concurrent callers share one connection.
    async fn get_or_open<F>(&self, host: &str, open: F) -> Result<S>
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let mut guard = self.slot.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = tokio::task::spawn_blocking(open)
            .await
            .map_err(|e| HavocError::Connection {
                host: host.to_string(),
                reason: e.to_string(),
            })??;
        self.opened.fetch_add(1, Ordering::SeqCst);
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn take(&self) -> Option<S> {
        self.slot.lock().await.take()
    }

    async fn is_some(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

/// One password-authenticated SSH channel to a [`Target`].
///
/// The connection is opened on the first command (or by [`SshSession::connect`])
/// and reused for every later command until [`SshSession::disconnect`].
pub struct SshSession {
    target: Target,
    port: u16,
    session: SessionSlot<Session>,
}

impl SshSession {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            port: DEFAULT_SSH_PORT,
            session: SessionSlot::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub async fn is_connected(&self) -> bool {
        self.session.is_some().await
    }

    /// Connections successfully opened over this session's lifetime.
    pub fn connections_opened(&self) -> usize {
        self.session.opened()
    }

    /// Opens the session now instead of on first use. No-op when already open.
    pub async fn connect(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// Drops the connection; the next command reconnects.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.take().await {
            info!("SSH: closing session to {}", self.target.host());
            let _ = tokio::task::spawn_blocking(move || {
                let _ = session.disconnect(None, "havoc session closed", None);
            })
            .await;
        }
    }

    async fn session(&self) -> Result<Session> {
        let target = self.target.clone();
        let port = self.port;
        let before = self.session.opened();
        let session = self
            .session
            .get_or_open(self.target.host(), move || open(&target, port))
            .await?;

        if self.session.opened() > before {
            info!(
                "SSH: connected to {}@{}:{}",
                self.target.username(),
                self.target.host(),
                port
            );
        }
        Ok(session)
    }
}

fn connection_error(target: &Target, reason: impl ToString) -> HavocError {
    HavocError::Connection {
        host: target.host().to_string(),
        reason: reason.to_string(),
    }
}

fn resolve(target: &Target, port: u16) -> Result<SocketAddr> {
    (target.host(), port)
        .to_socket_addrs()
        .map_err(|e| connection_error(target, e))?
        .next()
        .ok_or_else(|| connection_error(target, "host did not resolve"))
}

fn open(target: &Target, port: u16) -> Result<Session> {
    let addr = resolve(target, port)?;
    let tcp = TcpStream::connect_timeout(&addr, target.timeout())
        .map_err(|e| connection_error(target, e))?;

    let mut session = Session::new().map_err(|e| connection_error(target, e))?;
    session.set_tcp_stream(tcp);
    // Applies to the handshake and to every later blocking call.
    session.set_timeout(u32::try_from(target.timeout().as_millis()).unwrap_or(u32::MAX));
    session.handshake().map_err(|e| connection_error(target, e))?;
    session
        .userauth_password(target.username(), target.password())
        .map_err(|e| connection_error(target, e))?;
    if !session.authenticated() {
        return Err(connection_error(target, "authentication rejected"));
    }
    Ok(session)
}

fn exec(session: &Session, command: &str) -> Result<CommandOutput> {
    let mut channel = session
        .channel_session()
        .map_err(|e| HavocError::remote(command, e))?;
    // Unread stderr would fill the channel window and stall stdout.
    channel
        .handle_extended_data(ExtendedData::Ignore)
        .map_err(|e| HavocError::remote(command, e))?;
    channel.exec(command).map_err(|e| HavocError::remote(command, e))?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| HavocError::remote(command, e))?;

    // The exit status is advisory; failing to read it must not fail the command.
    let exit_code = match channel.wait_close().and_then(|_| channel.exit_status()) {
        Ok(code) => Some(code),
        Err(e) => {
            warn!("SSH: could not read exit status of `{}`: {}", command, e);
            None
        }
    };
    Ok(CommandOutput::new(stdout, exit_code))
}

#[async_trait]
impl Shell for SshSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let session = self.session().await?;
        debug!("SSH [{}]: {}", self.target.host(), command);

        let owned = command.to_string();
        tokio::task::spawn_blocking(move || exec(&session, &owned))
            .await
            .map_err(|e| HavocError::remote(command, e))?
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.target.username(), self.target.host())
    }

    async fn close(&self) {
        self.disconnect().await;
    }
}
