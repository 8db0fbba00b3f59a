//! Request/reply channel to brewd.
//!
//! A [`CommandChannel`] owns at most one live connection and carries one
//! exchange at a time. Any send failure or reply timeout tears the connection
//! down and opens a fresh one before the error is returned; the failed request
//! is never resent. An exchange whose caller gives up midway closes its
//! connection, and the next exchange connects anew.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::protocol::{CommandEnvelope, ResponseEnvelope};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::Mutex,
    time::timeout,
};
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub addr: String,
    pub timeout: Duration,
    /// When false, sockets are closed with a zero linger so unsent data is
    /// discarded instead of holding the close.
    pub linger: bool,
}

impl ChannelConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            linger: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to brewd: {0}")]
    Connect(#[source] io::Error),
    #[error("error while sending message: {0}")]
    Send(#[source] io::Error),
    #[error("error while receiving reply: {0}")]
    Recv(#[source] io::Error),
    #[error("brewd did not answer within {0:?}")]
    Timeout(Duration),
    #[error("cannot encode command: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot parse brewd reply: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ChannelError {
    /// A reply arrived but was not a response envelope. The connection is
    /// still aligned and was kept.
    pub fn is_malformed_reply(&self) -> bool {
        matches!(self, ChannelError::Decode(_))
    }
}

/// Opens connections to the backend.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> io::Result<Box<dyn Link>>;
}

/// One connection, framed as newline-terminated JSON documents.
#[async_trait]
pub trait Link: Send {
    async fn send_line(&mut self, line: &[u8]) -> io::Result<()>;
    async fn recv_line(&mut self) -> io::Result<String>;
}

pub struct TcpConnector {
    addr: String,
    linger: bool,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, linger: bool) -> Self {
        Self {
            addr: addr.into(),
            linger,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<Box<dyn Link>> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        if !self.linger {
            #[allow(deprecated)]
            stream.set_linger(Some(Duration::ZERO))?;
        }
        let (reader, writer) = stream.into_split();
        Ok(Box::new(TcpLink {
            reader: BufReader::new(reader),
            writer,
        }))
    }
}

struct TcpLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[async_trait]
impl Link for TcpLink {
    async fn send_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.writer.write_all(line).await?;
        self.writer.flush().await
    }

    async fn recv_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "brewd closed the connection",
            ));
        }
        Ok(line)
    }
}

pub struct CommandChannel {
    connector: Box<dyn Connector>,
    link: Option<Box<dyn Link>>,
    timeout: Duration,
    reconnects: u64,
}

impl CommandChannel {
    /// The first connection is opened lazily by the first exchange.
    pub fn new(connector: impl Connector + 'static, timeout: Duration) -> Self {
        Self {
            connector: Box::new(connector),
            link: None,
            timeout,
            reconnects: 0,
        }
    }

    pub fn tcp(config: &ChannelConfig) -> Self {
        Self::new(
            TcpConnector::new(config.addr.clone(), config.linger),
            config.timeout,
        )
    }

    /// Number of times a failed exchange forced the connection to be rebuilt.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub async fn send(
        &mut self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope, ChannelError> {
        let mut frame = serde_json::to_vec(envelope).map_err(ChannelError::Encode)?;
        frame.push(b'\n');

        // Held outside `self` until a full reply line is read; an abandoned
        // exchange drops the connection along with its unread reply.
        let mut link = match self.link.take() {
            Some(link) => link,
            None => open_link(self.connector.as_ref(), self.timeout).await?,
        };

        debug!(command = %envelope.command, "brewd exchange");
        let line = match exchange(link.as_mut(), &frame, self.timeout).await {
            Ok(line) => line,
            Err(err) => {
                drop(link);
                self.rebuild(&err).await;
                return Err(err);
            }
        };
        self.link = Some(link);

        serde_json::from_str(line.trim_end()).map_err(ChannelError::Decode)
    }

    async fn rebuild(&mut self, cause: &ChannelError) {
        // A stale reply may still arrive on the old connection, so it is
        // never reused.
        self.link = None;
        self.reconnects += 1;
        warn!(%cause, "brewd exchange failed; rebuilding connection");
        match open_link(self.connector.as_ref(), self.timeout).await {
            Ok(link) => self.link = Some(link),
            Err(err) => warn!(%err, "brewd reconnect failed; will retry on next exchange"),
        }
    }
}

async fn exchange(
    link: &mut dyn Link,
    frame: &[u8],
    limit: Duration,
) -> Result<String, ChannelError> {
    timeout(limit, link.send_line(frame))
        .await
        .map_err(|_| ChannelError::Timeout(limit))?
        .map_err(ChannelError::Send)?;

    timeout(limit, link.recv_line())
        .await
        .map_err(|_| ChannelError::Timeout(limit))?
        .map_err(ChannelError::Recv)
}

async fn open_link(
    connector: &dyn Connector,
    limit: Duration,
) -> Result<Box<dyn Link>, ChannelError> {
    match timeout(limit, connector.connect()).await {
        Ok(Ok(link)) => Ok(link),
        Ok(Err(err)) => Err(ChannelError::Connect(err)),
        Err(_) => Err(ChannelError::Connect(io::Error::new(
            io::ErrorKind::TimedOut,
            "connect timed out",
        ))),
    }
}

/// A channel shared by concurrent callers. Exchanges are serialized, so at
/// most one request is ever outstanding against brewd.
#[derive(Clone)]
pub struct SharedChannel {
    inner: Arc<Mutex<CommandChannel>>,
}

impl SharedChannel {
    pub fn new(channel: CommandChannel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(channel)),
        }
    }

    pub fn tcp(config: &ChannelConfig) -> Self {
        Self::new(CommandChannel::tcp(config))
    }

    pub async fn exchange(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope, ChannelError> {
        let mut channel = self.inner.lock().await;
        channel.send(envelope).await
    }

    pub async fn reconnects(&self) -> u64 {
        self.inner.lock().await.reconnects()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
