//! Line transport to the TIC500
//!
//! The instrument speaks one ASCII command per line over a raw TCP socket
//! (telnet port 23) and answers each command with at most one line. The
//! transport frames outgoing commands with `\n` and reads a reply with a
//! bounded timeout so a command the instrument does not answer never hangs
//! the driver.
//!
//! [`Transport`] is the seam between the protocol core and the socket:
//! [`SocketTransport`] is the real link, [`crate::mock::SimulatedTic500`]
//! emulates the instrument.

use async_trait::async_trait;
use futures::FutureExt;
use std::time::Duration;
use tic_core::{TicError, TicResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default TCP port of the TIC500 (telnet)
pub const DEFAULT_PORT: u16 = 23;

/// Default reply timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Connection establishment timeout in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Maximum number of bytes read for one reply
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Line terminator appended to every command
pub const LINE_TERMINATOR: &str = "\n";

/// Line-oriented link to the instrument.
///
/// Implementations do not serialize request/reply pairs themselves; callers
/// hold their own lock across a `send_line` / `receive_line` pair.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `line` followed by the line terminator.
    async fn send_line(&self, line: &str) -> TicResult<()>;

    /// Read one reply, with trailing whitespace stripped.
    ///
    /// Fails with [`TicError::Timeout`] if nothing arrives within the bound.
    async fn receive_line(&self) -> TicResult<String>;

    /// Discard every reply that has already arrived without waiting for more.
    ///
    /// Returns the discarded text, empty if there was none. Called before each
    /// command so a late or unsolicited reply is never paired with it.
    async fn drain(&self) -> TicResult<String>;

    /// Release the link. Idempotent.
    async fn close(&self) -> TicResult<()>;
}

/// Byte stream the socket transport runs over.
pub trait StreamIO: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamIO for T {}

type DynStream = Box<dyn StreamIO>;

/// TCP transport to a TIC500.
pub struct SocketTransport {
    stream: Mutex<Option<DynStream>>,
    timeout: Duration,
    peer: String,
}

impl SocketTransport {
    /// Connect to the instrument with the default reply timeout.
    ///
    /// # Arguments
    /// * `host` - Hostname or IP address
    /// * `port` - TCP port (typically 23)
    pub async fn connect(host: &str, port: u16) -> TicResult<Self> {
        Self::connect_with_timeout(host, port, Duration::from_millis(DEFAULT_TIMEOUT_MS)).await
    }

    /// Connect to the instrument with an explicit reply timeout.
    ///
    /// # Returns
    /// * `Ok(SocketTransport)` on successful connection
    /// * `Err(TicError::Connection)` if the host is unreachable or refuses
    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        reply_timeout: Duration,
    ) -> TicResult<Self> {
        let peer = format!("{}:{}", host, port);

        let stream = timeout(
            Duration::from_millis(CONNECT_TIMEOUT_MS),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| TicError::Connection(format!("Connection timeout to {}", peer)))?
        .map_err(|e| TicError::Connection(format!("Failed to connect to {}: {}", peer, e)))?;

        // Disable Nagle's algorithm, commands are tiny and latency-bound
        stream
            .set_nodelay(true)
            .map_err(|e| TicError::Connection(format!("Failed to configure {}: {}", peer, e)))?;

        tracing::info!("Connected to TIC500 at {}", peer);

        Ok(Self::from_stream(stream, reply_timeout, peer))
    }

    /// Wrap an already open byte stream.
    pub fn from_stream(
        stream: impl StreamIO + 'static,
        reply_timeout: Duration,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            stream: Mutex::new(Some(Box::new(stream))),
            timeout: reply_timeout,
            peer: peer.into(),
        }
    }

    /// Reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Peer description (`host:port`).
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn send_line(&self, line: &str) -> TicResult<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TicError::NotConnected)?;

        tracing::debug!(peer = %self.peer, "TIC500 send: {:?}", line);

        let framed = format!("{}{}", line, LINE_TERMINATOR);
        stream.write_all(framed.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive_line(&self) -> TicResult<String> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TicError::NotConnected)?;

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match timeout(self.timeout, stream.read(&mut buf)).await {
            Ok(Ok(0)) => Err(TicError::Connection(format!(
                "Connection closed by {}",
                self.peer
            ))),
            Ok(Ok(n)) => {
                let reply = String::from_utf8_lossy(&buf[..n]).trim_end().to_string();
                tracing::debug!(peer = %self.peer, "TIC500 reply: {:?}", reply);
                Ok(reply)
            }
            Ok(Err(e)) => Err(TicError::Io(e)),
            Err(_) => Err(TicError::Timeout(self.timeout)),
        }
    }

    async fn drain(&self) -> TicResult<String> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TicError::NotConnected)?;

        let mut stale = Vec::new();
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        // Only reads that complete on the first poll
        while let Some(read) = stream.read(&mut buf).now_or_never() {
            match read? {
                0 => {
                    return Err(TicError::Connection(format!(
                        "Connection closed by {}",
                        self.peer
                    )))
                }
                n => stale.extend_from_slice(&buf[..n]),
            }
        }
        Ok(String::from_utf8_lossy(&stale).trim_end().to_string())
    }

    async fn close(&self) -> TicResult<()> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(peer = %self.peer, "Ignoring error on socket shutdown: {}", e);
            }
            tracing::info!("Disconnected from TIC500 at {}", self.peer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    fn short() -> Duration {
        Duration::from_millis(50)
    }

    #[tokio::test]
    async fn send_line_appends_terminator() {
        let (mut instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, short(), "test");

        transport.send_line("Out1.Value?").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = instrument.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Out1.Value?\n");
    }

    #[tokio::test]
    async fn receive_line_strips_trailing_whitespace() {
        let (mut instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, short(), "test");

        instrument.write_all(b"23.40000\r\n").await.unwrap();
        assert_eq!(transport.receive_line().await.unwrap(), "23.40000");
    }

    #[tokio::test]
    async fn receive_line_times_out_without_data() {
        let (_instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, short(), "test");

        let start = tokio::time::Instant::now();
        let err = transport.receive_line().await.unwrap_err();
        assert!(matches!(err, TicError::Timeout(d) if d == short()));
        assert!(start.elapsed() >= short());
    }

    #[tokio::test]
    async fn receive_line_reports_closed_peer() {
        let (instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, short(), "test");
        drop(instrument);

        let err = transport.receive_line().await.unwrap_err();
        assert!(matches!(err, TicError::Connection(_)));
    }

    #[tokio::test]
    async fn drain_discards_buffered_replies_without_waiting() {
        let (mut instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, Duration::from_secs(5), "test");

        assert_eq!(transport.drain().await.unwrap(), "");

        instrument.write_all(b"pid.P = 2\r\n").await.unwrap();
        instrument.write_all(b"pid.I = 0.5\r\n").await.unwrap();
        let start = tokio::time::Instant::now();
        assert_eq!(
            transport.drain().await.unwrap(),
            "pid.P = 2\r\npid.I = 0.5"
        );
        assert!(start.elapsed() < Duration::from_secs(1));

        instrument.write_all(b"pid.Setpoint = 77.000\n").await.unwrap();
        assert_eq!(
            transport.receive_line().await.unwrap(),
            "pid.Setpoint = 77.000"
        );
    }

    #[tokio::test]
    async fn drain_reports_closed_peer() {
        let (instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, short(), "test");
        drop(instrument);

        assert!(matches!(
            transport.drain().await,
            Err(TicError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_disconnects() {
        let (_instrument, driver_side) = duplex(256);
        let transport = SocketTransport::from_stream(driver_side, short(), "test");

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(matches!(
            transport.send_line("description?").await,
            Err(TicError::NotConnected)
        ));
        assert!(matches!(
            transport.receive_line().await,
            Err(TicError::NotConnected)
        ));
        assert!(matches!(transport.drain().await, Err(TicError::NotConnected)));
    }

    #[tokio::test]
    async fn connect_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"description?\n");
            socket.write_all(b"TIC500 temperature controller\n").await.unwrap();
        });

        let transport = SocketTransport::connect("127.0.0.1", port).await.unwrap();
        assert_eq!(transport.peer(), format!("127.0.0.1:{}", port));
        assert_eq!(transport.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));

        transport.send_line("description?").await.unwrap();
        assert_eq!(
            transport.receive_line().await.unwrap(),
            "TIC500 temperature controller"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused_is_connection_error() {
        // Grab a free port, then release it so nothing listens there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = SocketTransport::connect("127.0.0.1", port)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TicError::Connection(_)));
    }
}
