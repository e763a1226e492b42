use crate::error::channel::ChannelError;
use crate::notify::Notifier;

use common::ErrorLocation;

use std::future::Future;
use std::io::Result as IoResult;
use std::panic::Location;
use std::time::Duration;

use log::trace;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const REQUEST_TERMINATOR: &str = "\n";
const RESPONSE_TERMINATOR: &[u8] = b"\r\n";
const DATA_TERMINATOR: &str = ".";

/// How a single reply line continues the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyLine {
    /// `NNN-text`: more lines follow.
    Mid,
    /// `NNN+text`: a dot-terminated data block follows.
    Data,
    /// `NNN text`: last line of the reply.
    End,
    /// Anything without a status code; treated as the end of the reply.
    Malformed,
}

pub(crate) fn classify_reply_line(line: &str) -> ReplyLine {
    let bytes = line.as_bytes();

    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return ReplyLine::Malformed;
    }

    match bytes.get(3) {
        None | Some(b' ') => ReplyLine::End,
        Some(b'-') => ReplyLine::Mid,
        Some(b'+') => ReplyLine::Data,
        Some(_) => ReplyLine::Malformed,
    }
}

async fn timed<T>(
    io_timeout: Duration,
    operation: &str,
    future: impl Future<Output = IoResult<T>>,
) -> Result<T, ChannelError> {
    match timeout(io_timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ChannelError::Io {
            message: format!("Control channel {operation} failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
            source: e,
        }),
        Err(_) => Err(ChannelError::Timeout {
            message: format!("Control channel {operation} timed out after {io_timeout:?}"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

/// Line-oriented connection to the daemon's control port.
///
/// Requests are terminated with `\n`; responses are read up to `\r\n`.
/// Every write and read is bounded by the channel's I/O timeout.
pub struct ControlChannel<S = TcpStream> {
    stream: BufReader<S>,
    io_timeout: Duration,
    notifier: Notifier,
}

impl ControlChannel<TcpStream> {
    /// Open a TCP connection to `host:port`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Connect`] if the connection is refused or unreachable
    /// - [`ChannelError::Timeout`] if no connection is established within `io_timeout`
    pub async fn connect(
        host: &str,
        port: u16,
        io_timeout: Duration,
        notifier: Notifier,
    ) -> Result<Self, ChannelError> {
        let address = format!("{host}:{port}");
        trace!("Opening control connection to {address}");

        let stream = match timeout(io_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ChannelError::Connect {
                    message: format!("Failed to connect to {address}: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                    source: e,
                });
            }
            Err(_) => {
                return Err(ChannelError::Timeout {
                    message: format!("Connecting to {address} timed out after {io_timeout:?}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        Ok(Self::new(stream, io_timeout, notifier))
    }
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open stream.
    pub fn new(stream: S, io_timeout: Duration, notifier: Notifier) -> Self {
        Self {
            stream: BufReader::new(stream),
            io_timeout,
            notifier,
        }
    }

    /// Send one request line. The terminator is appended here; no retry.
    pub async fn send(&mut self, line: &str) -> Result<(), ChannelError> {
        let request = format!("{line}{REQUEST_TERMINATOR}");
        let io_timeout = self.io_timeout;
        let writer = self.stream.get_mut();

        timed(io_timeout, "write", async {
            writer.write_all(request.as_bytes()).await?;
            writer.flush().await
        })
        .await
    }

    /// Best-effort single read.
    ///
    /// Returns the bytes up to and including the first `\r\n`, or everything
    /// received before end-of-stream, whichever comes first. This does not
    /// assemble multi-line replies; use [`read_reply`](Self::read_reply) for that.
    pub async fn read_response(&mut self) -> Result<String, ChannelError> {
        let line = self.read_line().await?;
        self.report_read(&line);
        Ok(line)
    }

    /// Read one complete reply.
    ///
    /// Consumes `NNN-` mid lines and `NNN+` data blocks (terminated by a lone
    /// `.` line) until the `NNN ` end line. A line without a status code, or
    /// end-of-stream, also ends the reply. The raw text is returned verbatim.
    pub async fn read_reply(&mut self) -> Result<String, ChannelError> {
        let mut reply = String::new();
        let mut in_data_block = false;

        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                break;
            }

            reply.push_str(&line);
            let content = line.trim_end_matches(['\r', '\n']);

            if in_data_block {
                if content == DATA_TERMINATOR {
                    in_data_block = false;
                }
                continue;
            }

            match classify_reply_line(content) {
                ReplyLine::Mid => {}
                ReplyLine::Data => in_data_block = true,
                ReplyLine::End | ReplyLine::Malformed => break,
            }
        }

        self.report_read(&reply);
        Ok(reply)
    }

    /// Shut down the write half; the peer sees end-of-stream.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        let io_timeout = self.io_timeout;
        let writer = self.stream.get_mut();
        timed(io_timeout, "shutdown", writer.shutdown()).await
    }

    async fn read_line(&mut self) -> Result<String, ChannelError> {
        let io_timeout = self.io_timeout;
        let mut buffer = Vec::new();

        loop {
            let read = timed(io_timeout, "read", self.stream.read_until(b'\n', &mut buffer)).await?;

            if read == 0 || buffer.ends_with(RESPONSE_TERMINATOR) {
                break;
            }
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn report_read(&self, text: &str) {
        self.notifier
            .info(format!("Read {} bytes: {}", text.len(), text.trim()));
    }
}
