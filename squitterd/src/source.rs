//! ADS-B source supervision
//!
//! Keeps one connection to the local decoder alive: TCP to
//! dump1090/readsb, or a serial receiver. The lifecycle is a small state
//! machine driven by the housekeeping tick: disconnected stations try to
//! connect, lost connections cool down for a few seconds and try again,
//! forever. Source trouble is never fatal, it just shows up in the
//! telemetry counters.

use std::{
    path::PathBuf,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
    time::Duration,
};

use futures_util::StreamExt;
use nix::sys::termios::BaudRate;
use squitter_beast::{
    Error,
    Frame,
    Reader,
};
use tokio::{
    io::{
        AsyncRead,
        ReadBuf,
    },
    net::TcpStream,
};

use crate::{
    config::{
        Args,
        IngestMode,
    },
    serial::SerialPort,
};

/// Seconds spent in retry-wait after a failed connect or a lost
/// connection.
const RETRY_SECS: u32 = 3;

/// Bound on a TCP connect attempt so a blackholed decoder address can't
/// stall the event loop.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Ingest health counters, reported in platform telemetry.
#[derive(Clone, Copy, Debug, Default)]
pub struct IngestHealth {
    pub connect_success: u32,
    pub connect_fail: u32,
    pub disconnect: u32,
    pub socket_error: u32,
    pub socket_reads: u32,
    pub bytes_read: u32,
    pub frames_good: u32,
    pub frames_bad: u32,
    pub packets_per_second: u16,
}

/// Why a connection was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer closed the stream.
    Eof,
    /// Read error on the descriptor.
    Error,
}

#[derive(Debug)]
enum SourceConfig {
    Tcp { host: String, port: u16 },
    Serial { device: PathBuf, baud: BaudRate },
}

#[derive(Debug)]
enum SourceState {
    Disconnected,
    Connected { reader: Reader<Connection> },
    RetryWait { seconds_left: u32 },
}

#[derive(Debug)]
pub struct SourceSupervisor {
    config: SourceConfig,
    state: SourceState,
    pub health: IngestHealth,
}

impl SourceSupervisor {
    pub fn new(args: &Args) -> Self {
        let config = match args.mode {
            IngestMode::BeastTcp => {
                SourceConfig::Tcp {
                    host: args.local.clone(),
                    port: args.port,
                }
            }
            IngestMode::BeastSerial => {
                SourceConfig::Serial {
                    device: args.serial_port.clone(),
                    baud: BaudRate::B3000000,
                }
            }
            IngestMode::GnsSerial => {
                SourceConfig::Serial {
                    device: args.serial_port.clone(),
                    baud: BaudRate::B921600,
                }
            }
        };

        Self {
            config,
            state: SourceState::Disconnected,
            health: IngestHealth::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SourceState::Connected { .. })
    }

    /// Next frame from the connected source. While no connection is up
    /// this never resolves, which keeps it inert in the event loop's
    /// select.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, Error>> {
        match &mut self.state {
            SourceState::Connected { reader } => reader.next().await,
            _ => std::future::pending().await,
        }
    }

    /// Tear the connection down and start the retry timer.
    pub fn reset(&mut self, reason: Disconnect) {
        match reason {
            Disconnect::Eof => self.health.disconnect += 1,
            Disconnect::Error => self.health.socket_error += 1,
        }

        self.drop_connection();
        tracing::debug!(?reason, "source connection reset, retrying shortly");
        self.state = SourceState::RetryWait {
            seconds_left: RETRY_SECS,
        };
    }

    /// Housekeeping tick: reconnect, count down retries, roll the
    /// per-second counters into the health totals.
    pub async fn second(&mut self) {
        match &mut self.state {
            SourceState::Disconnected => {
                match self.config.connect().await {
                    Ok(connection) => {
                        tracing::debug!("connected to source");
                        self.health.connect_success += 1;
                        self.state = SourceState::Connected {
                            reader: Reader::new(connection),
                        };
                    }
                    Err(error) => {
                        tracing::debug!(%error, "connect to source failed");
                        self.health.connect_fail += 1;
                        self.state = SourceState::RetryWait {
                            seconds_left: RETRY_SECS,
                        };
                    }
                }
            }
            SourceState::Connected { reader } => {
                let counters = reader.counters_mut().take();
                self.health.socket_reads += counters.socket_reads as u32;
                self.health.bytes_read += counters.bytes_read as u32;
                self.health.frames_good += counters.frames_good as u32;
                self.health.frames_bad += counters.frames_bad as u32;
                self.health.packets_per_second = counters.frames_good.min(u16::MAX.into()) as u16;
            }
            SourceState::RetryWait { seconds_left } => {
                *seconds_left -= 1;
                if *seconds_left == 0 {
                    self.state = SourceState::Disconnected;
                }
            }
        }

        if !self.is_connected() {
            self.health.packets_per_second = 0;
        }
    }

    fn drop_connection(&mut self) {
        if let SourceState::Connected { reader } = &mut self.state {
            // keep whatever the reader counted before it goes away
            let counters = reader.counters_mut().take();
            self.health.socket_reads += counters.socket_reads as u32;
            self.health.bytes_read += counters.bytes_read as u32;
            self.health.frames_good += counters.frames_good as u32;
            self.health.frames_bad += counters.frames_bad as u32;
        }
    }
}

impl SourceConfig {
    async fn connect(&self) -> std::io::Result<Connection> {
        match self {
            Self::Tcp { host, port } => {
                let connect = TcpStream::connect((host.as_str(), *port));
                let stream = tokio::time::timeout(CONNECT_TIMEOUT, connect)
                    .await
                    .map_err(|_| {
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                    })??;
                Ok(Connection::Tcp(stream))
            }
            Self::Serial { device, baud } => {
                Ok(Connection::Serial(SerialPort::open(device, *baud)?))
            }
        }
    }
}

#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Serial(SerialPort),
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Connection::Serial(port) => Pin::new(port).poll_read(cx, buf),
        }
    }
}
