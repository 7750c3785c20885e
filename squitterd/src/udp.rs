//! Outbound UDP supervision
//!
//! Manages the datagram session towards the aggregator with its own
//! state machine so DNS trouble and socket errors recover by themselves.
//! The socket is connected to the resolved address once, so sends carry
//! no per-call destination. An optional rebind interval periodically
//! tears the socket down to force a fresh source port, which keeps
//! CG-NAT mappings from going stale in one direction.

use std::net::SocketAddr;

use socket2::{
    Domain,
    Socket,
    Type,
};
use tokio::net::UdpSocket;

/// Aggregator port.
pub const UDP_PORT: u16 = 5997;

/// Seconds spent in retry-wait after a failure.
const RETRY_SECS: u32 = 3;

#[derive(Debug)]
enum UdpState {
    Idle,
    WaitLookup,
    WaitConnect { addr: SocketAddr },
    Connected { socket: UdpSocket, rebind_left: u32 },
    RetryWait { seconds_left: u32 },
}

#[derive(Debug)]
pub struct UdpSupervisor {
    hostname: String,
    port: u16,
    qos: u8,
    rebind_interval: u32,
    state: UdpState,
}

impl UdpSupervisor {
    pub fn new(hostname: String, port: u16, qos: u8, rebind_interval: u32) -> Self {
        Self {
            hostname,
            port,
            qos,
            rebind_interval,
            state: UdpState::Idle,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, UdpState::Connected { .. })
    }

    /// Hand one datagram to the socket. Not connected yet means the
    /// datagram is dropped; datagram transport makes no promises anyway.
    /// A send failure resets the session.
    pub async fn send(&mut self, datagram: &[u8]) -> bool {
        let UdpState::Connected { socket, .. } = &self.state else {
            return false;
        };

        match socket.send(datagram).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "udp send failed, resetting session");
                self.reset();
                false
            }
        }
    }

    /// Force the session down and up again (SIGHUP, or a send failure).
    pub fn reset(&mut self) {
        self.state = UdpState::RetryWait {
            seconds_left: RETRY_SECS,
        };
    }

    /// Housekeeping tick: walk the state machine one step.
    pub async fn second(&mut self) {
        match &mut self.state {
            UdpState::Idle => {
                self.state = UdpState::WaitLookup;
            }
            UdpState::WaitLookup => {
                match self.lookup().await {
                    Ok(addr) => {
                        tracing::debug!(%addr, "aggregator resolved");
                        self.state = UdpState::WaitConnect { addr };
                    }
                    Err(error) => {
                        tracing::debug!(%error, "aggregator lookup failed");
                        self.reset();
                    }
                }
            }
            UdpState::WaitConnect { addr } => {
                let addr = *addr;
                match self.make_socket(addr) {
                    Ok(socket) => {
                        self.state = UdpState::Connected {
                            socket,
                            rebind_left: self.rebind_interval,
                        };
                    }
                    Err(error) => {
                        tracing::debug!(%error, "udp socket setup failed");
                        self.reset();
                    }
                }
            }
            UdpState::Connected { rebind_left, .. } => {
                if self.rebind_interval > 0 {
                    *rebind_left -= 1;
                    if *rebind_left == 0 {
                        tracing::debug!("rebinding udp source port");
                        self.state = UdpState::Idle;
                    }
                }
            }
            UdpState::RetryWait { seconds_left } => {
                *seconds_left -= 1;
                if *seconds_left == 0 {
                    self.state = UdpState::Idle;
                }
            }
        }
    }

    async fn lookup(&self) -> std::io::Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.hostname.as_str(), self.port)).await?;
        addrs.find(SocketAddr::is_ipv4).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "hostname resolved to no IPv4 address",
            )
        })
    }

    fn make_socket(&self, addr: SocketAddr) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;

        if self.qos > 0 {
            // DSCP sits in the top six bits of the ToS byte
            socket.set_tos(u32::from(self.qos) << 2)?;
        }

        socket.set_nonblocking(true)?;
        socket.connect(&addr.into())?;
        UdpSocket::from_std(socket.into())
    }
}
