//! ADS-B feeder daemon
//!
//! Sits between a local BEAST source and the central aggregator:
//! decodes frames, filters and de-duplicates them, signs every outgoing
//! datagram and keeps both the ingest and the egress side alive through
//! their supervisors. Runs single-threaded; every component is owned by
//! the event loop and nothing needs a lock.

mod clock;
mod config;
mod dedup;
mod forward;
mod platform;
mod privdrop;
mod serial;
mod source;
mod timers;
mod udp;

use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::signal::unix::{
    SignalKind,
    signal,
};
use tracing_subscriber::EnvFilter;

use crate::{
    config::Args,
    forward::Forwarder,
    platform::PlatformMonitor,
    source::{
        Disconnect,
        SourceSupervisor,
    },
    timers::Countdown,
    udp::{
        UDP_PORT,
        UdpSupervisor,
    },
};

/// Seconds until the first radio stats report, an early liveness ping.
const STATS_FIRST: u32 = 5;

/// Seconds until the first telemetry report.
const TELEMETRY_FIRST: u32 = 10;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;

    let args = Args::parse();

    let default_level = match args.debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    args.validate()?;
    privdrop::drop_privileges(&args.user, &args.group)?;

    if args.daemon {
        nix::unistd::daemon(false, false)?;
    }

    // single-threaded by design: every component is owned by the loop
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(Daemon::new(args).run())
}

struct Daemon {
    args: Args,
    source: SourceSupervisor,
    udp: UdpSupervisor,
    forwarder: Forwarder,
    platform: PlatformMonitor,
    stats_timer: Countdown,
    telemetry_timer: Countdown,
    restart: bool,
}

impl Daemon {
    fn new(args: Args) -> Self {
        let source = SourceSupervisor::new(&args);
        let udp = UdpSupervisor::new(args.aggregator.clone(), UDP_PORT, args.qos, args.rebind);
        let forwarder = Forwarder::new(&args);
        let stats_timer = Countdown::new(args.stats_interval, STATS_FIRST);
        let telemetry_timer = Countdown::new(args.telemetry_interval, TELEMETRY_FIRST);

        Self {
            args,
            source,
            udp,
            forwarder,
            platform: PlatformMonitor::new(),
            stats_timer,
            telemetry_timer,
            restart: false,
        }
    }

    async fn run(mut self) -> Result<()> {
        tracing::info!(
            key = %format_args!("{:#018X}", self.args.key),
            aggregator = %self.args.aggregator,
            "feeder starting"
        );

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let period = Duration::from_secs(1);
        let mut housekeeping = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        let eviction_period = Duration::from_millis(100);
        let mut eviction =
            tokio::time::interval_at(tokio::time::Instant::now() + eviction_period, eviction_period);

        let forward_period = Duration::from_millis(self.args.forward_interval);
        let mut forward =
            tokio::time::interval_at(tokio::time::Instant::now() + forward_period, forward_period);

        loop {
            tokio::select! {
                _ = housekeeping.tick() => {
                    self.house_keeping().await;
                }

                _ = eviction.tick() => {
                    let evicted = self.forwarder.evict_dedup();
                    if evicted > 0 {
                        tracing::trace!(evicted, "dedup eviction pass");
                    }
                }

                _ = forward.tick(), if self.args.multiframe => {
                    if let Some(datagram) = self.forwarder.flush_multiframe() {
                        self.udp.send(&datagram).await;
                    }
                }

                // resolves only while a source connection is up
                frame = self.source.next_frame() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Some(datagram) = self.forwarder.process(frame) {
                                self.udp.send(&datagram).await;
                            }
                        }
                        Some(Err(error)) => {
                            tracing::debug!(%error, "read error on source connection");
                            self.source.reset(Disconnect::Error);
                        }
                        None => {
                            tracing::debug!("source closed the connection");
                            self.source.reset(Disconnect::Eof);
                        }
                    }
                }

                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM, shutting down");
                    break;
                }

                _ = sigint.recv() => {
                    tracing::info!("SIGINT, shutting down");
                    break;
                }

                _ = sighup.recv() => {
                    tracing::info!("SIGHUP, resetting the aggregator session");
                    self.restart = true;
                }
            }
        }

        // supervisors close their descriptors on drop; nothing is
        // half-sent because datagrams go out whole
        Ok(())
    }

    /// The 1 Hz housekeeping tick.
    async fn house_keeping(&mut self) {
        // a second with no outbound traffic gets a heartbeat instead
        if self.forwarder.sent_this_second() == 0 {
            let datagram = self.forwarder.keepalive();
            self.udp.send(&datagram).await;
        }

        if self.restart {
            self.udp.reset();
            self.restart = false;
        }

        self.source.second().await;
        self.udp.second().await;

        let per_second = self.forwarder.end_second();
        if self.args.print_stats {
            println!(
                "Packets forwarded: {:3}   Not forwarded (dupes): {:3}  Bytes per second: {:5}",
                per_second.sent,
                per_second.dupes(),
                per_second.bytes,
            );
        }

        if self.stats_timer.tick() {
            let datagram = self.forwarder.radio_stats();
            self.udp.send(&datagram).await;
        }

        if self.telemetry_timer.tick() {
            let record = self.platform.collect(
                &self.source.health,
                self.args.mode.protocol_id(),
                forward::version_triple(),
            );
            let datagram = self.forwarder.telemetry_report(&record);
            self.udp.send(&datagram).await;
        }
    }
}
