use std::path::PathBuf;

use clap::{
    ArgAction,
    Parser,
    ValueEnum,
};
use color_eyre::eyre::{
    Error,
    bail,
};

/// Longest accepted pass-phrase.
const PSK_LEN: usize = 64;

/// Feed decoded ADS-B messages to a central aggregator.
///
/// Connects to a local BEAST source (dump1090/readsb over TCP, or a
/// Mode-S Beast / GNS receiver over serial), de-duplicates messages and
/// forwards them over UDP, signed with the station pass-phrase.
#[derive(Debug, Parser)]
#[command(name = "squitterd", version)]
pub struct Args {
    /// Sharing key identifying this station (64-bit hex, e.g.
    /// 0x79441BC23EDA3F17).
    #[arg(short = 'k', long, env = "SQUITTER_KEY", value_parser = parse_key)]
    pub key: u64,

    /// Pre-shared pass-phrase for message authentication.
    #[arg(short = 'p', long, env = "SQUITTER_PSK", default_value = "secret")]
    pub psk: String,

    /// Hostname of the central aggregator.
    #[arg(short = 'H', long, default_value = "adsb-in.1090mhz.uk")]
    pub aggregator: String,

    /// How the ADS-B source is attached.
    #[arg(long, value_enum, default_value_t = IngestMode::BeastTcp)]
    pub mode: IngestMode,

    /// Address of the local dump1090/readsb server.
    #[arg(short = 'l', long, default_value = "127.0.0.1")]
    pub local: String,

    /// TCP port of the BEAST output.
    #[arg(short = 'P', long, default_value_t = 30005)]
    pub port: u16,

    /// Serial device for receivers attached over USB.
    #[arg(short = 'S', long, default_value = "/dev/ttyUSB0")]
    pub serial_port: PathBuf,

    /// Also forward Mode-A/C messages (not recommended).
    #[arg(short = 'c', long)]
    pub mode_ac: bool,

    /// Also forward Mode-S short messages (not recommended).
    #[arg(short = 'y', long)]
    pub mode_s_short: bool,

    /// Forward every extended squitter, not just DF 17-22.
    #[arg(short = 'e', long)]
    pub everything: bool,

    /// Collect extended squitters into multiframe datagrams (more
    /// efficient but adds latency).
    #[arg(short = 'm', long)]
    pub multiframe: bool,

    /// Multiframe forwarding interval in milliseconds.
    #[arg(
        short = 'i',
        long,
        default_value_t = 50,
        value_parser = clap::value_parser!(u64).range(10..=250)
    )]
    pub forward_interval: u64,

    /// Radio stats reporting interval in seconds, 0 disables.
    #[arg(short = 's', long, default_value_t = 900)]
    pub stats_interval: u32,

    /// Platform telemetry reporting interval in seconds, 0 disables.
    #[arg(short = 't', long, default_value_t = 900)]
    pub telemetry_interval: u32,

    /// DiffServ/DSCP code point for outgoing datagrams.
    #[arg(
        short = 'q',
        long,
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=63)
    )]
    pub qos: u8,

    /// Seconds before the UDP source port is re-bound, 0 disables
    /// (work-around for CG-NAT mappings that expire).
    #[arg(
        short = 'n',
        long,
        default_value_t = 0,
        value_parser = clap::value_parser!(u32).range(0..=3600)
    )]
    pub rebind: u32,

    /// User to run as when started as root.
    #[arg(short = 'u', long, default_value = "nobody")]
    pub user: String,

    /// Group to run as when started as root.
    #[arg(short = 'g', long, default_value = "nogroup")]
    pub group: String,

    /// Detach from the controlling terminal (SysV init; systemd does not
    /// need this).
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Print forwarding stats once per second (foreground only).
    #[arg(short = 'f', long)]
    pub print_stats: bool,

    /// Increase debug verbosity (-x, -xx).
    #[arg(short = 'x', long = "debug", action = ArgAction::Count)]
    pub debug: u8,
}

impl Args {
    pub fn validate(&self) -> Result<(), Error> {
        if self.key == 0 {
            bail!("the sharing key must be non-zero");
        }
        if self.psk.len() > PSK_LEN {
            bail!("pass-phrase too long (max {PSK_LEN} bytes)");
        }
        if self.daemon && self.debug > 0 {
            bail!("cannot run with debug output in the background");
        }
        if self.daemon && self.print_stats {
            bail!("cannot print stats in the background");
        }
        Ok(())
    }
}

/// How the ADS-B source is attached, and at which speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IngestMode {
    /// BEAST over TCP from dump1090/readsb.
    BeastTcp,
    /// Mode-S Beast over USB/serial at 3 Mbps.
    BeastSerial,
    /// GNS 5892/5894T (HULC) over USB/serial at 921.6 kbps.
    GnsSerial,
}

impl IngestMode {
    /// Protocol id reported in telemetry.
    pub fn protocol_id(&self) -> u8 {
        match self {
            Self::BeastTcp => 1,
            Self::BeastSerial => 2,
            Self::GnsSerial => 3,
        }
    }
}

fn parse_key(value: &str) -> Result<u64, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|error| format!("not a 64-bit hex key: {error}"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::config::{
        Args,
        IngestMode,
    };

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from([&["squitterd"], args].concat())
    }

    #[test]
    fn it_parses_keys_with_and_without_prefix() {
        let args = parse(&["-k", "0x79441BC23EDA3F17"]).unwrap();
        assert_eq!(args.key, 0x79441bc23eda3f17);

        let args = parse(&["-k", "79441BC23EDA3F17"]).unwrap();
        assert_eq!(args.key, 0x79441bc23eda3f17);

        assert!(parse(&["-k", "not-hex"]).is_err());
    }

    #[test]
    fn it_applies_defaults() {
        let args = parse(&["-k", "1"]).unwrap();
        assert_eq!(args.psk, "secret");
        assert_eq!(args.aggregator, "adsb-in.1090mhz.uk");
        assert_eq!(args.local, "127.0.0.1");
        assert_eq!(args.port, 30005);
        assert_eq!(args.mode, IngestMode::BeastTcp);
        assert_eq!(args.forward_interval, 50);
        assert_eq!(args.stats_interval, 900);
        assert_eq!(args.telemetry_interval, 900);
    }

    #[test]
    fn it_bounds_ranged_options() {
        assert!(parse(&["-k", "1", "-i", "5"]).is_err());
        assert!(parse(&["-k", "1", "-i", "251"]).is_err());
        assert!(parse(&["-k", "1", "-q", "64"]).is_err());
        assert!(parse(&["-k", "1", "-n", "3601"]).is_err());
    }

    #[test]
    fn it_rejects_inconsistent_combinations() {
        let args = parse(&["-k", "1", "-d", "-f"]).unwrap();
        assert!(args.validate().is_err());

        let args = parse(&["-k", "1", "-d", "-x"]).unwrap();
        assert!(args.validate().is_err());

        let mut args = parse(&["-k", "1"]).unwrap();
        args.psk = "x".repeat(65);
        assert!(args.validate().is_err());

        args.psk = "x".repeat(64);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn it_rejects_a_zero_key() {
        let args = parse(&["-k", "0"]).unwrap();
        assert!(args.validate().is_err());
    }
}
