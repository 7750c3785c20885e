//! BEAST output format decoder
//!
//! The BEAST format is a stream protocol used by Mode-S receivers and
//! decoders (dump1090, readsb, the Mode-S Beast itself) to transmit ADS-B
//! data frames as they're captured. It's an escaped format: frames start
//! with an escape byte followed by a type byte, and any occurance of the
//! escape byte in the frame body is doubled. This allows finding the start
//! of a frame in mid-stream and skipping malformed input.
//!
//! Only the three data frame types are decoded here: Mode-A/C (`0x31`),
//! Mode-S short squitter (`0x32`) and Mode-S long/extended squitter
//! (`0x33`). Each carries a 6 byte multilateration timestamp and a one byte
//! signal level ahead of the payload. Everything else on the stream is
//! skipped.
//!
//! - [Original documentation][1]
//! - [wiedehopf/readsb encoding][2]
//!
//! [1]: https://wiki.jetvision.de/wiki/Mode-S_Beast:Data_Output_Formats
//! [2]: https://github.com/wiedehopf/readsb/blob/75decb53c0e66f4c12cf24127578a3fe7d919219/net_io.c#L1754

mod decoder;
mod reader;

pub use crate::{
    decoder::{
        Counters,
        Decoder,
    },
    reader::Reader,
};

/// the "escape" byte.
pub const ESCAPE: u8 = 0x1a;

/// A complete frame is at most type + timestamp + signal level + long
/// squitter payload.
pub const MAX_FRAME: usize = 1 + MLAT_LEN + 1 + MODE_S_LONG_LEN;

pub const MLAT_LEN: usize = 6;
pub const MODE_AC_LEN: usize = 2;
pub const MODE_S_SHORT_LEN: usize = 7;
pub const MODE_S_LONG_LEN: usize = 14;

#[derive(Debug, thiserror::Error)]
#[error("beast error")]
pub enum Error {
    Io(#[from] std::io::Error),
}

/// Timestamp used for multilateration.
///
/// Opaque to us: 12 MHz counter or GPS format depending on the receiver.
/// It is captured and forwarded verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MlatTimestamp(pub [u8; MLAT_LEN]);

/// RSSI encoded as one byte.
///
/// readsb encodes `nearbyint(sqrt(signalLevel) * 255)` where `signalLevel`
/// is the fraction of full-scale power.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalLevel(pub u8);

impl SignalLevel {
    /// Decode back into a fraction of full-scale power.
    pub fn decode(&self) -> f32 {
        (f32::from(self.0) / 255.0).clamp(0.0, 1.0).powi(2)
    }
}

/// One decoded data frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    pub timestamp: MlatTimestamp,
    pub signal: SignalLevel,
    pub data: FrameData,
}

impl Frame {
    /// Assemble from a de-escaped frame buffer: type byte, timestamp,
    /// signal level, payload. Frames whose payload length matches none of
    /// the three message classes yield `None`.
    pub(crate) fn from_buffer(buf: &[u8]) -> Option<Self> {
        let (header, payload) = buf.split_at_checked(1 + MLAT_LEN + 1)?;

        let data = match payload.len() {
            MODE_AC_LEN => FrameData::ModeAc(payload.try_into().ok()?),
            MODE_S_SHORT_LEN => FrameData::ModeSShort(payload.try_into().ok()?),
            MODE_S_LONG_LEN => FrameData::ModeSLong(payload.try_into().ok()?),
            _ => return None,
        };

        Some(Self {
            timestamp: MlatTimestamp(header[1..1 + MLAT_LEN].try_into().ok()?),
            signal: SignalLevel(header[1 + MLAT_LEN]),
            data,
        })
    }

    /// The downlink format of a Mode-S payload. Mode-A/C has none.
    pub fn downlink_format(&self) -> Option<u8> {
        match &self.data {
            FrameData::ModeAc(_) => None,
            FrameData::ModeSShort(data) => Some(data[0] >> 3),
            FrameData::ModeSLong(data) => Some(data[0] >> 3),
        }
    }
}

/// Frame payload, classified by length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameData {
    ModeAc([u8; MODE_AC_LEN]),
    ModeSShort([u8; MODE_S_SHORT_LEN]),
    ModeSLong([u8; MODE_S_LONG_LEN]),
}

impl FrameData {
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::ModeAc(data) => data,
            Self::ModeSShort(data) => data,
            Self::ModeSLong(data) => data,
        }
    }
}

pub(crate) fn is_frame_type(byte: u8) -> bool {
    (0x31..=0x33).contains(&byte)
}

#[cfg(test)]
mod tests {
    use crate::{
        Frame,
        FrameData,
        MlatTimestamp,
        SignalLevel,
    };

    #[test]
    fn it_extracts_the_downlink_format() {
        let frame = Frame {
            timestamp: MlatTimestamp([0; 6]),
            signal: SignalLevel(0),
            data: FrameData::ModeSLong(*b"\x8d\x48\x40\xd6\x20\x2c\xc3\x71\xc3\x2c\xe0\x57\x60\x98"),
        };
        assert_eq!(frame.downlink_format(), Some(17));

        let frame = Frame {
            data: FrameData::ModeAc([0x20, 0x05]),
            ..frame
        };
        assert_eq!(frame.downlink_format(), None);
    }

    #[test]
    fn signal_level_round_trips_the_encoding() {
        assert_eq!(SignalLevel(0).decode(), 0.0);
        assert_eq!(SignalLevel(255).decode(), 1.0);
        assert!((SignalLevel(128).decode() - 0.252).abs() < 0.001);
    }
}
