//! Wire protocol spoken to the aggregator
//!
//! Every datagram sent to the aggregator has the same envelope: a fixed
//! header carrying the station key, a microsecond timestamp, a sequence
//! number and an opcode, followed by an opcode-specific body, followed by
//! an 8 byte authentication tag over everything before it. All integers
//! are little-endian and fields are packed without padding.
//!
//! The tag is a truncated HMAC-SHA256 computed with a key derived from the
//! station pass-phrase, see [`authtag`]. The aggregator recomputes it to
//! authenticate the sender and to reject corrupted or forged datagrams;
//! the sender never sees any of that, datagrams are fire-and-forget.

pub mod authtag;
pub mod envelope;
pub mod stats;
pub mod telemetry;

pub use crate::{
    authtag::Signer,
    envelope::{
        Opcode,
        seal,
    },
};

pub const MLAT_LEN: usize = 6;
pub const MODE_AC_LEN: usize = 2;
pub const MODE_S_SHORT_LEN: usize = 7;
pub const MODE_S_LONG_LEN: usize = 14;

/// Number of Mode-S downlink formats (a 5 bit field).
pub const NUM_DF: usize = 32;

/// Upper bound on records in one multiframe datagram.
pub const MAX_MULTIFRAME: usize = 32;
