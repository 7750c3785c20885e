//! Radio channel statistics record
//!
//! Counters about traffic observed on the radio channel and what was
//! forwarded, accumulated since process start and reported periodically.
//! The record is the body of a [`RadioStats`][crate::Opcode::RadioStats]
//! datagram, encoded field by field, little-endian, no padding.

use bytes::BufMut;

use crate::NUM_DF;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RadioStats {
    /// Station start-up time, whole seconds unix time.
    pub start: u32,
    /// Time this record was captured.
    pub now: u32,

    pub rx_mode_ac: u64,
    pub rx_mode_ss: u64,
    pub rx_mode_es: u64,

    /// Received Mode-S messages by downlink format of the first byte.
    pub rx_df: [u64; NUM_DF],

    pub dupe_ac: u64,
    pub dupe_ss: u64,
    pub dupe_es: u64,
    pub dupes: u64,

    pub tx_keepalive: u64,
    pub tx_mode_ac: u64,
    pub tx_mode_ss: u64,
    pub tx_mode_es: u64,
    pub tx_mode_multi: u64,
    pub tx_stats: u64,
    pub tx_telemetry: u64,

    pub tx_count: u64,
    pub tx_bytes: u64,
}

impl RadioStats {
    pub const WIRE_LEN: usize = 4 + 4 + 3 * 8 + NUM_DF * 8 + 4 * 8 + 7 * 8 + 2 * 8;

    pub fn new(start: u32) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.start);
        buf.put_u32_le(self.now);

        buf.put_u64_le(self.rx_mode_ac);
        buf.put_u64_le(self.rx_mode_ss);
        buf.put_u64_le(self.rx_mode_es);

        for count in &self.rx_df {
            buf.put_u64_le(*count);
        }

        buf.put_u64_le(self.dupe_ac);
        buf.put_u64_le(self.dupe_ss);
        buf.put_u64_le(self.dupe_es);
        buf.put_u64_le(self.dupes);

        buf.put_u64_le(self.tx_keepalive);
        buf.put_u64_le(self.tx_mode_ac);
        buf.put_u64_le(self.tx_mode_ss);
        buf.put_u64_le(self.tx_mode_es);
        buf.put_u64_le(self.tx_mode_multi);
        buf.put_u64_le(self.tx_stats);
        buf.put_u64_le(self.tx_telemetry);

        buf.put_u64_le(self.tx_count);
        buf.put_u64_le(self.tx_bytes);
    }
}

#[cfg(test)]
mod tests {
    use crate::stats::RadioStats;

    #[test]
    fn it_encodes_to_the_fixed_length() {
        let mut stats = RadioStats::new(1700000000);
        stats.rx_df[17] = 0x1122334455667788;

        let mut buf = Vec::new();
        stats.encode(&mut buf);

        assert_eq!(buf.len(), RadioStats::WIRE_LEN);

        // rx_df[17] sits after start, now and the three rx counters
        let offset = 4 + 4 + 3 * 8 + 17 * 8;
        assert_eq!(
            &buf[offset..offset + 8],
            &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
    }
}
