//! Message classification and forwarding
//!
//! Everything the framer delivers passes through here: classify by
//! payload length, count it, de-duplicate, and build the signed datagram
//! for the aggregator. Datagrams are returned to the event loop, which
//! hands them to the UDP supervisor; a send failure is the supervisor's
//! problem and never reaches this path.

use bytes::{
    BufMut,
    Bytes,
};
use squitter_beast::{
    Frame,
    FrameData,
};
use squitter_wire::{
    MAX_MULTIFRAME,
    Opcode,
    Signer,
    envelope::EsRecord,
    seal,
    stats::RadioStats,
    telemetry::TelemetryRecord,
};

use crate::{
    clock::{
        unix_micros,
        unix_secs,
    },
    config::Args,
    dedup::DedupStore,
};

/// Extended squitter downlink formats forwarded by default: ADS-B (17),
/// TIS-B/ADS-R (18), military extended squitter (19), Comm-B altitude and
/// identity replies (20, 21) and military use (22).
const FORWARDED_DF: std::ops::RangeInclusive<u8> = 17..=22;

/// Counters cleared every housekeeping second, for the heartbeat decision
/// and the foreground stats line.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerSecond {
    pub sent: u32,
    pub bytes: u32,
    pub dupe_ss: u32,
    pub dupe_es: u32,
}

impl PerSecond {
    pub fn dupes(&self) -> u32 {
        self.dupe_ss + self.dupe_es
    }
}

/// Buffer for multiframe collection, fixed at the protocol maximum.
#[derive(Debug)]
struct Batch {
    records: [EsRecord; MAX_MULTIFRAME],
    len: usize,
}

impl Default for Batch {
    fn default() -> Self {
        const EMPTY: EsRecord = EsRecord {
            mlat: [0; 6],
            rssi: 0,
            data: [0; 14],
        };
        Self {
            records: [EMPTY; MAX_MULTIFRAME],
            len: 0,
        }
    }
}

impl Batch {
    fn push(&mut self, record: EsRecord) {
        self.records[self.len] = record;
        self.len += 1;
    }

    fn is_full(&self) -> bool {
        self.len == MAX_MULTIFRAME
    }
}

pub struct Forwarder {
    key: u64,
    signer: Signer,
    seq: u32,
    send_ac: bool,
    send_ss: bool,
    everything: bool,
    multiframe: bool,
    dedup: DedupStore,
    batch: Batch,
    pub stats: RadioStats,
    per_second: PerSecond,
}

impl Forwarder {
    pub fn new(args: &Args) -> Self {
        Self {
            key: args.key,
            signer: Signer::new(args.psk.as_bytes()),
            seq: 1,
            send_ac: args.mode_ac,
            send_ss: args.mode_s_short,
            everything: args.everything,
            multiframe: args.multiframe,
            dedup: DedupStore::new(),
            batch: Batch::default(),
            stats: RadioStats::new(unix_secs()),
            per_second: PerSecond::default(),
        }
    }

    /// Classify one frame. Returns the datagram to send, if any: either
    /// the message itself, or a multiframe flushed by filling up.
    pub fn process(&mut self, frame: Frame) -> Option<Bytes> {
        let Frame {
            timestamp,
            signal,
            data,
        } = frame;

        match data {
            FrameData::ModeSLong(payload) => {
                let df = payload[0] >> 3;
                let mut datagram = None;

                if FORWARDED_DF.contains(&df) || self.everything {
                    if self.dedup.check_and_insert_extended(&payload, unix_micros()) {
                        self.per_second.dupe_es += 1;
                        self.stats.dupe_es += 1;
                        self.stats.dupes += 1;
                    }
                    else {
                        let record = EsRecord {
                            mlat: timestamp.0,
                            rssi: signal.0,
                            data: payload,
                        };

                        if self.multiframe {
                            self.batch.push(record);
                            if self.batch.is_full() {
                                datagram = self.flush_multiframe();
                            }
                        }
                        else {
                            datagram = Some(self.send_mode_es(&record));
                        }
                    }
                }

                self.stats.rx_mode_es += 1;
                self.stats.rx_df[usize::from(df)] += 1;
                datagram
            }

            FrameData::ModeSShort(payload) => {
                let df = payload[0] >> 3;
                let mut datagram = None;

                if self.send_ss {
                    if self.dedup.check_and_insert_short(&payload, unix_micros()) {
                        self.per_second.dupe_ss += 1;
                        self.stats.dupe_ss += 1;
                        self.stats.dupes += 1;
                    }
                    else {
                        datagram = Some(self.send_mode_ss(&timestamp.0, signal.0, &payload));
                    }
                }

                self.stats.rx_mode_ss += 1;
                self.stats.rx_df[usize::from(df)] += 1;
                datagram
            }

            FrameData::ModeAc(payload) => {
                let datagram = self
                    .send_ac
                    .then(|| self.send_mode_ac(&timestamp.0, signal.0, &payload));

                self.stats.rx_mode_ac += 1;
                datagram
            }
        }
    }

    fn send_mode_es(&mut self, record: &EsRecord) -> Bytes {
        let ts = unix_micros();
        let seq = self.next_seq();
        let datagram = seal(self.key, ts, seq, Opcode::ModeSExtended, &self.signer, |buf| {
            record.encode(buf);
        });

        self.stats.tx_mode_es += 1;
        self.account(&datagram);
        datagram
    }

    fn send_mode_ss(&mut self, mlat: &[u8; 6], rssi: u8, payload: &[u8; 7]) -> Bytes {
        let ts = unix_micros();
        let seq = self.next_seq();
        let datagram = seal(self.key, ts, seq, Opcode::ModeSShort, &self.signer, |buf| {
            buf.put_slice(mlat);
            buf.put_u8(rssi);
            buf.put_slice(payload);
        });

        self.stats.tx_mode_ss += 1;
        self.account(&datagram);
        datagram
    }

    fn send_mode_ac(&mut self, mlat: &[u8; 6], rssi: u8, payload: &[u8; 2]) -> Bytes {
        let ts = unix_micros();
        let seq = self.next_seq();
        let datagram = seal(self.key, ts, seq, Opcode::ModeAc, &self.signer, |buf| {
            buf.put_slice(mlat);
            buf.put_u8(rssi);
            buf.put_slice(payload);
        });

        self.stats.tx_mode_ac += 1;
        self.account(&datagram);
        datagram
    }

    /// Send out whatever the multiframe buffer holds. Called when the
    /// forwarding timer fires and when the buffer fills up.
    pub fn flush_multiframe(&mut self) -> Option<Bytes> {
        if self.batch.len == 0 {
            return None;
        }

        let count = self.batch.len;
        tracing::debug!(count, "flushing multiframe buffer");

        let ts = unix_micros();
        let seq = self.next_seq();
        let datagram = seal(self.key, ts, seq, Opcode::Multiframe, &self.signer, |buf| {
            buf.put_u8(count as u8);
            for record in &self.batch.records[..count] {
                record.encode(buf);
            }
        });

        self.batch.len = 0;
        self.stats.tx_mode_multi += 1;
        self.account(&datagram);
        Some(datagram)
    }

    /// Heartbeat for seconds without any other traffic. Carries the
    /// software version so the aggregator knows what is deployed.
    pub fn keepalive(&mut self) -> Bytes {
        let (major, minor, patch) = version_triple();
        let ts = unix_micros();
        let seq = self.next_seq();

        let datagram = seal(self.key, ts, seq, Opcode::Keepalive, &self.signer, |buf| {
            buf.put_u8(major);
            buf.put_u8(minor);
            buf.put_u8(patch);
        });

        // keepalives do not count as traffic for the heartbeat decision
        self.stats.tx_keepalive += 1;
        self.stats.tx_count += 1;
        self.stats.tx_bytes += datagram.len() as u64;
        datagram
    }

    pub fn radio_stats(&mut self) -> Bytes {
        self.stats.now = unix_secs();

        let ts = unix_micros();
        let seq = self.next_seq();
        let datagram = seal(self.key, ts, seq, Opcode::RadioStats, &self.signer, |buf| {
            self.stats.encode(buf);
        });

        self.stats.tx_stats += 1;
        self.account(&datagram);
        datagram
    }

    pub fn telemetry_report(&mut self, record: &TelemetryRecord) -> Bytes {
        let ts = unix_micros();
        let seq = self.next_seq();
        let datagram = seal(self.key, ts, seq, Opcode::Telemetry, &self.signer, |buf| {
            record.encode(buf);
        });

        self.stats.tx_telemetry += 1;
        self.account(&datagram);
        datagram
    }

    /// Run the dedup eviction pass.
    pub fn evict_dedup(&mut self) -> usize {
        self.dedup.evict(unix_micros())
    }

    pub fn sent_this_second(&self) -> u32 {
        self.per_second.sent
    }

    /// Close out the housekeeping second, returning its counters.
    pub fn end_second(&mut self) -> PerSecond {
        std::mem::take(&mut self.per_second)
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    fn account(&mut self, datagram: &Bytes) {
        self.stats.tx_count += 1;
        self.stats.tx_bytes += datagram.len() as u64;
        self.per_second.sent += 1;
        self.per_second.bytes += datagram.len() as u32;
    }
}

/// The crate version as the three bytes carried in keepalives and
/// telemetry.
pub fn version_triple() -> (u8, u8, u8) {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|part| part.parse().unwrap_or(0));
    let mut next = move || parts.next().unwrap_or(0);
    (next(), next(), next())
}
