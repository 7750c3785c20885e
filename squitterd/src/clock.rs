use std::time::{
    SystemTime,
    UNIX_EPOCH,
};

/// Unix time in microseconds, as carried in datagram headers and dedup
/// entries.
pub fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

/// Unix time in whole seconds, as carried in stats and telemetry records.
pub fn unix_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}
