//! Platform telemetry record
//!
//! A snapshot of the receiver platform: operating system, hardware class,
//! memory, load, temperature, plus health counters for the ingest
//! connection. Body of a [`Telemetry`][crate::Opcode::Telemetry] datagram.
//!
//! String fields occupy a fixed 65 bytes each on the wire, NUL padded, so
//! the record has a single known layout on every platform.

use bytes::BufMut;

/// Fixed on-wire size of each identity string, terminator included.
pub const NAME_LEN: usize = 65;

/// CPU architecture classes reported in [`TelemetryRecord::cpu_arch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CpuArch {
    #[default]
    Unknown = 0,
    X86_32 = 1,
    X86_64 = 2,
    Arm32 = 3,
    Arm64 = 4,
    Mips = 5,
    PowerPc = 6,
    PowerPc64 = 7,
    Sparc = 8,
}

impl CpuArch {
    /// Classify a target architecture name as used by the compiler.
    pub fn from_target_arch(arch: &str) -> Self {
        match arch {
            "x86" => Self::X86_32,
            "x86_64" => Self::X86_64,
            "arm" => Self::Arm32,
            "aarch64" => Self::Arm64,
            "mips" | "mips64" => Self::Mips,
            "powerpc" => Self::PowerPc,
            "powerpc64" => Self::PowerPc64,
            "sparc" | "sparc64" => Self::Sparc,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetryRecord {
    /// Feeder start-up time, whole seconds unix time.
    pub start: u32,
    /// Time this record was captured.
    pub now: u32,

    /// Operating system name.
    pub sysname: String,
    /// Host name.
    pub nodename: String,
    /// Kernel release.
    pub release: String,
    /// Operating system version.
    pub version: String,
    /// Machine architecture name.
    pub machine: String,

    pub cpu_arch: CpuArch,
    pub cpu_count: u8,

    /// System uptime in seconds.
    pub uptime: u32,
    /// Number of processes.
    pub procs: u16,
    /// 1, 5 and 15 minute load averages, times 100.
    pub load: [u16; 3],
    /// CPU temperature in deci-degrees celsius, 0 when no sensor matched.
    pub cpu_temp: u16,

    /// Memory figures in MiB.
    pub mem_total: u16,
    pub mem_free: u16,
    pub mem_available: u16,
    pub swap_total: u16,
    pub swap_free: u16,

    /// Feeder software version.
    pub version_major: u8,
    pub version_minor: u8,
    pub version_patch: u8,

    /// Active ingest protocol id.
    pub protocol: u8,

    /// Ingest connection health since start.
    pub connect_success: u32,
    pub connect_fail: u32,
    pub disconnect: u32,
    pub socket_error: u32,
    pub socket_reads: u32,
    pub bytes_read: u32,
    pub frames_good: u32,
    pub frames_bad: u32,

    /// Frames seen in the last second.
    pub packets_per_second: u16,
}

impl TelemetryRecord {
    pub const WIRE_LEN: usize = 4 + 4 + 5 * NAME_LEN + 1 + 1 + 4 + 2 + 3 * 2 + 2 + 5 * 2 + 3 + 1 + 8 * 4 + 2;

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.start);
        buf.put_u32_le(self.now);

        put_fixed_str(buf, &self.sysname);
        put_fixed_str(buf, &self.nodename);
        put_fixed_str(buf, &self.release);
        put_fixed_str(buf, &self.version);
        put_fixed_str(buf, &self.machine);

        buf.put_u8(self.cpu_arch as u8);
        buf.put_u8(self.cpu_count);

        buf.put_u32_le(self.uptime);
        buf.put_u16_le(self.procs);
        for load in &self.load {
            buf.put_u16_le(*load);
        }
        buf.put_u16_le(self.cpu_temp);

        buf.put_u16_le(self.mem_total);
        buf.put_u16_le(self.mem_free);
        buf.put_u16_le(self.mem_available);
        buf.put_u16_le(self.swap_total);
        buf.put_u16_le(self.swap_free);

        buf.put_u8(self.version_major);
        buf.put_u8(self.version_minor);
        buf.put_u8(self.version_patch);

        buf.put_u8(self.protocol);

        buf.put_u32_le(self.connect_success);
        buf.put_u32_le(self.connect_fail);
        buf.put_u32_le(self.disconnect);
        buf.put_u32_le(self.socket_error);
        buf.put_u32_le(self.socket_reads);
        buf.put_u32_le(self.bytes_read);
        buf.put_u32_le(self.frames_good);
        buf.put_u32_le(self.frames_bad);

        buf.put_u16_le(self.packets_per_second);
    }
}

/// Write a string into its fixed wire slot, truncated to leave at least
/// one NUL, zero padded to [`NAME_LEN`].
fn put_fixed_str<B: BufMut>(buf: &mut B, value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(NAME_LEN - 1);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, NAME_LEN - len);
}

#[cfg(test)]
mod tests {
    use crate::telemetry::{
        CpuArch,
        NAME_LEN,
        TelemetryRecord,
    };

    #[test]
    fn it_encodes_to_the_fixed_length() {
        let record = TelemetryRecord {
            start: 1700000000,
            now: 1700000900,
            sysname: "Linux".into(),
            nodename: "receiver-shed".into(),
            release: "6.1.0-18-arm64".into(),
            version: "Debian 12".into(),
            machine: "aarch64".into(),
            cpu_arch: CpuArch::Arm64,
            cpu_count: 4,
            ..Default::default()
        };

        let mut buf = Vec::new();
        record.encode(&mut buf);
        assert_eq!(buf.len(), TelemetryRecord::WIRE_LEN);

        // sysname occupies the first string slot, NUL padded
        assert_eq!(&buf[8..13], b"Linux");
        assert_eq!(buf[13], 0);
        assert_eq!(&buf[8 + NAME_LEN..8 + NAME_LEN + 13], b"receiver-shed");
    }

    #[test]
    fn it_truncates_oversized_strings() {
        let record = TelemetryRecord {
            nodename: "x".repeat(200),
            ..Default::default()
        };

        let mut buf = Vec::new();
        record.encode(&mut buf);
        assert_eq!(buf.len(), TelemetryRecord::WIRE_LEN);
        assert_eq!(buf[8 + NAME_LEN + NAME_LEN - 1], 0);
    }

    #[test]
    fn it_classifies_target_architectures() {
        assert_eq!(CpuArch::from_target_arch("x86_64"), CpuArch::X86_64);
        assert_eq!(CpuArch::from_target_arch("aarch64"), CpuArch::Arm64);
        assert_eq!(CpuArch::from_target_arch("riscv64"), CpuArch::Unknown);
    }
}
