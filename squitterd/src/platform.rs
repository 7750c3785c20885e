//! Platform telemetry collection
//!
//! Samples the receiver platform for the periodic telemetry report:
//! identity once at start-up, live figures (memory, load, uptime,
//! temperature) on every report. Only functional data about the box the
//! feeder runs on is collected, nothing about the network or its users.

use squitter_wire::telemetry::{
    CpuArch,
    TelemetryRecord,
};
use sysinfo::{
    Components,
    System,
};

use crate::{
    clock::unix_secs,
    source::IngestHealth,
};

/// Temperature sensor labels accepted as "the" CPU temperature, the
/// usual suspects on x86 and ARM boards.
const THERMAL_LABELS: &[&str] = &["x86_pkg_temp", "cpu-thermal"];

const MIB: u64 = 1024 * 1024;

pub struct PlatformMonitor {
    start: u32,
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    cpu_arch: CpuArch,
    cpu_count: u8,
    system: System,
    components: Components,
}

impl PlatformMonitor {
    pub fn new() -> Self {
        Self {
            start: unix_secs(),
            sysname: System::name().unwrap_or_default(),
            nodename: System::host_name().unwrap_or_default(),
            release: System::kernel_version().unwrap_or_default(),
            version: System::os_version().unwrap_or_default(),
            machine: std::env::consts::ARCH.to_owned(),
            cpu_arch: CpuArch::from_target_arch(std::env::consts::ARCH),
            cpu_count: std::thread::available_parallelism()
                .map(|count| count.get().min(u8::MAX as usize) as u8)
                .unwrap_or(0),
            system: System::new(),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Take a fresh sample and fill in a complete record.
    pub fn collect(
        &mut self,
        ingest: &IngestHealth,
        protocol: u8,
        version: (u8, u8, u8),
    ) -> TelemetryRecord {
        self.system.refresh_memory();
        self.system.refresh_processes();

        let load = System::load_average();

        TelemetryRecord {
            start: self.start,
            now: unix_secs(),

            sysname: self.sysname.clone(),
            nodename: self.nodename.clone(),
            release: self.release.clone(),
            version: self.version.clone(),
            machine: self.machine.clone(),

            cpu_arch: self.cpu_arch,
            cpu_count: self.cpu_count,

            uptime: System::uptime().min(u32::MAX.into()) as u32,
            procs: self.system.processes().len().min(u16::MAX as usize) as u16,
            load: [
                (load.one * 100.0) as u16,
                (load.five * 100.0) as u16,
                (load.fifteen * 100.0) as u16,
            ],
            cpu_temp: self.cpu_temp(),

            mem_total: mib(self.system.total_memory()),
            mem_free: mib(self.system.free_memory()),
            mem_available: mib(self.system.available_memory()),
            swap_total: mib(self.system.total_swap()),
            swap_free: mib(self.system.free_swap()),

            version_major: version.0,
            version_minor: version.1,
            version_patch: version.2,

            protocol,

            connect_success: ingest.connect_success,
            connect_fail: ingest.connect_fail,
            disconnect: ingest.disconnect,
            socket_error: ingest.socket_error,
            socket_reads: ingest.socket_reads,
            bytes_read: ingest.bytes_read,
            frames_good: ingest.frames_good,
            frames_bad: ingest.frames_bad,

            packets_per_second: ingest.packets_per_second,
        }
    }

    /// CPU temperature in deci-degrees from the first matching sensor,
    /// zero when the platform has none we recognize.
    fn cpu_temp(&mut self) -> u16 {
        self.components.refresh();

        self.components
            .iter()
            .find(|component| {
                let label = component.label();
                THERMAL_LABELS.iter().any(|known| label.starts_with(known))
            })
            .map(|component| (component.temperature() * 10.0).clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(0)
    }
}

fn mib(bytes: u64) -> u16 {
    (bytes / MIB).min(u16::MAX.into()) as u16
}

#[cfg(test)]
mod tests {
    use crate::{
        platform::PlatformMonitor,
        source::IngestHealth,
    };

    #[test]
    fn it_fills_a_plausible_record() {
        let mut monitor = PlatformMonitor::new();

        let ingest = IngestHealth {
            connect_success: 1,
            frames_good: 1234,
            ..Default::default()
        };
        let record = monitor.collect(&ingest, 1, (0, 1, 0));

        assert!(record.now >= record.start);
        assert_eq!(record.protocol, 1);
        assert_eq!(record.connect_success, 1);
        assert_eq!(record.frames_good, 1234);
        assert_eq!(record.version_minor, 1);
        assert!(record.mem_total > 0);
        assert_eq!(record.machine, std::env::consts::ARCH);
    }
}
