pub mod gpu;
pub mod system;
pub mod thermal;

use crate::snapshot::{CpuStat, DiskStat, Metric, Snapshot, UsageStat};
use chrono::{DateTime, Utc};
use gpu::{GpuAggregator, ToolRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thermal::ThermalProbe;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot resolve {path}: {source}")]
    Path {
        path: String,
        source: std::io::Error,
    },
    #[error("statvfs failed for {path}: {source}")]
    Statvfs {
        path: String,
        source: std::io::Error,
    },
    #[error("filesystem containing {0} reports no capacity")]
    NoCapacity(String),
    #[error("memory statistics unavailable")]
    NoMemoryData,
    #[error("no CPU usage data available")]
    NoCpuData,
    #[error("failed to run {tool}: {source}")]
    ToolSpawn {
        tool: String,
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}")]
    ToolFailed { tool: String, status: String },
    #[error("{tool} did not finish within {}", humantime::format_duration(*.timeout))]
    ToolTimeout { tool: String, timeout: Duration },
}

/// Direct OS queries for the non-GPU metrics.
pub trait HostProbe: Send {
    fn disk(&mut self, path: &Path) -> Result<DiskStat, ProbeError>;
    fn memory(&mut self) -> Result<UsageStat, ProbeError>;
    /// Blocks for the sampling window.
    fn cpu_usage(&mut self) -> Result<f64, ProbeError>;
}

/// One collection cycle. Runs on a blocking thread.
pub trait Collect: Send + 'static {
    fn collect(&mut self) -> Snapshot;
}

pub struct Collector<H, T> {
    host: H,
    thermal: ThermalProbe,
    gpus: GpuAggregator<T>,
    disk_path: PathBuf,
    last_captured_at: Option<DateTime<Utc>>,
}

impl<H: HostProbe, T: ToolRunner> Collector<H, T> {
    pub fn new(host: H, thermal: ThermalProbe, gpus: GpuAggregator<T>, disk_path: PathBuf) -> Self {
        Self {
            host,
            thermal,
            gpus,
            disk_path,
            last_captured_at: None,
        }
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_captured_at {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_captured_at = Some(ts);
        ts
    }

    fn collect_disk(&mut self) -> Metric<DiskStat> {
        let result = self.host.disk(&self.disk_path);
        if let Err(err) = &result {
            warn!(path = %self.disk_path.display(), error = %err, "disk probe failed");
        }
        result.into()
    }

    fn collect_memory(&mut self) -> Metric<UsageStat> {
        let result = self.host.memory();
        if let Err(err) = &result {
            warn!(error = %err, "memory probe failed");
        }
        result.into()
    }

    fn collect_cpu(&mut self) -> Metric<CpuStat> {
        let usage_percent = match self.host.cpu_usage() {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "cpu usage probe failed");
                return Metric::unavailable(err.to_string());
            }
        };

        let temperature_celsius = self.thermal.read();
        if temperature_celsius.is_none() {
            debug!("cpu temperature not available");
        }

        Metric::Available(CpuStat {
            usage_percent,
            temperature_celsius,
        })
    }
}

impl<H, T> Collect for Collector<H, T>
where
    H: HostProbe + 'static,
    T: ToolRunner + 'static,
{
    fn collect(&mut self) -> Snapshot {
        let captured_at = self.next_timestamp();
        let disk = self.collect_disk();
        let memory = self.collect_memory();
        let cpu = self.collect_cpu();
        let gpus = self.gpus.collect();

        debug!(gpu_count = gpus.len(), "collection cycle finished");

        Snapshot {
            disk,
            memory,
            cpu,
            gpus,
            captured_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collectors::gpu::tests::FakeTools;
    use std::fs;

    /// Scripted host readings.
    pub(crate) struct FakeHost {
        pub disk: Option<DiskStat>,
        pub memory: Option<UsageStat>,
        pub cpu: Option<f64>,
    }

    impl FakeHost {
        pub(crate) fn healthy() -> Self {
            Self {
                disk: Some(DiskStat {
                    mount: "/".to_string(),
                    usage: UsageStat::new(1000, 250),
                }),
                memory: Some(UsageStat::new(16, 4)),
                cpu: Some(37.5),
            }
        }
    }

    impl HostProbe for FakeHost {
        fn disk(&mut self, path: &Path) -> Result<DiskStat, ProbeError> {
            self.disk
                .clone()
                .ok_or_else(|| ProbeError::NoCapacity(path.display().to_string()))
        }

        fn memory(&mut self) -> Result<UsageStat, ProbeError> {
            self.memory.ok_or(ProbeError::NoMemoryData)
        }

        fn cpu_usage(&mut self) -> Result<f64, ProbeError> {
            self.cpu.ok_or(ProbeError::NoCpuData)
        }
    }

    fn collector(host: FakeHost, thermal_root: &Path) -> Collector<FakeHost, FakeTools> {
        Collector::new(
            host,
            ThermalProbe::with_root(thermal_root),
            GpuAggregator::new(FakeTools::none()),
            PathBuf::from("/data"),
        )
    }

    #[test]
    fn disk_failure_leaves_other_metrics_intact() {
        let root = tempfile::tempdir().unwrap();
        let mut host = FakeHost::healthy();
        host.disk = None;

        let snapshot = collector(host, root.path()).collect();

        assert_eq!(
            snapshot.disk.error(),
            Some("filesystem containing /data reports no capacity")
        );
        assert_eq!(snapshot.memory.value().map(|m| m.used_percent), Some(25.0));
        assert_eq!(snapshot.cpu.value().map(|c| c.usage_percent), Some(37.5));
    }

    #[test]
    fn missing_temperature_is_not_a_cpu_error() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = collector(FakeHost::healthy(), root.path()).collect();

        let cpu = snapshot.cpu.value().expect("cpu available");
        assert_eq!(cpu.temperature_celsius, None);
        assert!(snapshot.cpu.error().is_none());
    }

    #[test]
    fn cpu_temperature_is_attached_when_found() {
        let root = tempfile::tempdir().unwrap();
        let zone = root.path().join("sys/class/thermal/thermal_zone0");
        fs::create_dir_all(&zone).unwrap();
        fs::write(zone.join("temp"), "51000\n").unwrap();

        let snapshot = collector(FakeHost::healthy(), root.path()).collect();
        assert_eq!(
            snapshot.cpu.value().and_then(|c| c.temperature_celsius),
            Some(51.0)
        );
    }

    #[test]
    fn cpu_usage_failure_is_cpu_error() {
        let root = tempfile::tempdir().unwrap();
        let mut host = FakeHost::healthy();
        host.cpu = None;

        let snapshot = collector(host, root.path()).collect();
        assert_eq!(snapshot.cpu.error(), Some("no CPU usage data available"));
        assert!(snapshot.disk.value().is_some());
    }

    #[test]
    fn no_gpu_tools_means_empty_list() {
        let root = tempfile::tempdir().unwrap();
        let snapshot = collector(FakeHost::healthy(), root.path()).collect();
        assert!(snapshot.gpus.is_empty());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let root = tempfile::tempdir().unwrap();
        let mut c = collector(FakeHost::healthy(), root.path());
        let first = c.collect().captured_at;
        c.last_captured_at = Some(first + chrono::Duration::hours(1));
        let second = c.collect().captured_at;
        assert!(second >= first + chrono::Duration::hours(1));
    }
}
