//! Short text labels for a snapshot, one line per metric.

use crate::config::TemperatureUnit;
use crate::snapshot::{CpuStat, DiskStat, GpuKind, GpuStat, Metric, Snapshot, UsageStat};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn summary_lines(snapshot: &Snapshot, unit: TemperatureUnit) -> Vec<String> {
    let mut lines = vec![
        disk_line(&snapshot.disk),
        memory_line(&snapshot.memory),
        cpu_line(&snapshot.cpu, unit),
    ];
    lines.extend(
        snapshot
            .gpus
            .iter()
            .enumerate()
            .map(|(i, gpu)| gpu_line(gpu, i, unit)),
    );
    lines
}

pub fn disk_line(disk: &Metric<DiskStat>) -> String {
    match disk.value() {
        Some(d) => format!("HDD: {}", usage_text(&d.usage)),
        None => "HDD: n/a".to_string(),
    }
}

pub fn memory_line(memory: &Metric<UsageStat>) -> String {
    match memory.value() {
        Some(m) => format!("RAM: {}", usage_text(m)),
        None => "RAM: n/a".to_string(),
    }
}

pub fn cpu_line(cpu: &Metric<CpuStat>, unit: TemperatureUnit) -> String {
    let Some(c) = cpu.value() else {
        return "CPU: n/a".to_string();
    };
    match c.temperature_celsius {
        Some(t) => format!("CPU: {:.1}% ({})", c.usage_percent, temperature_text(t, unit)),
        None => format!("CPU: {:.1}%", c.usage_percent),
    }
}

pub fn gpu_line(gpu: &GpuStat, index: usize, unit: TemperatureUnit) -> String {
    let label = gpu_label(gpu.kind, index);
    if gpu.error.is_some() {
        return format!("{label}: n/a");
    }
    match gpu.temperature_celsius {
        Some(t) => format!(
            "{label}: {:.1}% {}",
            gpu.usage_percent,
            temperature_text(t, unit)
        ),
        None => format!("{label}: {:.1}%", gpu.usage_percent),
    }
}

/// Short label picked from the kind alone; vendor names are too long for a menu.
pub fn gpu_label(kind: GpuKind, index: usize) -> String {
    match kind {
        GpuKind::Nvidia => format!("NVIDIA GPU {index}"),
        GpuKind::Amd => format!("AMD GPU {index}"),
        GpuKind::Integrated => format!("iGPU {index}"),
        GpuKind::Unknown => format!("GPU {index}"),
    }
}

fn usage_text(usage: &UsageStat) -> String {
    format!(
        "{:.1}GB ({:.1}%)",
        usage.total_bytes as f64 / GIB,
        usage.used_percent
    )
}

fn temperature_text(celsius: f64, unit: TemperatureUnit) -> String {
    format!("{:.1}{}", unit.convert(celsius), unit.symbol())
}
