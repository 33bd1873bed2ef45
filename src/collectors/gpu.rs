use crate::collectors::ProbeError;
use crate::snapshot::{clamp_percent, GpuKind, GpuStat};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const NVIDIA_SMI_ARGS: [&str; 2] = [
    "--query-gpu=index,name,utilization.gpu,temperature.gpu",
    "--format=csv,noheader,nounits",
];

const RADEONTOP_ARGS: [&str; 4] = ["-l", "1", "-d", "-"];

const LSPCI_ARGS: [&str; 1] = ["-v"];

const INTEGRATED_VENDORS: [&str; 2] = ["Intel", "AMD"];

const DISPLAY_CLASS_MARKERS: [&str; 2] = ["VGA", "Display controller"];

pub const INTEGRATED_PLACEHOLDER_ERROR: &str = "Integrated GPU monitoring not fully implemented";

static RADEONTOP_GPU_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"gpu\s+(\d+\.?\d*)%").expect("static regex"));

/// Runs external helper programs.
pub trait ToolRunner: Send {
    fn is_available(&self, tool: &str) -> bool;
    fn run(&self, tool: &str, args: &[&str]) -> Result<String, ProbeError>;
}

/// Upper bound for a single tool run. radeontop alone needs about a second.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

const TOOL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Looks tools up on `PATH` and runs them, killing any that outlive the timeout.
#[derive(Debug, Clone, Copy)]
pub struct SystemTools {
    timeout: Duration,
}

impl SystemTools {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemTools {
    fn default() -> Self {
        Self::new(TOOL_TIMEOUT)
    }
}

impl ToolRunner for SystemTools {
    fn is_available(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }

    fn run(&self, tool: &str, args: &[&str]) -> Result<String, ProbeError> {
        let spawn_error = |source: std::io::Error| ProbeError::ToolSpawn {
            tool: tool.to_string(),
            source,
        };

        let mut child = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        // Drain stdout concurrently so a chatty tool cannot stall on a full pipe.
        let mut stdout = child.stdout.take();
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProbeError::ToolTimeout {
                        tool: tool.to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(TOOL_POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(spawn_error(source));
                }
            }
        };

        if !status.success() {
            return Err(ProbeError::ToolFailed {
                tool: tool.to_string(),
                status: status.to_string(),
            });
        }
        let stdout = reader.join().unwrap_or_default();
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Vendor strategies, in the order their results appear in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuSource {
    Nvidia,
    Radeon,
    Integrated,
}

impl GpuSource {
    pub const ALL: [GpuSource; 3] = [Self::Nvidia, Self::Radeon, Self::Integrated];

    pub fn tool(self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia-smi",
            Self::Radeon => "radeontop",
            Self::Integrated => "lspci",
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Nvidia => &NVIDIA_SMI_ARGS,
            Self::Radeon => &RADEONTOP_ARGS,
            Self::Integrated => &LSPCI_ARGS,
        }
    }

    pub fn parse(self, output: &str) -> Vec<GpuStat> {
        match self {
            Self::Nvidia => parse_nvidia_smi(output),
            Self::Radeon => parse_radeontop(output).into_iter().collect(),
            Self::Integrated => detect_integrated(output).into_iter().collect(),
        }
    }
}

pub struct GpuAggregator<T> {
    tools: T,
}

impl<T: ToolRunner> GpuAggregator<T> {
    pub fn new(tools: T) -> Self {
        Self { tools }
    }

    /// All detected GPUs. Vendors without tooling contribute nothing.
    pub fn collect(&self) -> Vec<GpuStat> {
        let mut gpus = Vec::new();
        for source in GpuSource::ALL {
            gpus.extend(self.collect_source(source));
        }
        gpus
    }

    fn collect_source(&self, source: GpuSource) -> Vec<GpuStat> {
        let tool = source.tool();
        if !self.tools.is_available(tool) {
            debug!(tool, "tool not found, skipping");
            return Vec::new();
        }

        match self.tools.run(tool, source.args()) {
            Ok(output) => source.parse(&output),
            Err(err) => {
                warn!(tool, error = %err, "gpu tool failed");
                Vec::new()
            }
        }
    }
}

/// Parses `index, name, utilization, temperature` rows.
pub fn parse_nvidia_smi(output: &str) -> Vec<GpuStat> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_nvidia_line)
        .collect()
}

fn parse_nvidia_line(line: &str) -> Option<GpuStat> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        warn!(line, "invalid nvidia-smi output line");
        return None;
    }

    let usage_percent = match parts[2].parse::<f64>() {
        Ok(v) => clamp_percent(v),
        Err(_) => {
            warn!(value = parts[2], "failed to parse gpu usage");
            0.0
        }
    };
    // "[N/A]" on boards without a sensor
    let temperature_celsius = match parts[3].parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(value = parts[3], "failed to parse gpu temperature");
            None
        }
    };

    Some(GpuStat {
        kind: GpuKind::Nvidia,
        name: format!("NVIDIA GPU {} ({})", parts[0], parts[1]),
        usage_percent,
        temperature_celsius,
        error: None,
    })
}

/// First `gpu NN.NN%` reading of a radeontop dump. Single card only.
pub fn parse_radeontop(output: &str) -> Option<GpuStat> {
    output
        .lines()
        .filter(|line| line.contains("gpu") && line.contains('%'))
        .find_map(|line| {
            let caps = RADEONTOP_GPU_RE.captures(line)?;
            caps[1].parse::<f64>().ok()
        })
        .map(|usage| GpuStat {
            kind: GpuKind::Amd,
            name: "AMD GPU".to_string(),
            usage_percent: clamp_percent(usage),
            temperature_celsius: None,
            error: None,
        })
}

/// Placeholder entry when lspci lists an Intel/AMD display device.
pub fn detect_integrated(output: &str) -> Option<GpuStat> {
    let found = output.lines().any(|line| {
        DISPLAY_CLASS_MARKERS.iter().any(|m| line.contains(m))
            && INTEGRATED_VENDORS.iter().any(|v| line.contains(v))
    });
    if !found {
        return None;
    }

    Some(GpuStat {
        kind: GpuKind::Integrated,
        name: "Integrated GPU".to_string(),
        usage_percent: 0.0,
        temperature_celsius: None,
        error: Some(INTEGRATED_PLACEHOLDER_ERROR.to_string()),
    })
}
