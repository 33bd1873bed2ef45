use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

const THERMAL_CANDIDATES: [&str; 4] = [
    "sys/class/thermal/thermal_zone0/temp",
    "sys/class/thermal/thermal_zone1/temp",
    // Intel coretemp; the hwmon index differs between boots
    "sys/devices/platform/coretemp.0/hwmon/hwmon*/temp1_input",
    "sys/devices/virtual/thermal/thermal_zone0/temp",
];

const THERMAL_ZONE_DIR: &str = "sys/class/thermal";

const CPU_ZONE_MARKERS: [&str; 3] = ["cpu", "x86", "core"];

#[derive(Debug, Error)]
pub enum ThermalError {
    #[error("no file matches {0}")]
    NoMatch(String),
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{path} holds non-numeric value '{value}'")]
    Parse { path: String, value: String },
}

/// CPU temperature discovery over sysfs.
#[derive(Debug, Clone)]
pub struct ThermalProbe {
    candidates: Vec<PathBuf>,
    zone_dir: PathBuf,
}

impl ThermalProbe {
    pub fn new() -> Self {
        Self::with_root(Path::new("/"))
    }

    /// Resolves every sensor path under `root` instead of `/`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            candidates: THERMAL_CANDIDATES.iter().map(|p| root.join(p)).collect(),
            zone_dir: root.join(THERMAL_ZONE_DIR),
        }
    }

    /// Temperature in Celsius, or `None` when no sensor could be read.
    pub fn read(&self) -> Option<f64> {
        for candidate in &self.candidates {
            match read_thermal_file(candidate) {
                Ok(celsius) => {
                    trace!(path = %candidate.display(), celsius, "cpu temperature from fixed path");
                    return Some(celsius);
                }
                Err(err) => trace!(error = %err, "thermal candidate skipped"),
            }
        }

        match find_cpu_zone(&self.zone_dir) {
            Some(celsius) => Some(celsius),
            None => {
                debug!(dir = %self.zone_dir.display(), "no cpu thermal zone found");
                None
            }
        }
    }
}

impl Default for ThermalProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a millidegree sensor file. `*` in the path selects the first match.
pub fn read_thermal_file(path: &Path) -> Result<f64, ThermalError> {
    let resolved = if path.to_string_lossy().contains('*') {
        expand_wildcard(path).ok_or_else(|| ThermalError::NoMatch(path.display().to_string()))?
    } else {
        path.to_path_buf()
    };

    let raw = fs::read_to_string(&resolved).map_err(|source| ThermalError::Read {
        path: resolved.display().to_string(),
        source,
    })?;
    let value = raw.trim();
    let millis = value.parse::<f64>().map_err(|_| ThermalError::Parse {
        path: resolved.display().to_string(),
        value: value.to_string(),
    })?;
    if !millis.is_finite() {
        return Err(ThermalError::Parse {
            path: resolved.display().to_string(),
            value: value.to_string(),
        });
    }

    Ok(millis / 1000.0)
}

fn find_cpu_zone(dir: &Path) -> Option<f64> {
    let Ok(entries) = fs::read_dir(dir) else {
        return None;
    };

    let mut zones: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix("thermal_zone")?;
            Some((index.parse().unwrap_or(u32::MAX), entry.path()))
        })
        .collect();
    zones.sort();

    for (_, zone) in zones {
        let Ok(kind) = fs::read_to_string(zone.join("type")) else {
            continue;
        };
        let kind = kind.trim().to_lowercase();
        if !CPU_ZONE_MARKERS.iter().any(|m| kind.contains(m)) {
            continue;
        }

        match read_thermal_file(&zone.join("temp")) {
            Ok(celsius) => {
                debug!(zone = %zone.display(), zone_type = %kind, celsius, "cpu thermal zone selected");
                return Some(celsius);
            }
            Err(err) => trace!(error = %err, "cpu thermal zone unreadable"),
        }
    }

    None
}

fn expand_wildcard(pattern: &Path) -> Option<PathBuf> {
    let mut current = vec![PathBuf::new()];

    for component in pattern.components() {
        let Component::Normal(part) = component else {
            for base in &mut current {
                base.push(component.as_os_str());
            }
            continue;
        };
        let part = part.to_str()?;

        if !part.contains('*') {
            for base in &mut current {
                base.push(part);
            }
            continue;
        }

        let mut next = Vec::new();
        for base in &current {
            let Ok(entries) = fs::read_dir(base) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| wildcard_match(part, name))
                .collect();
            names.sort();
            next.extend(names.into_iter().map(|name| base.join(name)));
        }
        current = next;
    }

    current.into_iter().find(|p| p.exists())
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return true;
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for piece in middle {
        match rest.find(piece) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
