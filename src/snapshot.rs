use chrono::{DateTime, Utc};
use serde::Serialize;

/// One complete collection cycle. Never mutated after it is built.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub disk: Metric<DiskStat>,
    pub memory: Metric<UsageStat>,
    pub cpu: Metric<CpuStat>,
    pub gpus: Vec<GpuStat>,
    pub captured_at: DateTime<Utc>,
}

/// Either a reading or the reason it could not be taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Metric<T> {
    Available(T),
    Unavailable { error: String },
}

impl<T> Metric<T> {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self::Unavailable {
            error: error.into(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { error } => Some(error),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Metric<T> {
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(v) => Self::Available(v),
            Err(err) => Self::unavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageStat {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
}

impl UsageStat {
    pub fn new(total_bytes: u64, used_bytes: u64) -> Self {
        Self {
            total_bytes,
            used_bytes,
            used_percent: used_percent(used_bytes, total_bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStat {
    pub mount: String,
    #[serde(flatten)]
    pub usage: UsageStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuStat {
    pub usage_percent: f64,
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuKind {
    Nvidia,
    Amd,
    Integrated,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuStat {
    pub kind: GpuKind,
    pub name: String,
    pub usage_percent: f64,
    pub temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn used_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_percent((used as f64 / total as f64) * 100.0)
}

pub fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_percent_handles_zero_total() {
        assert_eq!(used_percent(0, 0), 0.0);
        assert_eq!(used_percent(10, 0), 0.0);
    }

    #[test]
    fn used_percent_stays_in_range() {
        assert_eq!(used_percent(50, 200), 25.0);
        assert_eq!(used_percent(200, 200), 100.0);
        assert_eq!(used_percent(300, 200), 100.0);
        assert_eq!(UsageStat::new(1000, 0).used_percent, 0.0);
    }

    #[test]
    fn metric_from_result_keeps_error_text() {
        let ok: Metric<u32> = Ok::<u32, String>(3).into();
        assert_eq!(ok.value(), Some(&3));
        assert_eq!(ok.error(), None);

        let err: Metric<u32> = Err::<u32, String>("path not mounted".to_string()).into();
        assert_eq!(err.value(), None);
        assert_eq!(err.error(), Some("path not mounted"));
    }

    #[test]
    fn unavailable_serializes_with_status_tag() {
        let m: Metric<UsageStat> = Metric::unavailable("boom");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["error"], "boom");

        let m = Metric::Available(UsageStat::new(4, 1));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["status"], "available");
        assert_eq!(json["used_percent"], 25.0);
    }
}
