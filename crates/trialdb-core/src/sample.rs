use serde::Serialize;
use std::fmt;

/// Number of metric columns in every sample row.
pub const METRIC_COUNT: usize = 8;

/// One attempt's measurements, in [`Metric`] column order.
pub type SampleRow = [f64; METRIC_COUNT];

/// Row recorded for an attempt that reported `Failed`.
pub const FAILED_ROW: SampleRow = [f64::NAN; METRIC_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Packets,
    Retransmissions,
    LossPercent,
    Fragments,
    Frames,
    Bytes,
    Time,
    SecondaryTime,
}

impl Metric {
    pub const ALL: [Metric; METRIC_COUNT] = [
        Self::Packets,
        Self::Retransmissions,
        Self::LossPercent,
        Self::Fragments,
        Self::Frames,
        Self::Bytes,
        Self::Time,
        Self::SecondaryTime,
    ];

    /// Column index of this metric inside a [`SampleRow`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packets => write!(f, "packets"),
            Self::Retransmissions => write!(f, "retrans"),
            Self::LossPercent => write!(f, "loss"),
            Self::Fragments => write!(f, "fragments"),
            Self::Frames => write!(f, "frames"),
            Self::Bytes => write!(f, "bytes"),
            Self::Time => write!(f, "time"),
            Self::SecondaryTime => write!(f, "dtime"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "packets" => Ok(Self::Packets),
            "retrans" | "retransmissions" => Ok(Self::Retransmissions),
            "loss" => Ok(Self::LossPercent),
            "fragments" | "fragmts" => Ok(Self::Fragments),
            "frames" => Ok(Self::Frames),
            "bytes" => Ok(Self::Bytes),
            "time" => Ok(Self::Time),
            "dtime" | "secondary-time" => Ok(Self::SecondaryTime),
            _ => Err(format!("invalid metric: {s}")),
        }
    }
}

/// Per-trial measurement table: one row per attempt, eight metric columns.
///
/// A matrix always holds at least one row. A trial with no recognised
/// attempts is represented as `Option::<SampleMatrix>::None` instead.
///
/// Equality is bitwise per element, so rows of NaN compare equal to
/// themselves.
#[derive(Debug, Clone, Serialize)]
pub struct SampleMatrix {
    rows: Vec<SampleRow>,
}

impl SampleMatrix {
    /// Build a matrix from rows. Returns `None` for an empty row list.
    pub fn from_rows(rows: Vec<SampleRow>) -> Option<Self> {
        if rows.is_empty() {
            None
        } else {
            Some(Self { rows })
        }
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SampleRow> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Attempts recorded as failed (every column NaN).
    pub fn failed_attempts(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.iter().all(|v| v.is_nan()))
            .count()
    }

    pub fn column(&self, metric: Metric) -> Vec<f64> {
        self.rows.iter().map(|row| row[metric.index()]).collect()
    }

    /// Summary of one metric over the attempts that produced a value.
    pub fn summary(&self, metric: Metric) -> Option<MetricSummary> {
        let values: Vec<f64> = self
            .column(metric)
            .into_iter()
            .filter(|v| !v.is_nan())
            .collect();
        MetricSummary::from_values(&values)
    }
}

impl PartialEq for SampleMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(&other.rows)
                .all(|(a, b)| a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()))
    }
}

impl Eq for SampleMatrix {}

/// Row-wise concatenation of `old` followed by `new`. Absent is the identity.
pub fn merge(old: Option<SampleMatrix>, new: Option<SampleMatrix>) -> Option<SampleMatrix> {
    match (old, new) {
        (Some(mut old), Some(new)) => {
            old.rows.extend(new.rows);
            Some(old)
        }
        (old, None) => old,
        (None, new) => new,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}
