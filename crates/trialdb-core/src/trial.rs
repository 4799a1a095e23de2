use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TrialError, TrialResult};
use crate::sample::SampleMatrix;

/// Filter value meaning "any value" in the raw four-integer query encoding.
pub const WILDCARD: i64 = -1;

/// Identifier of one experiment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialKey {
    pub traffic_interval: u32,
    pub receive_ratio: u32,
    pub unit_size: u32,
    pub data_size: u32,
}

impl TrialKey {
    pub fn new(traffic_interval: u32, receive_ratio: u32, unit_size: u32, data_size: u32) -> Self {
        Self {
            traffic_interval,
            receive_ratio,
            unit_size,
            data_size,
        }
    }

    /// Derive the key from a log filename of the form
    /// `<int>_<int>_<int>_<int>_<anything>.log`.
    pub fn from_log_name(name: &str) -> TrialResult<Self> {
        let malformed = || TrialError::MalformedFilename(name.to_string());

        let stem = name.strip_suffix(".log").ok_or_else(malformed)?;
        let mut parts = stem.splitn(5, '_');
        let mut fields = [0u32; 4];
        for field in &mut fields {
            let part = parts.next().ok_or_else(malformed)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            *field = part.parse().map_err(|_| malformed())?;
        }
        // The free-form suffix must be present, even if empty.
        parts.next().ok_or_else(malformed)?;

        let [traffic_interval, receive_ratio, unit_size, data_size] = fields;
        Ok(Self::new(traffic_interval, receive_ratio, unit_size, data_size))
    }
}

impl fmt::Display for TrialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.traffic_interval, self.receive_ratio, self.unit_size, self.data_size
        )
    }
}

/// A stored trial. `samples` is `None` for a failed trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub key: TrialKey,
    pub samples: Option<SampleMatrix>,
}

impl Record {
    pub fn new(key: TrialKey, samples: Option<SampleMatrix>) -> Self {
        Self { key, samples }
    }

    pub fn is_failed(&self) -> bool {
        self.samples.is_none()
    }
}

/// Query filter over the four key fields; `None` matches any value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialFilter {
    pub traffic_interval: Option<u32>,
    pub receive_ratio: Option<u32>,
    pub unit_size: Option<u32>,
    pub data_size: Option<u32>,
}

impl TrialFilter {
    /// Matches every record.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches exactly one key.
    pub fn exact(key: TrialKey) -> Self {
        Self {
            traffic_interval: Some(key.traffic_interval),
            receive_ratio: Some(key.receive_ratio),
            unit_size: Some(key.unit_size),
            data_size: Some(key.data_size),
        }
    }

    /// Decode the four-integer form where [`WILDCARD`] means "any".
    pub fn from_raw(raw: [i64; 4]) -> TrialResult<Self> {
        let field = |v: i64| -> TrialResult<Option<u32>> {
            if v == WILDCARD {
                return Ok(None);
            }
            u32::try_from(v)
                .map(Some)
                .map_err(|_| TrialError::InvalidFilter(format!("key value out of range: {v}")))
        };
        Ok(Self {
            traffic_interval: field(raw[0])?,
            receive_ratio: field(raw[1])?,
            unit_size: field(raw[2])?,
            data_size: field(raw[3])?,
        })
    }

    pub fn traffic_interval(mut self, v: u32) -> Self {
        self.traffic_interval = Some(v);
        self
    }

    pub fn receive_ratio(mut self, v: u32) -> Self {
        self.receive_ratio = Some(v);
        self
    }

    pub fn unit_size(mut self, v: u32) -> Self {
        self.unit_size = Some(v);
        self
    }

    pub fn data_size(mut self, v: u32) -> Self {
        self.data_size = Some(v);
        self
    }

    /// Column/value pairs for every concrete field, in key order.
    pub fn conditions(&self) -> Vec<(&'static str, u32)> {
        [
            ("traffic_interval", self.traffic_interval),
            ("receive_ratio", self.receive_ratio),
            ("unit_size", self.unit_size),
            ("data_size", self.data_size),
        ]
        .into_iter()
        .filter_map(|(col, v)| v.map(|v| (col, v)))
        .collect()
    }

    pub fn matches(&self, key: &TrialKey) -> bool {
        self.traffic_interval.map_or(true, |v| v == key.traffic_interval)
            && self.receive_ratio.map_or(true, |v| v == key.receive_ratio)
            && self.unit_size.map_or(true, |v| v == key.unit_size)
            && self.data_size.map_or(true, |v| v == key.data_size)
    }
}

/// How to resolve an insert whose key already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the existing record untouched.
    #[default]
    Ignore,
    /// Overwrite the existing matrix.
    Replace,
    /// Append the new rows after the existing ones.
    Merge,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Replace => write!(f, "replace"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            _ => Err(format!("invalid conflict policy: {s}")),
        }
    }
}

/// Result of a single insert. Only `Inserted` means the key was new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertOutcome {
    Inserted,
    Ignored,
    Replaced,
    Merged,
}

impl InsertOutcome {
    pub fn is_conflict(self) -> bool {
        self != Self::Inserted
    }
}

impl fmt::Display for InsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Ignored => write!(f, "conflict ignored"),
            Self::Replaced => write!(f, "conflict replaced"),
            Self::Merged => write!(f, "conflict merged"),
        }
    }
}

/// Per-outcome counts for a batch of inserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertTally {
    pub inserted: usize,
    pub ignored: usize,
    pub replaced: usize,
    pub merged: usize,
}

impl InsertTally {
    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::Ignored => self.ignored += 1,
            InsertOutcome::Replaced => self.replaced += 1,
            InsertOutcome::Merged => self.merged += 1,
        }
    }

    pub fn conflicts(&self) -> usize {
        self.ignored + self.replaced + self.merged
    }

    pub fn total(&self) -> usize {
        self.inserted + self.conflicts()
    }
}

/// Sorted distinct values of each key field across a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyValues {
    pub traffic_intervals: Vec<u32>,
    pub receive_ratios: Vec<u32>,
    pub unit_sizes: Vec<u32>,
    pub data_sizes: Vec<u32>,
}
