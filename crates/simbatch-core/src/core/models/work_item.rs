use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier of a single run within a batch.
///
/// Sources produce numeric identifiers whenever the raw token parses as an
/// unsigned integer (e.g. a nuclide code such as `481090000000`), and fall back
/// to named identifiers otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkItemId {
    Numeric(u64),
    Named(String),
}

impl WorkItemId {
    /// Formats the identifier left-padded with zeros to at least `width` characters.
    pub fn zero_padded(&self, width: usize) -> String {
        match self {
            WorkItemId::Numeric(n) => format!("{:0width$}", n, width = width),
            WorkItemId::Named(s) => format!("{:0>width$}", s, width = width),
        }
    }

    pub fn as_numeric(&self) -> Option<u64> {
        match self {
            WorkItemId::Numeric(n) => Some(*n),
            WorkItemId::Named(_) => None,
        }
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemId::Numeric(n) => n.fmt(f),
            WorkItemId::Named(s) => s.fmt(f),
        }
    }
}

impl From<u64> for WorkItemId {
    fn from(n: u64) -> Self {
        WorkItemId::Numeric(n)
    }
}

impl From<&str> for WorkItemId {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| WorkItemId::Named(s.to_string()))
    }
}

impl FromStr for WorkItemId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<u64>() {
            Ok(n) => WorkItemId::Numeric(n),
            Err(_) => WorkItemId::Named(trimmed.to_string()),
        })
    }
}

/// One unit of batch work: an identifier, a weighting value and free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub value: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(id: impl Into<WorkItemId>, value: f64) -> Self {
        Self {
            id: id.into(),
            value,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Number of events to simulate for this item.
    ///
    /// The value is rounded to the nearest integer; negative and NaN values yield zero.
    pub fn event_count(&self) -> u64 {
        let rounded = self.value.round();
        if rounded.is_nan() || rounded <= 0.0 {
            0
        } else {
            rounded as u64
        }
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
