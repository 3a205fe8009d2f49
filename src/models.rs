use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const STATUS_CHOICES: [&str; 3] = ["solved", "processing", "not_solved"];

/// Lifecycle status of a report.
///
/// Values outside the three known ones are kept verbatim so a payload
/// written by another tool survives a load/save cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Status {
    #[default]
    Processing,
    Solved,
    NotSolved,
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status \"{0}\"; enter one of: solved, processing, not_solved")]
pub struct InvalidStatus(pub String);

/// How a status is displayed and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Solved,
    InProgress,
    Unresolved,
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Processing => "processing",
            Status::Solved => "solved",
            Status::NotSolved => "not_solved",
            Status::Unrecognized(raw) => raw,
        }
    }

    /// The one classification every status-dependent rule goes through.
    pub fn class(&self) -> StatusClass {
        match self {
            Status::Solved => StatusClass::Solved,
            Status::Processing => StatusClass::InProgress,
            Status::NotSolved | Status::Unrecognized(_) => StatusClass::Unresolved,
        }
    }

    pub fn is_active(&self) -> bool {
        self.class() != StatusClass::Solved
    }
}

impl StatusClass {
    pub fn icon(&self) -> &'static str {
        match self {
            StatusClass::Solved => "✔️",
            StatusClass::InProgress => "⏳",
            StatusClass::Unresolved => "❌",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            StatusClass::Solved => "green",
            StatusClass::InProgress => "orange",
            StatusClass::Unresolved => "red",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solved" => Ok(Status::Solved),
            "processing" => Ok(Status::Processing),
            "not_solved" => Ok(Status::NotSolved),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

impl From<Option<String>> for Status {
    fn from(raw: Option<String>) -> Self {
        match raw {
            None => Status::Processing,
            Some(raw) if raw.is_empty() => Status::Processing,
            Some(raw) => raw.parse().unwrap_or(Status::Unrecognized(raw)),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Nil for records written without an id; see [`assign_missing_ids`].
    #[serde(default)]
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub village: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub symptom: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub water_quality: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: String,
    #[serde(default = "default_count", deserialize_with = "positive_count")]
    pub count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: i64,
    #[serde(default)]
    pub status: Status,
}

impl Report {
    pub fn has_water_issue(&self) -> bool {
        !self.water_quality.is_empty() && self.water_quality != "none"
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }
}

const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_7a0b_93d4_4f62_a8e1_2b6d_0c4f_91a3);

/// Gives records stored without an id one derived from their storage
/// position and contents, so the same payload yields the same ids on
/// every load.
pub fn assign_missing_ids(reports: &mut [Report]) -> usize {
    let mut assigned = 0;
    for (index, report) in reports.iter_mut().enumerate() {
        if !report.id.is_nil() {
            continue;
        }
        let key = format!("{index}:{}:{}", report.time, report.village);
        report.id = Uuid::new_v5(&LEGACY_ID_NAMESPACE, key.as_bytes());
        assigned += 1;
    }
    assigned
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_count() -> u32 {
    1
}

fn positive_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let count = Option::<u32>::deserialize(deserializer)?;
    Ok(count.filter(|n| *n > 0).unwrap_or_else(default_count))
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) if value.is_empty() => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}
