//! Core data types for member snapshots and detected changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp layout used for observation times and summaries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Activity status shown next to a member on the roster page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Unknown,
    Red,
    Orange,
    Green,
}

impl MemberStatus {
    /// Infer a status from a single CSS class token.
    ///
    /// Bootstrap contextual classes (`text-danger`, `badge-success`, ...) and
    /// plain colour names (`status-red`, `green`) are both recognised.
    pub fn from_class(class: &str) -> Self {
        let lower = class.to_ascii_lowercase();
        for part in lower.split(['-', '_']) {
            match part {
                "danger" | "red" => return Self::Red,
                "warning" | "orange" => return Self::Orange,
                "success" | "green" => return Self::Green,
                _ => {}
            }
        }
        Self::Unknown
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Green => "green",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member row as observed on the roster page.
///
/// Field names on disk match the baseline files written by earlier versions
/// of the tracker, so an existing `faction_data.json` loads unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "vehicule_tractate")]
    pub towed_count: u32,
    #[serde(rename = "vehicule_reparate", default)]
    pub repaired_count: u32,
    #[serde(rename = "rezervoare_umplute", default)]
    pub refill_count: u32,
    #[serde(default)]
    pub status: MemberStatus,
    #[serde(rename = "last_updated", with = "timestamp")]
    pub observed_at: NaiveDateTime,
}

impl MemberRecord {
    /// Create a record with all counters at zero and an unknown status.
    pub fn new(name: impl Into<String>, observed_at: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            towed_count: 0,
            repaired_count: 0,
            refill_count: 0,
            status: MemberStatus::Unknown,
            observed_at,
        }
    }

    pub fn with_counts(mut self, towed: u32, repaired: u32, refill: u32) -> Self {
        self.towed_count = towed;
        self.repaired_count = repaired;
        self.refill_count = refill;
        self
    }

    pub fn with_status(mut self, status: MemberStatus) -> Self {
        self.status = status;
        self
    }
}

/// All member records captured at one point in time, keyed by member name.
///
/// Backed by a `BTreeMap` so iteration is always in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    members: BTreeMap<String, MemberRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under its own name, returning the record it replaced.
    pub fn insert(&mut self, record: MemberRecord) -> Option<MemberRecord> {
        self.members.insert(record.name.clone(), record)
    }

    pub fn get(&self, name: &str) -> Option<&MemberRecord> {
        self.members.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Records in ascending name order.
    pub fn records(&self) -> impl Iterator<Item = &MemberRecord> {
        self.members.values()
    }

    /// Sum of every member's towed counter.
    pub fn total_towed(&self) -> u64 {
        self.members.values().map(|r| u64::from(r.towed_count)).sum()
    }

    /// Records ordered for the roster summary: most towed first, ties by name.
    pub fn leaderboard(&self) -> Vec<&MemberRecord> {
        let mut sorted: Vec<_> = self.members.values().collect();
        sorted.sort_by(|a, b| {
            b.towed_count
                .cmp(&a.towed_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        sorted
    }
}

impl FromIterator<MemberRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = MemberRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

impl Serialize for Snapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.members.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut members = BTreeMap::<String, MemberRecord>::deserialize(deserializer)?;
        // The name is the map key on disk, not a field of the record.
        for (name, record) in members.iter_mut() {
            record.name = name.clone();
        }
        Ok(Self { members })
    }
}

/// Towed counter went up between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterIncrease {
    pub name: String,
    pub from: u32,
    pub to: u32,
    pub delta: u32,
}

/// Towed counter went down between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDecrease {
    pub name: String,
    pub from: u32,
    pub to: u32,
}

/// Known status moved from one colour to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub name: String,
    pub from: MemberStatus,
    pub to: MemberStatus,
}

/// Structured result of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub joined: BTreeSet<String>,
    pub left: BTreeSet<String>,
    pub counter_increases: Vec<CounterIncrease>,
    pub status_changes: Vec<StatusChange>,
    /// Anomalies kept for logging. Never rendered as notifications.
    pub counter_decreases: Vec<CounterDecrease>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
            && self.left.is_empty()
            && self.counter_increases.is_empty()
            && self.status_changes.is_empty()
            && self.counter_decreases.is_empty()
    }

    /// Whether anyone joined or left.
    pub fn membership_changed(&self) -> bool {
        !self.joined.is_empty() || !self.left.is_empty()
    }

    /// Number of unit notifications the increases expand into.
    pub fn unit_events(&self) -> u64 {
        self.counter_increases
            .iter()
            .map(|c| u64::from(c.delta))
            .sum()
    }
}

/// A single outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub text: String,
    pub mention: Option<String>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mention: None,
        }
    }

    pub fn with_mention(mut self, mention: Option<&str>) -> Self {
        self.mention = mention.map(String::from);
        self
    }

    /// Text as posted to the chat, mention first.
    pub fn content(&self) -> String {
        match &self.mention {
            Some(tag) => format!("{tag} {}", self.text),
            None => self.text.clone(),
        }
    }
}

/// Errors reading or writing the persisted baseline.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Baseline JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience result type.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-04-16 12:00:00", TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_status_from_class() {
        assert_eq!(MemberStatus::from_class("text-danger"), MemberStatus::Red);
        assert_eq!(MemberStatus::from_class("badge-warning"), MemberStatus::Orange);
        assert_eq!(MemberStatus::from_class("status_green"), MemberStatus::Green);
        assert_eq!(MemberStatus::from_class("RED"), MemberStatus::Red);
        assert_eq!(MemberStatus::from_class("points-195032"), MemberStatus::Unknown);
        assert_eq!(MemberStatus::from_class("table-striped"), MemberStatus::Unknown);
    }

    #[test]
    fn test_leaderboard_order() {
        let snap: Snapshot = [
            MemberRecord::new("bob", at()).with_counts(5, 0, 0),
            MemberRecord::new("alice", at()).with_counts(5, 0, 0),
            MemberRecord::new("carol", at()).with_counts(9, 0, 0),
        ]
        .into_iter()
        .collect();

        let names: Vec<_> = snap.leaderboard().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
        assert_eq!(snap.total_towed(), 19);
    }

    #[test]
    fn test_snapshot_json_uses_legacy_keys() {
        let snap: Snapshot = [MemberRecord::new("Ion", at())
            .with_counts(3, 1, 2)
            .with_status(MemberStatus::Green)]
        .into_iter()
        .collect();

        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["Ion"]["vehicule_tractate"], 3);
        assert_eq!(value["Ion"]["vehicule_reparate"], 1);
        assert_eq!(value["Ion"]["rezervoare_umplute"], 2);
        assert_eq!(value["Ion"]["status"], "green");
        assert_eq!(value["Ion"]["last_updated"], "2025-04-16 12:00:00");
        assert!(value["Ion"].get("name").is_none());
    }

    #[test]
    fn test_legacy_record_without_status_loads() {
        let raw = r#"{
            "Ion": {
                "vehicule_tractate": 7,
                "vehicule_reparate": 0,
                "rezervoare_umplute": 1,
                "last_updated": "2025-04-16 12:00:00"
            }
        }"#;
        let snap: Snapshot = serde_json::from_str(raw).unwrap();
        let ion = snap.get("Ion").unwrap();
        assert_eq!(ion.name, "Ion");
        assert_eq!(ion.towed_count, 7);
        assert_eq!(ion.status, MemberStatus::Unknown);
    }

    #[test]
    fn test_message_content_with_mention() {
        let msg = Message::new("hello").with_mention(Some("<@42>"));
        assert_eq!(msg.content(), "<@42> hello");
        assert_eq!(Message::new("plain").content(), "plain");
    }
}
