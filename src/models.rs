//! Core data models used throughout parkdata.
//!
//! Raw records ([`PoiRecord`], [`CalendarRow`]) come out of the package
//! snapshot; [`LiveStatusRecord`] comes out of the live poll; everything
//! downstream consumers see is a [`NormalizedEntity`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Versioned pointer to a downloadable data archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageDescriptor {
    #[serde(deserialize_with = "opaque_token")]
    pub id: String,
    /// Opaque token, compared by equality only.
    #[serde(deserialize_with = "opaque_token")]
    pub version: String,
    #[serde(rename = "url")]
    pub download_url: String,
}

/// Accept strings and numbers alike; upstream is not consistent.
fn opaque_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Location of an extracted snapshot and the package version it came from.
///
/// Obtain a fresh handle per logical operation: a newer synchronization
/// deletes the file behind older handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotHandle {
    pub path: PathBuf,
    pub package_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiKind {
    Attraction,
    Restaurant,
    Show,
}

/// Kind-specific columns of a point of interest.
#[derive(Debug, Clone, PartialEq)]
pub enum PoiDetails {
    Attraction {
        experience: Option<String>,
        min_age: Option<i64>,
        min_size: Option<i64>,
        min_size_unaccompanied: Option<i64>,
    },
    Restaurant {
        meal_types: Option<String>,
        menu_url: Option<String>,
        mobile_url: Option<String>,
    },
    Show {
        duration: Option<String>,
    },
}

impl PoiDetails {
    pub fn kind(&self) -> PoiKind {
        match self {
            PoiDetails::Attraction { .. } => PoiKind::Attraction,
            PoiDetails::Restaurant { .. } => PoiKind::Restaurant,
            PoiDetails::Show { .. } => PoiKind::Show,
        }
    }
}

/// A point of interest as stored in the package snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiRecord {
    /// Stable upstream key, unique within a kind.
    pub drupal_id: String,
    pub title: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub details: PoiDetails,
}

impl PoiRecord {
    pub fn kind(&self) -> PoiKind {
        self.details.kind()
    }
}

/// A `calendar_items` row: one park-local date and its day-type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarRow {
    pub date: NaiveDate,
    pub day_type: String,
}

/// Hour and minute on a 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

/// One opening window. `end` earlier than `start` crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

/// Opening-hour meaning of a calendar day-type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendRule {
    pub type_key: String,
    pub ranges: Vec<TimeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleKind {
    Operating,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningInterval {
    pub date: NaiveDate,
    pub opening_time: Option<DateTime<FixedOffset>>,
    pub closing_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub day_type: String,
    pub intervals: Vec<OpeningInterval>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityStatus {
    Operating,
    Closed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueType {
    #[serde(rename = "STANDBY")]
    Standby,
    #[serde(rename = "SINGLERIDER")]
    SingleRider,
    #[serde(rename = "FASTPASS")]
    Fastpass,
    #[serde(rename = "VIRTUAL")]
    Virtual,
}

/// One line/queue mode and its wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    pub wait_time: Option<u32>,
}

/// Live state of one attraction, as derived from a single poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatusRecord {
    pub entity_id: String,
    pub is_open: Option<bool>,
    pub status: EntityStatus,
    pub wait_time: Option<u32>,
    pub queues: Vec<Queue>,
    /// Upstream fields carried through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_time: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_time: Option<Value>,
    pub last_updated: DateTime<Utc>,
}

/// Everything one live poll returned.
///
/// `schedules` (`paxSchedules`) and `messages` (`paxMessages`) are optional
/// upstream extras, carried through exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePoll {
    pub records: Vec<LiveStatusRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedules: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Destination,
    Park,
    Attraction,
    Restaurant,
    Show,
}

impl From<PoiKind> for EntityType {
    fn from(kind: PoiKind) -> Self {
        match kind {
            PoiKind::Attraction => EntityType::Attraction,
            PoiKind::Restaurant => EntityType::Restaurant,
            PoiKind::Show => EntityType::Show,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Thrill,
    Family,
    Indoor,
    Outdoor,
    Water,
    Kids,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Canonical, park-agnostic entity handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEntity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub location: Location,
    pub tags: BTreeSet<Tag>,
    pub status: EntityStatus,
    pub wait_time: Option<u32>,
    pub queues: Vec<Queue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub menu: Vec<String>,
    pub schedules: Vec<OpeningInterval>,
    pub last_updated: DateTime<Utc>,
}

/// Destination or park descriptor (the containers entities live in).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceEntity {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub location: Location,
}
