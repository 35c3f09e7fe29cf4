//! Live queue and operational status.
//!
//! Polled on every request and never cached. The derivation in
//! [`derive_status`] is fail-closed: a latency that cannot be read as a
//! number of minutes marks the attraction `CLOSED` rather than guessing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::error::Result;
use crate::graphql::GraphQlClient;
use crate::models::{EntityStatus, LivePoll, LiveStatusRecord, PoiKind, Queue, QueueType};
use crate::normalize::entity_id;

const POLLING_QUERY: &str = r#"query paxPolling {
  paxLatencies {
    drupalId
    latency
    isOpen
    message
    openingTime
    closingTime
  }
  paxSchedules {
    drupalId
    times {
      at
      startAt
      endAt
    }
  }
  paxMessages {
    id
    type
    label
    modalText
    modalImage
    url
    updatedAt
  }
}"#;

/// `data` member of a `paxPolling` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingData {
    #[serde(default)]
    pub pax_latencies: Option<Vec<PaxLatency>>,
    #[serde(default)]
    pub pax_schedules: Option<Vec<Value>>,
    #[serde(default)]
    pub pax_messages: Option<Vec<Value>>,
}

/// One `paxLatencies` entry as sent by the middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaxLatency {
    pub drupal_id: Value,
    #[serde(default)]
    pub latency: Value,
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub opening_time: Option<Value>,
    #[serde(default)]
    pub closing_time: Option<Value>,
}

pub struct LiveStatusPoller {
    client: Arc<GraphQlClient>,
    park_id: String,
}

impl LiveStatusPoller {
    pub fn new(client: Arc<GraphQlClient>, park_id: impl Into<String>) -> Self {
        Self {
            client,
            park_id: park_id.into(),
        }
    }

    /// Poll the middleware once, preserving upstream order.
    pub async fn fetch(&self) -> Result<LivePoll> {
        let data: PollingData = self.client.query(POLLING_QUERY, &[]).await?;
        let poll = to_poll(&self.park_id, data, Utc::now());

        tracing::debug!(park = %self.park_id, count = poll.records.len(), "live status polled");
        Ok(poll)
    }
}

/// Derive records from one response, stamped with `now`. Schedules and
/// messages are passed through as received.
pub fn to_poll(park_id: &str, data: PollingData, now: DateTime<Utc>) -> LivePoll {
    let records = data
        .pax_latencies
        .unwrap_or_default()
        .into_iter()
        .map(|raw| to_record(park_id, raw, now))
        .collect();

    LivePoll {
        records,
        schedules: data.pax_schedules,
        messages: data.pax_messages,
    }
}

/// Build the record for one upstream entry, stamped with `now`.
pub fn to_record(park_id: &str, raw: PaxLatency, now: DateTime<Utc>) -> LiveStatusRecord {
    let drupal_id = key_string(&raw.drupal_id);
    let (status, wait_time) = derive_status(raw.is_open, &raw.latency);

    if status == EntityStatus::Closed && raw.is_open != Some(false) {
        tracing::debug!(drupal_id = %drupal_id, latency = %raw.latency, "unreadable latency, reporting closed");
    }

    let queues = match (status, wait_time) {
        (EntityStatus::Operating, Some(_)) => vec![Queue {
            queue_type: QueueType::Standby,
            wait_time,
        }],
        _ => Vec::new(),
    };

    LiveStatusRecord {
        entity_id: entity_id(park_id, PoiKind::Attraction, &drupal_id),
        is_open: raw.is_open,
        status,
        wait_time,
        queues,
        message: raw.message,
        opening_time: raw.opening_time,
        closing_time: raw.closing_time,
        last_updated: now,
    }
}

/// Status and standby wait for one latency report.
///
/// - `isOpen == false`: closed, wait 0, whatever the latency says.
/// - null latency: operating, wait unknown.
/// - a non-negative number, or a string of digits: operating with that wait.
/// - anything else: closed, wait unknown. This includes negative and
///   non-finite numbers, which are treated as unreadable rather than used
///   as a wait.
pub fn derive_status(is_open: Option<bool>, latency: &Value) -> (EntityStatus, Option<u32>) {
    if is_open == Some(false) {
        return (EntityStatus::Closed, Some(0));
    }

    let wait = match latency {
        Value::Null => return (EntityStatus::Operating, None),
        Value::Number(n) => minutes_from_number(n),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    };

    match wait {
        Some(minutes) => (EntityStatus::Operating, Some(minutes)),
        None => (EntityStatus::Closed, None),
    }
}

fn minutes_from_number(n: &Number) -> Option<u32> {
    if let Some(v) = n.as_u64() {
        return u32::try_from(v).ok();
    }
    n.as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && *f <= f64::from(u32::MAX))
        .map(|f| f.round() as u32)
}

fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
