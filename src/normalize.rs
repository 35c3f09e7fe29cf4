//! Canonical entity assembly.
//!
//! [`normalize`] joins snapshot POIs with live status by canonical id,
//! attaches the park schedule and evaluates tag rules. Tag rules fail open:
//! a predicate returning `Err` leaves its tag off and nothing else changes.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;

use crate::models::{
    EntityStatus, EntityType, LiveStatusRecord, Location, NormalizedEntity, OpeningInterval,
    PoiDetails, PoiKind, PoiRecord, Tag,
};

type Predicate = Box<dyn Fn(&PoiRecord) -> anyhow::Result<bool> + Send + Sync>;

/// A tag and the predicate that grants it.
pub struct TagRule {
    pub tag: Tag,
    predicate: Predicate,
}

impl TagRule {
    pub fn new<F>(tag: Tag, predicate: F) -> Self
    where
        F: Fn(&PoiRecord) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            tag,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, record: &PoiRecord) -> bool {
        match (self.predicate)(record) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::debug!(tag = ?self.tag, drupal_id = %record.drupal_id, error = %e, "tag predicate failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for TagRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRule").field("tag", &self.tag).finish_non_exhaustive()
    }
}

/// Tags granted to `record` by `rules`, evaluated in order.
pub fn map_tags(record: &PoiRecord, rules: &[TagRule]) -> BTreeSet<Tag> {
    rules
        .iter()
        .filter(|rule| rule.matches(record))
        .map(|rule| rule.tag)
        .collect()
}

/// Canonical id of a POI. Attractions use the bare park prefix.
pub fn entity_id(park_id: &str, kind: PoiKind, drupal_id: &str) -> String {
    match kind {
        PoiKind::Attraction => format!("{park_id}-{drupal_id}"),
        PoiKind::Show => format!("{park_id}-show-{drupal_id}"),
        PoiKind::Restaurant => format!("{park_id}-restaurant-{drupal_id}"),
    }
}

/// One [`NormalizedEntity`] per POI, in input order.
///
/// POIs without a live record report `UNKNOWN` with no wait and no queues.
/// Every entity receives a copy of the full `schedule`.
pub fn normalize(
    park_id: &str,
    pois: &[PoiRecord],
    schedule: &[OpeningInterval],
    live: &[LiveStatusRecord],
    rules: &[TagRule],
) -> Vec<NormalizedEntity> {
    let by_id: HashMap<&str, &LiveStatusRecord> =
        live.iter().map(|r| (r.entity_id.as_str(), r)).collect();
    let now = Utc::now();

    pois.iter()
        .map(|poi| {
            let kind = poi.kind();
            let id = entity_id(park_id, kind, &poi.drupal_id);
            let (status, wait_time, queues) = match by_id.get(id.as_str()) {
                Some(record) => (record.status, record.wait_time, record.queues.clone()),
                None => (EntityStatus::Unknown, None, Vec::new()),
            };

            let menu = match &poi.details {
                PoiDetails::Restaurant {
                    menu_url: Some(url), ..
                } if !url.trim().is_empty() => vec![url.clone()],
                _ => Vec::new(),
            };

            NormalizedEntity {
                id,
                name: poi.title.clone(),
                entity_type: EntityType::from(kind),
                location: Location {
                    lat: poi.latitude,
                    lng: poi.longitude,
                },
                tags: map_tags(poi, rules),
                status,
                wait_time,
                queues,
                menu,
                schedules: schedule.to_vec(),
                last_updated: now,
            }
        })
        .collect()
}

/// Experience-based rules applied to attractions.
pub fn default_attraction_rules() -> Vec<TagRule> {
    vec![
        TagRule::new(Tag::Thrill, |poi| Ok(experience(poi)? == "thrill")),
        TagRule::new(Tag::Family, |poi| Ok(experience(poi)? == "family")),
        TagRule::new(Tag::Kids, |poi| Ok(experience(poi)? == "kids")),
    ]
}

fn experience(poi: &PoiRecord) -> anyhow::Result<String> {
    match &poi.details {
        PoiDetails::Attraction {
            experience: Some(value),
            ..
        } => Ok(value.trim().to_ascii_lowercase()),
        PoiDetails::Attraction { .. } => anyhow::bail!("attraction has no experience"),
        other => anyhow::bail!("{:?} has no experience column", other.kind()),
    }
}
