//! The park contract and the registry of configured parks.
//!
//! Every destination implements [`Park`]. Callers (the CLI, tests, any
//! embedding service) only talk to `dyn Park`, so adding a destination
//! means adding one implementation and one registration in
//! [`ParkRegistry::from_config`].
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               ParkRegistry               │
//! │  ┌─────────────┐   ┌──────────────────┐  │
//! │  │ ParcAsterix │   │  further parks   │  │
//! │  └─────────────┘   └──────────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     attractions() / shows() / restaurants() / opening_times()
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;
use crate::models::{CalendarDay, LivePoll, NormalizedEntity, PlaceEntity, SnapshotHandle};

/// A theme park exposing normalized entities.
///
/// Every entity-returning operation is all-or-nothing: a fatal upstream,
/// configuration or package error fails the call and no partial list is
/// returned.
#[async_trait]
pub trait Park: Send + Sync {
    /// Stable park identifier, also the prefix of every entity id.
    fn id(&self) -> &str;

    /// Human-readable park name.
    fn name(&self) -> &str;

    /// Make sure the static data snapshot matches the latest published package.
    async fn sync(&self) -> Result<SnapshotHandle>;

    /// Attractions joined with live status.
    async fn attractions(&self) -> Result<Vec<NormalizedEntity>>;

    async fn shows(&self) -> Result<Vec<NormalizedEntity>>;

    async fn restaurants(&self) -> Result<Vec<NormalizedEntity>>;

    /// Opening intervals grouped by calendar day, from today onward.
    async fn opening_times(&self) -> Result<Vec<CalendarDay>>;

    /// One live poll, uncached, with any upstream schedules and messages.
    async fn live_status(&self) -> Result<LivePoll>;

    /// The destination (resort) this park belongs to.
    fn destination_entity(&self) -> PlaceEntity;

    /// Park entities under [`destination_entity`](Park::destination_entity).
    fn park_entities(&self) -> Vec<PlaceEntity>;
}

/// Parks known to this process, looked up by id.
#[derive(Default)]
pub struct ParkRegistry {
    parks: Vec<Arc<dyn Park>>,
}

impl ParkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the park described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::destinations::ParcAsterix;

        let mut registry = Self::new();
        registry.register(Arc::new(ParcAsterix::new(config.clone())?));
        Ok(registry)
    }

    pub fn register(&mut self, park: Arc<dyn Park>) {
        self.parks.push(park);
    }

    pub fn parks(&self) -> &[Arc<dyn Park>] {
        &self.parks
    }

    pub fn find(&self, id: &str) -> Option<Arc<dyn Park>> {
        self.parks.iter().find(|p| p.id() == id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.parks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parks.len()
    }
}
