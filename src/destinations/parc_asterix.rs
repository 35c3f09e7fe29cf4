//! Parc Astérix.
//!
//! Static data (POIs, calendar, legends) comes from the offline package and
//! is cached per data kind. Live data is polled on every attraction read and
//! joined behind a `try_join!` barrier, so any fatal failure on either side
//! fails the whole read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::OnceCell;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::{self, Config};
use crate::error::{ParkError, Result};
use crate::graphql::GraphQlClient;
use crate::live::LiveStatusPoller;
use crate::models::{
    CalendarDay, EntityType, LivePoll, Location, NormalizedEntity, OpeningInterval,
    PlaceEntity, PoiKind, PoiRecord, SnapshotHandle,
};
use crate::normalize::{self, TagRule};
use crate::package::PackageSynchronizer;
use crate::park::Park;
use crate::repository::PoiRepository;
use crate::schedule;

const PARK_SLUG: &str = "ParcAsterixPark";
const LATITUDE: f64 = 49.136750;
const LONGITUDE: f64 = 2.573816;

pub struct ParcAsterix {
    config: Config,
    tz: Tz,
    packages: PackageSynchronizer,
    live: LiveStatusPoller,
    pois: TtlCache<Arc<Vec<PoiRecord>>>,
    calendar: TtlCache<Arc<Vec<CalendarDay>>>,
    attraction_rules: Vec<TagRule>,
}

impl ParcAsterix {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit cache clock.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config::validate(&config).map_err(|e| ParkError::Configuration(format!("{e:#}")))?;
        let tz = config
            .park
            .tz()
            .map_err(|e| ParkError::Configuration(format!("{e:#}")))?;

        let client = Arc::new(GraphQlClient::new(&config.upstream)?);
        let packages = PackageSynchronizer::new(
            client.clone(),
            config.park.id.clone(),
            config.upstream.package_version.clone(),
            config.cache.snapshot_dir(),
        );
        let live = LiveStatusPoller::new(client, config.park.id.clone());

        Ok(Self {
            tz,
            packages,
            live,
            pois: TtlCache::with_clock(clock.clone()),
            calendar: TtlCache::with_clock(clock),
            attraction_rules: normalize::default_attraction_rules(),
            config,
        })
    }

    /// Number of package archives downloaded so far.
    pub fn download_count(&self) -> usize {
        self.packages.download_count()
    }

    fn ttl(&self, kind: PoiKind) -> Duration {
        let cache = &self.config.cache;
        Duration::from_secs(match kind {
            PoiKind::Attraction => cache.attractions_ttl_secs,
            PoiKind::Show => cache.shows_ttl_secs,
            PoiKind::Restaurant => cache.restaurants_ttl_secs,
        })
    }

    /// Snapshot handle for one read, synchronized at most once and only
    /// when some cache slot actually misses.
    async fn snapshot<'a>(&self, handle: &'a OnceCell<SnapshotHandle>) -> Result<&'a SnapshotHandle> {
        handle.get_or_try_init(|| self.packages.ensure_current()).await
    }

    async fn load_pois(&self, kind: PoiKind, handle: &OnceCell<SnapshotHandle>) -> Result<Arc<Vec<PoiRecord>>> {
        let key = format!("{}:{}", self.config.park.id, kind_key(kind));
        self.pois
            .get_or_compute(&key, self.ttl(kind), move || async move {
                let handle = self.snapshot(handle).await?;
                let repo = PoiRepository::open(handle).await?;
                let records = repo.pois(kind).await;
                repo.close().await;
                Ok::<_, ParkError>(Arc::new(records?))
            })
            .await
    }

    async fn load_calendar(&self, handle: &OnceCell<SnapshotHandle>) -> Result<Arc<Vec<CalendarDay>>> {
        let key = format!("{}:calendar", self.config.park.id);
        let ttl = Duration::from_secs(self.config.cache.calendar_ttl_secs);
        self.calendar
            .get_or_compute(&key, ttl, move || async move {
                let handle = self.snapshot(handle).await?;
                let today = Utc::now().with_timezone(&self.tz).date_naive();

                let repo = PoiRepository::open(handle).await?;
                let rows = repo.calendar_rows(today).await;
                let labels = repo.legend_labels().await;
                repo.close().await;
                let (rows, labels) = (rows?, labels?);

                let rules = schedule::legend_rules(labels.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                let legends = schedule::legends_by_type(&rules);
                Ok::<_, ParkError>(Arc::new(schedule::build_calendar(&rows, &legends, self.tz)))
            })
            .await
    }

    async fn entities(&self, kind: PoiKind) -> Result<Vec<NormalizedEntity>> {
        // POIs and calendar read the same snapshot.
        let handle = OnceCell::new();

        // Live ids only ever name attractions.
        let (pois, calendar, live) = match kind {
            PoiKind::Attraction => {
                let (pois, calendar, poll) = tokio::try_join!(
                    self.load_pois(kind, &handle),
                    self.load_calendar(&handle),
                    self.live.fetch()
                )?;
                (pois, calendar, poll.records)
            }
            _ => {
                let (pois, calendar) =
                    tokio::try_join!(self.load_pois(kind, &handle), self.load_calendar(&handle))?;
                (pois, calendar, Vec::new())
            }
        };

        let schedule: Vec<OpeningInterval> = calendar
            .iter()
            .flat_map(|day| day.intervals.iter().cloned())
            .collect();
        let rules: &[TagRule] = match kind {
            PoiKind::Attraction => &self.attraction_rules,
            _ => &[],
        };

        let entities = normalize::normalize(&self.config.park.id, &pois, &schedule, &live, rules);
        tracing::info!(park = %self.config.park.id, kind = kind_key(kind), count = entities.len(), "entities normalized");
        Ok(entities)
    }
}

fn kind_key(kind: PoiKind) -> &'static str {
    match kind {
        PoiKind::Attraction => "attractions",
        PoiKind::Show => "shows",
        PoiKind::Restaurant => "restaurants",
    }
}

fn park_location() -> Location {
    Location {
        lat: Some(LATITUDE),
        lng: Some(LONGITUDE),
    }
}

#[async_trait]
impl Park for ParcAsterix {
    fn id(&self) -> &str {
        &self.config.park.id
    }

    fn name(&self) -> &str {
        &self.config.park.name
    }

    async fn sync(&self) -> Result<SnapshotHandle> {
        self.packages.ensure_current().await
    }

    async fn attractions(&self) -> Result<Vec<NormalizedEntity>> {
        self.entities(PoiKind::Attraction).await
    }

    async fn shows(&self) -> Result<Vec<NormalizedEntity>> {
        self.entities(PoiKind::Show).await
    }

    async fn restaurants(&self) -> Result<Vec<NormalizedEntity>> {
        self.entities(PoiKind::Restaurant).await
    }

    async fn opening_times(&self) -> Result<Vec<CalendarDay>> {
        Ok(self.load_calendar(&OnceCell::new()).await?.as_ref().clone())
    }

    async fn live_status(&self) -> Result<LivePoll> {
        self.live.fetch().await
    }

    fn destination_entity(&self) -> PlaceEntity {
        PlaceEntity {
            id: self.config.park.id.clone(),
            slug: self.config.park.id.clone(),
            name: self.config.park.name.clone(),
            entity_type: EntityType::Destination,
            destination_id: None,
            parent_id: None,
            location: park_location(),
        }
    }

    fn park_entities(&self) -> Vec<PlaceEntity> {
        let destination = self.config.park.id.clone();
        vec![PlaceEntity {
            id: format!("{destination}park"),
            slug: PARK_SLUG.to_string(),
            name: self.config.park.name.clone(),
            entity_type: EntityType::Park,
            destination_id: Some(destination.clone()),
            parent_id: Some(destination),
            location: park_location(),
        }]
    }
}
