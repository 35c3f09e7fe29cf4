//! End-to-end tests against a mock middleware.
//!
//! An axum server stands in for the GraphQL endpoint and the package host.
//! The package is a real zip wrapping a real SQLite database, with calendar
//! dates relative to today in Paris.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Timelike, Utc};
use chrono_tz::Europe::Paris;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tempfile::TempDir;

use parkdata::cache::ManualClock;
use parkdata::config::Config;
use parkdata::destinations::ParcAsterix;
use parkdata::error::ParkError;
use parkdata::models::{EntityStatus, EntityType, ScheduleKind, Tag};
use parkdata::park::{Park, ParkRegistry};

// ─── Mock upstream ──────────────────────────────────────────────────

struct MockState {
    port: u16,
    version: Mutex<String>,
    archive: Mutex<Vec<u8>>,
    live: Mutex<Value>,
    descriptor_null: AtomicBool,
    descriptor_error: AtomicBool,
    live_error: AtomicBool,
    stall: AtomicBool,
    descriptor_queries: AtomicUsize,
    live_queries: AtomicUsize,
    downloads: AtomicUsize,
    package_headers: Mutex<Vec<String>>,
}

impl MockState {
    fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    fn set_archive(&self, archive: Vec<u8>) {
        *self.archive.lock().unwrap() = archive;
    }

    fn set_live(&self, live: Value) {
        *self.live.lock().unwrap() = live;
    }
}

async fn graphql(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default();

    if state.stall.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    if query.contains("offlinePackageLast") {
        state.descriptor_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(v) = headers.get("x-package-version") {
            state
                .package_headers
                .lock()
                .unwrap()
                .push(v.to_str().unwrap_or_default().to_string());
        }
        if state.descriptor_error.load(Ordering::SeqCst) {
            return Json(json!({ "data": null, "errors": [{ "message": "internal failure" }] }));
        }
        if state.descriptor_null.load(Ordering::SeqCst) {
            return Json(json!({ "data": { "offlinePackageLast": null } }));
        }
        let version = state.version.lock().unwrap().clone();
        return Json(json!({
            "data": {
                "offlinePackageLast": {
                    "id": 7,
                    "version": version,
                    "url": format!("http://127.0.0.1:{}/package.zip", state.port),
                }
            }
        }));
    }

    if query.contains("paxLatencies") {
        state.live_queries.fetch_add(1, Ordering::SeqCst);
        if state.live_error.load(Ordering::SeqCst) {
            return Json(json!({ "errors": [{ "message": "polling unavailable" }] }));
        }
        let live = state.live.lock().unwrap().clone();
        return Json(json!({
            "data": {
                "paxLatencies": live,
                "paxSchedules": [{ "drupalId": 301, "times": [{ "at": "15:00", "startAt": null, "endAt": null }] }],
                "paxMessages": [{ "id": "m1", "type": "INFO", "label": "Parade", "modalText": null, "modalImage": null, "url": null, "updatedAt": "2025-07-01" }],
            }
        }));
    }

    Json(json!({ "errors": [{ "message": "unknown query" }] }))
}

async fn package(State(state): State<Arc<MockState>>) -> Vec<u8> {
    state.downloads.fetch_add(1, Ordering::SeqCst);
    state.archive.lock().unwrap().clone()
}

async fn start_upstream(archive: Vec<u8>) -> Arc<MockState> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let state = Arc::new(MockState {
        port,
        version: Mutex::new("2024.1".to_string()),
        archive: Mutex::new(archive),
        live: Mutex::new(json!([])),
        descriptor_null: AtomicBool::new(false),
        descriptor_error: AtomicBool::new(false),
        live_error: AtomicBool::new(false),
        stall: AtomicBool::new(false),
        descriptor_queries: AtomicUsize::new(0),
        live_queries: AtomicUsize::new(0),
        downloads: AtomicUsize::new(0),
        package_headers: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/graphql", post(graphql))
        .route("/package.zip", get(package))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    state
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

async fn snapshot_archive(dir: &Path) -> Vec<u8> {
    let db_path = dir.join("source.sqlite");
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePool::connect_with(options).await.unwrap();

    let today = Utc::now().with_timezone(&Paris).date_naive();
    let yesterday = today.pred_opt().unwrap();
    let tomorrow = today.succ_opt().unwrap();

    let statements = vec![
        "CREATE TABLE attractions (drupal_id INTEGER, title TEXT, experience TEXT, latitude REAL, longitude REAL, min_age INTEGER, min_size INTEGER, min_size_unaccompanied INTEGER)".to_string(),
        "CREATE TABLE restaurants (drupal_id INTEGER, title TEXT, meal_types TEXT, latitude REAL, longitude REAL, menu_url TEXT, mobile_url TEXT)".to_string(),
        "CREATE TABLE shows (drupal_id INTEGER, title TEXT, duration TEXT, latitude REAL, longitude REAL)".to_string(),
        "CREATE TABLE calendar_items (day TEXT, type TEXT)".to_string(),
        "CREATE TABLE labels (key TEXT, value TEXT)".to_string(),
        "INSERT INTO attractions VALUES (101, 'Toutatis', 'thrill', 49.1340, 2.5720, 8, 130, 140)".to_string(),
        "INSERT INTO attractions VALUES (102, 'Oziris', 'thrill', 49.1350, 2.5730, NULL, 120, NULL)".to_string(),
        "INSERT INTO attractions VALUES (103, 'Romus et Rapidus', 'family', 49.1360, 2.5740, NULL, NULL, NULL)".to_string(),
        "INSERT INTO restaurants VALUES (201, 'Le Relais Gaulois', 'lunch', 49.1370, 2.5750, 'https://example.test/menu.pdf', NULL)".to_string(),
        "INSERT INTO shows VALUES (301, 'Main Show', '25', 49.1380, 2.5760)".to_string(),
        format!("INSERT INTO calendar_items VALUES ('{yesterday}', 'A')"),
        format!("INSERT INTO calendar_items VALUES ('{today}', 'A')"),
        format!("INSERT INTO calendar_items VALUES ('{tomorrow}', 'X')"),
        "INSERT INTO labels VALUES ('calendar.dateType.legend.A', '10h - 18h')".to_string(),
        "INSERT INTO labels VALUES ('menu.title', 'Menu')".to_string(),
    ];
    for sql in &statements {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let db = std::fs::read(&db_path).unwrap();
    zip_with(&[
        ("README.txt", &b"offline package"[..]),
        ("data/parcasterix.sqlite", &db[..]),
    ])
}

fn config_for(state: &MockState, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.upstream.api_base = format!("http://127.0.0.1:{}/graphql", state.port);
    config.upstream.timeout_secs = 5;
    config.cache.snapshot_dir = Some(dir.path().join("snapshots"));
    config
}

async fn setup() -> (TempDir, Arc<MockState>, Config) {
    let tmp = TempDir::new().unwrap();
    let archive = snapshot_archive(tmp.path()).await;
    let state = start_upstream(archive).await;
    let config = config_for(&state, &tmp);
    (tmp, state, config)
}

// ─── Package synchronization ────────────────────────────────────────

#[tokio::test]
async fn test_unchanged_version_downloads_once() {
    let (_tmp, state, config) = setup().await;
    let park = ParcAsterix::new(config).unwrap();

    let first = park.sync().await.unwrap();
    let second = park.sync().await.unwrap();

    assert_eq!(first, second);
    assert!(first.path.exists());
    assert_eq!(first.package_version, "2024.1");
    assert_eq!(park.download_count(), 1);
    assert_eq!(state.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(state.descriptor_queries.load(Ordering::SeqCst), 2);
    assert!(state
        .package_headers
        .lock()
        .unwrap()
        .iter()
        .all(|h| h == "1.1.29"));
}

#[tokio::test]
async fn test_new_version_replaces_snapshot() {
    let (_tmp, state, config) = setup().await;
    let park = ParcAsterix::new(config).unwrap();

    let old = park.sync().await.unwrap();
    state.set_version("2024.2");
    let new = park.sync().await.unwrap();

    assert_ne!(old.path, new.path);
    assert_eq!(new.package_version, "2024.2");
    assert!(new.path.exists());
    assert!(!old.path.exists(), "stale snapshot should be removed");
    assert_eq!(state.downloads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_deleted_snapshot_is_downloaded_again() {
    let (_tmp, state, config) = setup().await;
    let park = ParcAsterix::new(config).unwrap();

    let first = park.sync().await.unwrap();
    std::fs::remove_file(&first.path).unwrap();
    let second = park.sync().await.unwrap();

    assert!(second.path.exists());
    assert_eq!(state.downloads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_archive_without_database_is_package_format_error() {
    let (_tmp, state, config) = setup().await;
    state.set_archive(zip_with(&[("park.json", &b"{}"[..])]));
    let park = ParcAsterix::new(config).unwrap();

    let err = park.sync().await.unwrap_err();
    assert!(matches!(err, ParkError::PackageFormat(_)), "got {err:?}");
}

#[tokio::test]
async fn test_missing_descriptor_is_configuration_error() {
    let (_tmp, state, config) = setup().await;
    state.descriptor_null.store(true, Ordering::SeqCst);
    let park = ParcAsterix::new(config).unwrap();

    let err = park.attractions().await.unwrap_err();
    assert!(matches!(err, ParkError::Configuration(_)), "got {err:?}");
}

#[tokio::test]
async fn test_graphql_error_payload_is_upstream_error() {
    let (_tmp, state, config) = setup().await;
    state.descriptor_error.store(true, Ordering::SeqCst);
    let park = ParcAsterix::new(config).unwrap();

    let err = park.sync().await.unwrap_err();
    assert!(matches!(err, ParkError::Upstream(_)), "got {err:?}");
    assert_eq!(state.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_is_upstream_error() {
    let tmp = TempDir::new().unwrap();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = Config::default();
    config.upstream.api_base = format!("http://127.0.0.1:{port}/graphql");
    config.upstream.timeout_secs = 2;
    config.cache.snapshot_dir = Some(tmp.path().to_path_buf());
    let park = ParcAsterix::new(config).unwrap();

    let err = park.live_status().await.unwrap_err();
    assert!(matches!(err, ParkError::Upstream(_)), "got {err:?}");
}

#[tokio::test]
async fn test_hung_upstream_times_out_as_upstream_error() {
    let (_tmp, state, mut config) = setup().await;
    state.stall.store(true, Ordering::SeqCst);
    config.upstream.timeout_secs = 1;
    let park = ParcAsterix::new(config).unwrap();

    let err = park.live_status().await.unwrap_err();
    assert!(
        matches!(&err, ParkError::Upstream(msg) if msg.contains("timed out")),
        "got {err:?}"
    );

    let err = park.sync().await.unwrap_err();
    assert!(
        matches!(&err, ParkError::Upstream(msg) if msg.contains("timed out")),
        "got {err:?}"
    );
    assert_eq!(state.downloads.load(Ordering::SeqCst), 0);
}

// ─── Entities ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_cold_read_resolves_package_once() {
    let (_tmp, state, config) = setup().await;
    let park = ParcAsterix::new(config).unwrap();

    let attractions = park.attractions().await.unwrap();
    assert_eq!(attractions.len(), 3);
    assert_eq!(state.descriptor_queries.load(Ordering::SeqCst), 1);
    assert_eq!(state.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_attractions_joined_with_live_status() {
    let (_tmp, state, config) = setup().await;
    state.set_live(json!([
        { "drupalId": 101, "latency": "25", "isOpen": true, "message": null },
        { "drupalId": "102", "latency": "abc", "isOpen": true },
        { "drupalId": 999, "latency": 5, "isOpen": true },
    ]));
    let park = ParcAsterix::new(config).unwrap();

    let attractions = park.attractions().await.unwrap();
    assert_eq!(attractions.len(), 3);

    let toutatis = &attractions[0];
    assert_eq!(toutatis.id, "parcasterix-101");
    assert_eq!(toutatis.name, "Toutatis");
    assert_eq!(toutatis.entity_type, EntityType::Attraction);
    assert_eq!(toutatis.status, EntityStatus::Operating);
    assert_eq!(toutatis.wait_time, Some(25));
    assert!(toutatis.tags.contains(&Tag::Thrill));
    assert_eq!(toutatis.location.lat, Some(49.1340));

    let oziris = &attractions[1];
    assert_eq!(oziris.status, EntityStatus::Closed);
    assert_eq!(oziris.wait_time, None);

    let romus = &attractions[2];
    assert_eq!(romus.status, EntityStatus::Unknown);
    assert!(romus.queues.is_empty());
    assert!(romus.tags.contains(&Tag::Family));

    // Yesterday is filtered, today is open 10h-18h, tomorrow has no legend.
    let schedules = &toutatis.schedules;
    assert_eq!(schedules.len(), 2);
    assert_eq!(schedules[0].kind, ScheduleKind::Operating);
    assert_eq!(schedules[0].opening_time.unwrap().hour(), 10);
    assert_eq!(schedules[0].closing_time.unwrap().hour(), 18);
    assert_eq!(schedules[1].kind, ScheduleKind::Closed);
    assert!(schedules[1].opening_time.is_none());
    assert_eq!(romus.schedules, toutatis.schedules);
}

#[tokio::test]
async fn test_live_failure_fails_the_whole_read() {
    let (_tmp, state, config) = setup().await;
    state.live_error.store(true, Ordering::SeqCst);
    let park = ParcAsterix::new(config).unwrap();

    let err = park.attractions().await.unwrap_err();
    assert!(matches!(err, ParkError::Upstream(_)), "got {err:?}");
}

#[tokio::test]
async fn test_static_data_cached_live_data_polled() {
    let (_tmp, state, config) = setup().await;
    let park = ParcAsterix::new(config).unwrap();

    park.attractions().await.unwrap();
    let descriptor_queries = state.descriptor_queries.load(Ordering::SeqCst);
    park.attractions().await.unwrap();

    assert_eq!(state.descriptor_queries.load(Ordering::SeqCst), descriptor_queries);
    assert_eq!(state.live_queries.load(Ordering::SeqCst), 2);
    assert_eq!(state.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_ttl_rechecks_package_without_download() {
    let (_tmp, state, config) = setup().await;
    let clock = Arc::new(ManualClock::new());
    let park = ParcAsterix::with_clock(config, clock.clone()).unwrap();

    park.attractions().await.unwrap();
    let descriptor_queries = state.descriptor_queries.load(Ordering::SeqCst);

    clock.advance(Duration::from_secs(3601));
    park.attractions().await.unwrap();

    assert!(state.descriptor_queries.load(Ordering::SeqCst) > descriptor_queries);
    assert_eq!(state.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shows_and_restaurants_skip_live_poll() {
    let (_tmp, state, config) = setup().await;
    state.set_live(json!([{ "drupalId": 301, "latency": 10, "isOpen": true }]));
    let park = ParcAsterix::new(config).unwrap();

    let shows = park.shows().await.unwrap();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0].id, "parcasterix-show-301");
    assert_eq!(shows[0].entity_type, EntityType::Show);
    assert_eq!(shows[0].status, EntityStatus::Unknown);

    let restaurants = park.restaurants().await.unwrap();
    assert_eq!(restaurants[0].id, "parcasterix-restaurant-201");
    assert_eq!(restaurants[0].menu, vec!["https://example.test/menu.pdf".to_string()]);
    assert!(restaurants[0].tags.is_empty());

    assert_eq!(state.live_queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_opening_times_grouped_by_day() {
    let (_tmp, _state, config) = setup().await;
    let park = ParcAsterix::new(config).unwrap();

    let days = park.opening_times().await.unwrap();
    let today = Utc::now().with_timezone(&Paris).date_naive();

    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, today);
    assert_eq!(days[0].day_type, "A");
    assert_eq!(days[0].intervals.len(), 1);
    assert_eq!(days[1].day_type, "X");
    assert_eq!(days[1].intervals[0].kind, ScheduleKind::Closed);
}

#[tokio::test]
async fn test_registry_resolves_configured_park() {
    let (_tmp, state, config) = setup().await;
    state.set_live(json!([{ "drupalId": 103, "latency": null, "isOpen": false }]));

    let registry = ParkRegistry::from_config(&config).unwrap();
    assert_eq!(registry.len(), 1);
    let park = registry.find("parcasterix").unwrap();
    assert_eq!(park.name(), "Parc Astérix");

    let live = park.live_status().await.unwrap();
    assert_eq!(live.records[0].entity_id, "parcasterix-103");
    assert_eq!(live.records[0].status, EntityStatus::Closed);
    assert_eq!(live.records[0].wait_time, Some(0));
    let schedules = live.schedules.unwrap();
    assert_eq!(schedules[0]["times"][0]["at"], "15:00");
    assert_eq!(live.messages.unwrap()[0]["label"], "Parade");
    assert!(registry.find("efteling").is_none());
}
