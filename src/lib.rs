//! # parkdata
//!
//! Ingestion and normalization pipeline for theme-park data.
//!
//! A park publishes its static data (points of interest, opening calendar,
//! day-type legends) as a versioned offline package: a zip archive wrapping
//! a SQLite database. Live wait times come from a separate polling query.
//! This crate keeps the snapshot current, reads it, derives absolute opening
//! intervals in the park's time zone, joins everything with live status and
//! emits park-agnostic [`models::NormalizedEntity`] values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Descriptor  │──▶│   Package     │──▶│ PoiRepository│──┐
//! │  (GraphQL)   │   │ Synchronizer  │   │   (SQLite)   │  │
//! └──────────────┘   └───────────────┘   └──────────────┘  │
//!                                                           ▼
//! ┌──────────────┐                       ┌──────────────┐  ┌────────────┐
//! │ paxLatencies │──────────────────────▶│  Normalizer  │◀─│ Schedule   │
//! │  (GraphQL)   │   LiveStatusPoller    │              │  │ + Legends  │
//! └──────────────┘                       └──────┬───────┘  └────────────┘
//!                                               ▼
//!                                        [NormalizedEntity]
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cache`] | TTL cache with single-flight and an injectable clock |
//! | [`config`] | TOML configuration parsing |
//! | [`destinations`] | Concrete parks |
//! | [`error`] | Error classification |
//! | [`graphql`] | GraphQL-over-HTTP client |
//! | [`legend`] | Free-text opening-hours parsing |
//! | [`live`] | Live status polling |
//! | [`models`] | Core data types |
//! | [`normalize`] | Canonical entity assembly and tag rules |
//! | [`package`] | Offline package synchronization |
//! | [`park`] | The `Park` contract and registry |
//! | [`repository`] | Snapshot queries |
//! | [`schedule`] | Opening-interval derivation |

pub mod cache;
pub mod config;
pub mod destinations;
pub mod error;
pub mod graphql;
pub mod legend;
pub mod live;
pub mod models;
pub mod normalize;
pub mod package;
pub mod park;
pub mod repository;
pub mod schedule;
