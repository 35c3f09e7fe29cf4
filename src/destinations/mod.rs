//! Concrete [`Park`](crate::park::Park) implementations.
//!
//! - **[`ParcAsterix`]**: GraphQL middleware, offline SQLite package and
//!   `paxLatencies` live polling.

mod parc_asterix;

pub use parc_asterix::ParcAsterix;
