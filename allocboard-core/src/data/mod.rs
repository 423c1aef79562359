//! Resilient data access: store seam, fallback ladder, analytics snapshot.

pub mod document;
pub mod fetch;
pub mod fixture;
pub mod memory;
pub mod snapshot;
pub mod store;
pub mod strategy;

pub use document::{Collection, Direction, Document, Filter, KeyHint, OrderBy, Query};
pub use fetch::{AttemptOutcome, FetchAttempt, FetchOutcome, FetchReport, ResilientFetcher};
pub use fixture::FixtureError;
pub use memory::{CompositeIndex, MemoryStore, DEFAULT_BATCH_LIMIT};
pub use snapshot::{AnalyticsSnapshot, SnapshotLoader};
pub use store::{DocumentStore, StoreError};
pub use strategy::{key_candidates, FetchPolicy, FetchStrategy};
