//! Allocboard Core: contest records, resilient document-store access, analytics snapshots.
//!
//! This crate contains everything the analytics engine reads from:
//! - Domain records (weeks, allocations, weekly balances, balances, users, instruments)
//! - ISO week ids and the `${weekId}_${uid}` document key scheme
//! - The `DocumentStore` seam plus an in-memory / JSON-fixture implementation
//! - The degradation ladder (indexed → filtered → scan → key lookup)
//! - The analytics snapshot: all collections fetched once, decoded, fingerprinted
//!
//! The crate never writes to the store.

pub mod data;
pub mod domain;

pub use data::{
    AnalyticsSnapshot, Collection, Document, DocumentStore, FetchPolicy, FetchReport,
    FetchStrategy, Filter, KeyHint, MemoryStore, OrderBy, Query, ResilientFetcher,
    SnapshotLoader, StoreError,
};
pub use domain::{
    Allocation, Balance, Instrument, MarketSnapshot, RecordError, User, Week, WeekId, WeekStatus,
    WeeklyBalance,
};

/// Initial capital every participant starts with; also the balance assumed for
/// users that never completed a week.
pub const SEED_BALANCE: f64 = 100_000.0;
