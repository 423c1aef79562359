//! In-memory document store with the same index and permission rules as the
//! hosted store.
//!
//! Used three ways: as the deterministic test double, as the backend for JSON
//! fixture directories, and as the container for synthetic demo contests.
//!
//! Composite-index rule: a query needs a declared composite index when it filters
//! on two or more distinct fields, or filters on one field and orders by another.
//! Single-field filters, single-field ordering and unfiltered reads never need one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::document::{Collection, Document, Filter, Query};
use super::store::{DocumentStore, StoreError};

/// Largest number of values one `in` filter may carry.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// A declared composite index: the set of fields a query filters and orders on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeIndex {
    pub collection: Collection,
    pub fields: Vec<String>,
}

impl CompositeIndex {
    fn covers(&self, collection: Collection, required: &BTreeSet<&str>) -> bool {
        if self.collection != collection || self.fields.len() != required.len() {
            return false;
        }
        self.fields.iter().all(|f| required.contains(f.as_str()))
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    collections: BTreeMap<Collection, Vec<Document>>,
    indexes: Vec<CompositeIndex>,
    denied: BTreeSet<Collection>,
    missing: BTreeSet<Collection>,
    failing_queries: BTreeSet<Collection>,
    batch_limit: usize,
    reads: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            name: "memory".into(),
            collections: BTreeMap::new(),
            indexes: Vec::new(),
            denied: BTreeSet::new(),
            missing: BTreeSet::new(),
            failing_queries: BTreeSet::new(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append documents to a collection, preserving their order.
    pub fn with_documents(mut self, collection: Collection, docs: Vec<Document>) -> Self {
        self.collections.entry(collection).or_default().extend(docs);
        self
    }

    pub fn insert(&mut self, collection: Collection, doc: Document) {
        self.collections.entry(collection).or_default().push(doc);
    }

    /// Declare a composite index over `fields` (filter fields plus the order field).
    pub fn with_index(mut self, collection: Collection, fields: &[&str]) -> Self {
        self.add_index(CompositeIndex {
            collection,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn add_index(&mut self, index: CompositeIndex) {
        if !self.indexes.contains(&index) {
            self.indexes.push(index);
        }
    }

    /// Every read of `collection` fails with `PermissionDenied`.
    pub fn deny(mut self, collection: Collection) -> Self {
        self.denied.insert(collection);
        self
    }

    /// Queries against `collection` fail with `NotFound`.
    pub fn mark_missing(mut self, collection: Collection) -> Self {
        self.missing.insert(collection);
        self
    }

    /// Queries (not point reads) against `collection` fail with `Unavailable`.
    pub fn fail_queries(mut self, collection: Collection) -> Self {
        self.failing_queries.insert(collection);
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Number of store round-trips served so far (queries and point reads).
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn documents(&self, collection: Collection) -> &[Document] {
        self.collections
            .get(&collection)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn indexes(&self) -> &[CompositeIndex] {
        &self.indexes
    }

    fn check_index(&self, query: &Query) -> Result<(), StoreError> {
        let filter_fields: BTreeSet<&str> = query.filters.iter().map(Filter::field).collect();
        let order_field = query.order.as_ref().map(|o| o.field.as_str());

        let needs_index = filter_fields.len() >= 2
            || (!filter_fields.is_empty()
                && order_field.is_some_and(|o| !filter_fields.contains(o)));
        if !needs_index {
            return Ok(());
        }

        let mut required = filter_fields;
        if let Some(o) = order_field {
            required.insert(o);
        }
        if self
            .indexes
            .iter()
            .any(|idx| idx.covers(query.collection, &required))
        {
            return Ok(());
        }
        Err(StoreError::IndexUnavailable {
            collection: query.collection,
            detail: format!(
                "no composite index on ({})",
                required.into_iter().collect::<Vec<_>>().join(", ")
            ),
        })
    }

    fn check_batch_limit(&self, query: &Query) -> Result<(), StoreError> {
        for filter in &query.filters {
            if let Filter::In(field, values) = filter {
                if values.len() > self.batch_limit {
                    return Err(StoreError::InvalidQuery(format!(
                        "'in' filter on {field} has {} values (limit {})",
                        values.len(),
                        self.batch_limit
                    )));
                }
            }
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let collection = query.collection;
        if self.denied.contains(&collection) {
            return Err(StoreError::PermissionDenied { collection });
        }
        if self.missing.contains(&collection) {
            return Err(StoreError::NotFound { collection });
        }
        if self.failing_queries.contains(&collection) {
            return Err(StoreError::Unavailable(format!(
                "query on {collection} timed out"
            )));
        }
        self.check_batch_limit(query)?;
        self.check_index(query)?;

        Ok(query.apply_in_memory(self.documents(collection).to_vec()))
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.denied.contains(&collection) {
            return Err(StoreError::PermissionDenied { collection });
        }
        Ok(self
            .documents(collection)
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }
}
