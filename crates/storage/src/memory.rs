//! In-memory `MarketStorage` backend.
//!
//! Snapshots are serialized behind a single writer lock. A snapshot stages
//! only the rows it writes, layered over the committed tables; committing
//! folds the staged rows in, aborting or dropping the snapshot discards them.
//! Readers outside a snapshot only ever see committed tables and never wait
//! for an open snapshot.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StorageError;
use crate::record::{
    table, AttributeRecord, MoneyEventKind, MoneyEventRecord, ProfileRecord, QueryFilter,
    QueryRecord, RatingRecord, ResponseRecord,
};
use crate::traits::MarketStorage;

#[derive(Debug, Default)]
struct Tables {
    profiles: BTreeMap<String, ProfileRecord>,
    queries: BTreeMap<String, QueryRecord>,
    /// Query ids in insertion order.
    query_order: Vec<String>,
    responses: BTreeMap<String, ResponseRecord>,
    response_order: Vec<String>,
    /// `query_id` → `response_id`, the UNIQUE index on responses.
    response_by_query: BTreeMap<String, String>,
    /// `response_id` → rating, the UNIQUE index on ratings.
    ratings: BTreeMap<String, RatingRecord>,
    /// Append-only, grouped by user in insertion order.
    money_events: BTreeMap<String, Vec<MoneyEventRecord>>,
    money_event_ids: HashSet<String>,
    /// `(user_id, key)` → attribute.
    attributes: BTreeMap<(String, String), AttributeRecord>,
}

/// Rows written by an open snapshot.
#[derive(Debug, Default)]
struct Staged {
    profiles: BTreeMap<String, ProfileRecord>,
    queries: BTreeMap<String, QueryRecord>,
    new_queries: Vec<String>,
    responses: Vec<ResponseRecord>,
    ratings: BTreeMap<String, RatingRecord>,
    money_events: Vec<MoneyEventRecord>,
    /// `None` marks a deletion.
    attributes: BTreeMap<(String, String), Option<AttributeRecord>>,
}

/// An open transaction against [`MemoryStorage`].
pub struct MemorySnapshot {
    _writer: OwnedMutexGuard<()>,
    staged: Staged,
}

/// Process-local storage backend, used by `parley serve` and the test suites.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    committed: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn staged_profile(&self, staged: &Staged, user_id: &str) -> Option<ProfileRecord> {
        staged
            .profiles
            .get(user_id)
            .cloned()
            .or_else(|| self.committed.read().profiles.get(user_id).cloned())
    }

    fn staged_query(&self, staged: &Staged, query_id: &str) -> Option<QueryRecord> {
        staged
            .queries
            .get(query_id)
            .cloned()
            .or_else(|| self.committed.read().queries.get(query_id).cloned())
    }
}

impl Tables {
    fn apply(&mut self, staged: Staged) {
        self.profiles.extend(staged.profiles);
        self.query_order.extend(staged.new_queries);
        self.queries.extend(staged.queries);
        for response in staged.responses {
            self.response_by_query
                .insert(response.query_id.clone(), response.id.clone());
            self.response_order.push(response.id.clone());
            self.responses.insert(response.id.clone(), response);
        }
        self.ratings.extend(staged.ratings);
        for event in staged.money_events {
            self.money_event_ids.insert(event.id.clone());
            self.money_events
                .entry(event.user_id.clone())
                .or_default()
                .push(event);
        }
        for (key, attribute) in staged.attributes {
            match attribute {
                Some(attribute) => {
                    self.attributes.insert(key, attribute);
                }
                None => {
                    self.attributes.remove(&key);
                }
            }
        }
    }
}

#[async_trait]
impl MarketStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        Ok(MemorySnapshot {
            _writer: writer,
            staged: Staged::default(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot { _writer, staged } = snapshot;
        self.committed.write().apply(staged);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_profile(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ProfileRecord,
    ) -> Result<(), StorageError> {
        if self
            .staged_profile(&snapshot.staged, &record.user_id)
            .is_some()
        {
            return Err(StorageError::already_exists(
                table::PROFILES,
                &record.user_id,
            ));
        }
        snapshot
            .staged
            .profiles
            .insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn get_profile_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        user_id: &str,
    ) -> Result<ProfileRecord, StorageError> {
        self.staged_profile(&snapshot.staged, user_id)
            .ok_or_else(|| StorageError::not_found(table::PROFILES, user_id))
    }

    async fn update_profile(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ProfileRecord,
    ) -> Result<(), StorageError> {
        if self
            .staged_profile(&snapshot.staged, &record.user_id)
            .is_none()
        {
            return Err(StorageError::not_found(table::PROFILES, &record.user_id));
        }
        snapshot
            .staged
            .profiles
            .insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn insert_query(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QueryRecord,
    ) -> Result<(), StorageError> {
        if self.staged_query(&snapshot.staged, &record.id).is_some() {
            return Err(StorageError::already_exists(table::QUERIES, &record.id));
        }
        let staged = &mut snapshot.staged;
        staged.new_queries.push(record.id.clone());
        staged.queries.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_query_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        query_id: &str,
    ) -> Result<QueryRecord, StorageError> {
        self.staged_query(&snapshot.staged, query_id)
            .ok_or_else(|| StorageError::not_found(table::QUERIES, query_id))
    }

    async fn list_queries_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        filter: &QueryFilter,
    ) -> Result<Vec<QueryRecord>, StorageError> {
        let staged = &snapshot.staged;
        let committed = self.committed.read();
        Ok(committed
            .query_order
            .iter()
            .chain(staged.new_queries.iter())
            .filter_map(|id| staged.queries.get(id).or_else(|| committed.queries.get(id)))
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }

    async fn update_query(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QueryRecord,
    ) -> Result<(), StorageError> {
        if self.staged_query(&snapshot.staged, &record.id).is_none() {
            return Err(StorageError::not_found(table::QUERIES, &record.id));
        }
        snapshot.staged.queries.insert(record.id.clone(), record);
        Ok(())
    }

    async fn insert_response(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ResponseRecord,
    ) -> Result<(), StorageError> {
        let staged = &mut snapshot.staged;
        let (id_taken, query_answered) = {
            let committed = self.committed.read();
            (
                committed.responses.contains_key(&record.id),
                committed.response_by_query.contains_key(&record.query_id),
            )
        };
        if id_taken || staged.responses.iter().any(|r| r.id == record.id) {
            return Err(StorageError::already_exists(table::RESPONSES, &record.id));
        }
        if query_answered || staged.responses.iter().any(|r| r.query_id == record.query_id) {
            return Err(StorageError::UniqueViolation {
                table: table::RESPONSES,
                column: "query_id",
                value: record.query_id.clone(),
            });
        }
        staged.responses.push(record);
        Ok(())
    }

    async fn get_response_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        response_id: &str,
    ) -> Result<ResponseRecord, StorageError> {
        snapshot
            .staged
            .responses
            .iter()
            .find(|r| r.id == response_id)
            .cloned()
            .or_else(|| self.committed.read().responses.get(response_id).cloned())
            .ok_or_else(|| StorageError::not_found(table::RESPONSES, response_id))
    }

    async fn insert_rating(
        &self,
        snapshot: &mut MemorySnapshot,
        record: RatingRecord,
    ) -> Result<(), StorageError> {
        let ratings = &mut snapshot.staged.ratings;
        if ratings.contains_key(&record.response_id)
            || self
                .committed
                .read()
                .ratings
                .contains_key(&record.response_id)
        {
            return Err(StorageError::UniqueViolation {
                table: table::RATINGS,
                column: "response_id",
                value: record.response_id.clone(),
            });
        }
        ratings.insert(record.response_id.clone(), record);
        Ok(())
    }

    async fn insert_money_event(
        &self,
        snapshot: &mut MemorySnapshot,
        record: MoneyEventRecord,
    ) -> Result<(), StorageError> {
        let events = &mut snapshot.staged.money_events;
        if events.iter().any(|e| e.id == record.id)
            || self.committed.read().money_event_ids.contains(&record.id)
        {
            return Err(StorageError::already_exists(table::MONEY_EVENTS, &record.id));
        }
        events.push(record);
        Ok(())
    }

    async fn upsert_attribute(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AttributeRecord,
    ) -> Result<AttributeRecord, StorageError> {
        let key = (record.user_id.clone(), record.key.clone());
        let existing = match snapshot.staged.attributes.get(&key) {
            Some(staged) => staged.clone(),
            None => self.committed.read().attributes.get(&key).cloned(),
        };
        let stored = match existing {
            Some(mut existing) => {
                existing.value = record.value;
                existing
            }
            None => record,
        };
        snapshot
            .staged
            .attributes
            .insert(key, Some(stored.clone()));
        Ok(stored)
    }

    async fn delete_attribute(
        &self,
        snapshot: &mut MemorySnapshot,
        user_id: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        let key = (user_id.to_string(), key.to_string());
        let present = match snapshot.staged.attributes.get(&key) {
            Some(staged) => staged.is_some(),
            None => self.committed.read().attributes.contains_key(&key),
        };
        if !present {
            return Err(StorageError::not_found(
                table::ATTRIBUTES,
                &format!("{}/{}", key.0, key.1),
            ));
        }
        snapshot.staged.attributes.insert(key, None);
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<ProfileRecord, StorageError> {
        self.committed
            .read()
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(table::PROFILES, user_id))
    }

    async fn get_query(&self, query_id: &str) -> Result<QueryRecord, StorageError> {
        self.committed
            .read()
            .queries
            .get(query_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(table::QUERIES, query_id))
    }

    async fn get_response(&self, response_id: &str) -> Result<ResponseRecord, StorageError> {
        self.committed
            .read()
            .responses
            .get(response_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(table::RESPONSES, response_id))
    }

    async fn get_rating_for_response(
        &self,
        response_id: &str,
    ) -> Result<Option<RatingRecord>, StorageError> {
        Ok(self.committed.read().ratings.get(response_id).cloned())
    }

    async fn list_queries(&self, filter: &QueryFilter) -> Result<Vec<QueryRecord>, StorageError> {
        let tables = self.committed.read();
        Ok(tables
            .query_order
            .iter()
            .filter_map(|id| tables.queries.get(id))
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }

    async fn list_responses(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<ResponseRecord>, StorageError> {
        let tables = self.committed.read();
        Ok(tables
            .response_order
            .iter()
            .filter_map(|id| tables.responses.get(id))
            .filter(|r| owner_id.map_or(true, |owner| r.owner_id == owner))
            .cloned()
            .collect())
    }

    async fn list_money_events(
        &self,
        user_id: &str,
        kind: Option<MoneyEventKind>,
    ) -> Result<Vec<MoneyEventRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .money_events
            .get(user_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| kind.map_or(true, |k| e.kind == k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_attributes(&self, user_id: &str) -> Result<Vec<AttributeRecord>, StorageError> {
        Ok(self
            .committed
            .read()
            .attributes
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
