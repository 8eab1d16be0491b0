//! Generic repository seam and the log-specific store built on it.
//!
//! [`Repository`] is the keyed CRUD surface shared by every persisted
//! entity.  [`LogStore`] adds the time-based queries the document logger
//! needs.  Both use manually desugared async methods so they stay object
//! safe.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::LogRecord;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A value with a stable identity.
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
}

impl Entity for LogRecord {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Keyed storage for one entity type.
pub trait Repository<T: Entity>: Send + Sync {
    fn get(&self, id: &T::Id) -> BoxFuture<'_, anyhow::Result<Option<T>>>;

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<T>>>;

    /// Insert or replace by id.
    fn insert(&self, entity: T) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Returns whether anything was removed.
    fn delete(&self, id: &T::Id) -> BoxFuture<'_, anyhow::Result<bool>>;
}

/// Time-ordered log persistence.
pub trait LogStore: Send + Sync + 'static {
    fn append(&self, record: LogRecord) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Remove every record stamped strictly before `cutoff`.
    fn delete_before(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, anyhow::Result<u64>>;

    /// The `limit` most recent records, newest first.
    fn latest(&self, limit: usize) -> BoxFuture<'_, anyhow::Result<Vec<LogRecord>>>;

    /// Records with `begin <= timestamp < end`, newest first.
    fn between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, anyhow::Result<Vec<LogRecord>>>;
}

/// Process-local repository.  Backs tests and deployments without a
/// database.
pub struct MemoryRepository<T: Entity> {
    items: RwLock<HashMap<T::Id, T>>,
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> for MemoryRepository<T> {
    fn get(&self, id: &T::Id) -> BoxFuture<'_, anyhow::Result<Option<T>>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.items.read().await.get(&id).cloned()) })
    }

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<T>>> {
        Box::pin(async move { Ok(self.items.read().await.values().cloned().collect()) })
    }

    fn insert(&self, entity: T) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.items.write().await.insert(entity.id(), entity);
            Ok(())
        })
    }

    fn delete(&self, id: &T::Id) -> BoxFuture<'_, anyhow::Result<bool>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.items.write().await.remove(&id).is_some()) })
    }
}

fn newest_first(records: &mut [LogRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

impl LogStore for MemoryRepository<LogRecord> {
    fn append(&self, record: LogRecord) -> BoxFuture<'_, anyhow::Result<()>> {
        Repository::insert(self, record)
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, anyhow::Result<u64>> {
        Box::pin(async move {
            let mut items = self.items.write().await;
            let before = items.len();
            items.retain(|_, r| r.timestamp >= cutoff);
            Ok((before - items.len()) as u64)
        })
    }

    fn latest(&self, limit: usize) -> BoxFuture<'_, anyhow::Result<Vec<LogRecord>>> {
        Box::pin(async move {
            let mut records: Vec<LogRecord> = self.items.read().await.values().cloned().collect();
            newest_first(&mut records);
            records.truncate(limit);
            Ok(records)
        })
    }

    fn between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, anyhow::Result<Vec<LogRecord>>> {
        Box::pin(async move {
            let mut records: Vec<LogRecord> = self
                .items
                .read()
                .await
                .values()
                .filter(|r| r.timestamp >= begin && r.timestamp < end)
                .cloned()
                .collect();
            newest_first(&mut records);
            Ok(records)
        })
    }
}
