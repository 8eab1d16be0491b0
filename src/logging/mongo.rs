//! MongoDB-backed repository and log store.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::repository::{Entity, LogStore, Repository};
use super::{LogArgs, LogLevel, LogRecord};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Collection that holds log documents.
pub const LOG_COLLECTION: &str = "Logs";

/// A [`Repository`] over one MongoDB collection, keyed by `_id`.
pub struct MongoRepository<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> MongoRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin,
    T::Id: Into<Bson>,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }
}

impl<T> Repository<T> for MongoRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin,
    T::Id: Into<Bson>,
{
    fn get(&self, id: &T::Id) -> BoxFuture<'_, anyhow::Result<Option<T>>> {
        let id: Bson = id.clone().into();
        let filter = doc! { "_id": id };
        Box::pin(async move { Ok(self.collection.find_one(filter).await?) })
    }

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<T>>> {
        Box::pin(async move {
            let cursor = self.collection.find(doc! {}).await?;
            Ok(cursor.try_collect().await?)
        })
    }

    fn insert(&self, entity: T) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let id: Bson = entity.id().into();
            let filter = doc! { "_id": id };
            self.collection
                .replace_one(filter, &entity)
                .upsert(true)
                .await?;
            Ok(())
        })
    }

    fn delete(&self, id: &T::Id) -> BoxFuture<'_, anyhow::Result<bool>> {
        let id: Bson = id.clone().into();
        let filter = doc! { "_id": id };
        Box::pin(async move {
            let result = self.collection.delete_one(filter).await?;
            Ok(result.deleted_count > 0)
        })
    }
}

/// Stored shape of a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub timestamp: bson::DateTime,
    pub source: String,
    pub level: String,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Entity for LogDocument {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

impl From<LogRecord> for LogDocument {
    fn from(record: LogRecord) -> Self {
        Self {
            id: record.id.to_string(),
            timestamp: bson::DateTime::from_millis(record.timestamp.timestamp_millis()),
            source: record.source,
            level: record.level.to_string(),
            category: record.category,
            message: record.message,
            args: record.args.to_pairs(),
        }
    }
}

impl From<LogDocument> for LogRecord {
    fn from(doc: LogDocument) -> Self {
        Self {
            id: Uuid::parse_str(&doc.id).unwrap_or_else(|_| Uuid::nil()),
            timestamp: DateTime::<Utc>::from_timestamp_millis(doc.timestamp.timestamp_millis())
                .unwrap_or_default(),
            source: doc.source,
            level: LogLevel::from(doc.level),
            category: doc.category,
            message: doc.message,
            args: LogArgs::from_pairs(doc.args),
        }
    }
}

fn to_bson_time(ts: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(ts.timestamp_millis())
}

/// Database named in the connection string, else `fallback`.
pub fn resolve_database(options: &ClientOptions, fallback: &str) -> String {
    options
        .default_database
        .clone()
        .filter(|db| !db.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// [`LogStore`] backed by the `Logs` collection.
pub struct MongoLogStore {
    repo: MongoRepository<LogDocument>,
}

impl MongoLogStore {
    /// Parse `conn` and bind to its log collection.  The driver connects
    /// lazily, so an unreachable server surfaces on first use.
    pub async fn connect(conn: &str, fallback_db: &str) -> anyhow::Result<Self> {
        let options = ClientOptions::parse(conn).await?;
        let database = resolve_database(&options, fallback_db);
        let client = Client::with_options(options)?;
        info!(
            "MongoDB log store bound to {}.{}",
            database, LOG_COLLECTION
        );
        let collection = client
            .database(&database)
            .collection::<LogDocument>(LOG_COLLECTION);
        Ok(Self {
            repo: MongoRepository::new(collection),
        })
    }

    /// Keyed access to the stored documents.
    pub fn repository(&self) -> &dyn Repository<LogDocument> {
        &self.repo
    }

    async fn find_sorted(
        &self,
        filter: bson::Document,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<LogRecord>> {
        let find = self
            .repo
            .collection()
            .find(filter)
            .sort(doc! { "timestamp": -1 });
        let cursor = match limit {
            Some(n) => find.limit(n).await?,
            None => find.await?,
        };
        let docs: Vec<LogDocument> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(LogRecord::from).collect())
    }
}

impl LogStore for MongoLogStore {
    fn append(&self, record: LogRecord) -> BoxFuture<'_, anyhow::Result<()>> {
        let document = LogDocument::from(record);
        Box::pin(async move { self.repo.insert(document).await })
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, anyhow::Result<u64>> {
        let filter = doc! { "timestamp": { "$lt": to_bson_time(cutoff) } };
        Box::pin(async move {
            let result = self.repo.collection().delete_many(filter).await?;
            Ok(result.deleted_count)
        })
    }

    fn latest(&self, limit: usize) -> BoxFuture<'_, anyhow::Result<Vec<LogRecord>>> {
        Box::pin(async move {
            if limit == 0 {
                return Ok(Vec::new());
            }
            self.find_sorted(doc! {}, Some(limit as i64)).await
        })
    }

    fn between(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, anyhow::Result<Vec<LogRecord>>> {
        let filter = doc! {
            "timestamp": { "$gte": to_bson_time(begin), "$lt": to_bson_time(end) }
        };
        Box::pin(async move { self.find_sorted(filter, None).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_database() {
        let options = ClientOptions::parse("mongodb://localhost:27017/applogs")
            .await
            .unwrap();
        assert_eq!(resolve_database(&options, "logs"), "applogs");

        let options = ClientOptions::parse("mongodb://localhost:27017")
            .await
            .unwrap();
        assert_eq!(resolve_database(&options, "logs"), "logs");
    }

    #[tokio::test]
    async fn test_unreachable_server_surfaces_errors() {
        let store = MongoLogStore::connect(
            "mongodb://127.0.0.1:1/applogs?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
            "logs",
        )
        .await
        .unwrap();

        let repo = store.repository();
        assert!(repo.get(&"missing".to_string()).await.is_err());
        assert!(repo.delete(&"missing".to_string()).await.is_err());

        let record = LogRecord::new("portico", LogLevel::Error, "c", "m", LogArgs::new());
        assert!(store.append(record).await.is_err());
        assert!(store.latest(5).await.is_err());
    }

    #[test]
    fn test_document_conversion() {
        let mut args = LogArgs::new();
        args.push("user", "42");
        let record = LogRecord::new("portico", LogLevel::Warning, "auth", "denied", args);
        let millis = record.timestamp.timestamp_millis();

        let doc = LogDocument::from(record.clone());
        assert_eq!(doc.id, record.id.to_string());
        assert_eq!(doc.level, "Warning");
        assert_eq!(doc.args, vec!["user=42"]);
        assert_eq!(doc.timestamp.timestamp_millis(), millis);

        let back = LogRecord::from(doc);
        assert_eq!(back.id, record.id);
        assert_eq!(back.level, LogLevel::Warning);
        assert_eq!(back.args, record.args);
        assert_eq!(back.timestamp.timestamp_millis(), millis);
    }
}
