use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Document, DocumentQuery, Result, StoreError, Version};

/// Options for saving a document.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Expected stored version for optimistic concurrency control.
    /// If None, no version check is performed (last write wins).
    pub expected_version: Option<Version>,
}

impl SaveOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the document to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the document to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Inclusive bounds enforced by [`DocumentStore::adjust`].
///
/// An optional guard pins a second field of the same document to an expected
/// value, checked in the same atomic step as the bounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bounds {
    pub floor: Option<i64>,
    pub ceiling: Option<i64>,
    pub guard: Option<Guard>,
}

/// A field that must hold `expected` for an adjustment to go through.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub path: String,
    pub expected: Value,
}

impl Bounds {
    /// No bounds at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The counter may never drop below zero.
    pub fn non_negative() -> Self {
        Self {
            floor: Some(0),
            ..Self::default()
        }
    }

    /// The counter must stay within `[0, ceiling]`.
    pub fn at_most(ceiling: i64) -> Self {
        Self {
            floor: Some(0),
            ceiling: Some(ceiling),
            guard: None,
        }
    }

    /// Requires the field at `path` to equal `expected` at write time.
    pub fn guarded(mut self, path: impl Into<String>, expected: impl Into<Value>) -> Self {
        self.guard = Some(Guard {
            path: path.into(),
            expected: expected.into(),
        });
        self
    }

    /// Returns true if `value` lies within the bounds.
    pub fn contains(&self, value: i64) -> bool {
        self.floor.is_none_or(|floor| value >= floor)
            && self.ceiling.is_none_or(|ceiling| value <= ceiling)
    }

    /// Returns true if the guard, if any, holds for `body`.
    pub fn guard_holds(&self, body: &Value) -> bool {
        self.guard
            .as_ref()
            .is_none_or(|g| body.pointer(&g.path) == Some(&g.expected))
    }
}

/// Core trait for document store implementations.
///
/// A document store persists JSON documents keyed by `(collection, key)`.
/// Each save is all-or-nothing for its document; nothing spans documents.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads a document. Expired documents are reported as absent.
    async fn load(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Saves a document, replacing any previous body.
    ///
    /// If `options.expected_version` is set, the save fails with
    /// `ConcurrencyConflict` if the stored version doesn't match
    /// (`Version::initial()` meaning "must not exist").
    ///
    /// Returns the stored document with its new version and timestamps.
    async fn save(&self, document: Document, options: SaveOptions) -> Result<Document>;

    /// Deletes a document. Returns true if something was deleted.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool>;

    /// Retrieves documents matching a query.
    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>>;

    /// Counts documents matching a query's filters (limit/offset are ignored).
    async fn count(&self, query: DocumentQuery) -> Result<u64>;

    /// Atomically adds `delta` to the integer at `path` and returns the new value.
    ///
    /// The check against `bounds` happens at the moment of the write, not on an
    /// earlier read. If the result would fall outside `bounds` the document is
    /// left untouched and `BoundViolation` is returned. A failed guard leaves it
    /// untouched too and returns `GuardMismatch`. The document's version is
    /// incremented on success.
    async fn adjust(
        &self,
        collection: &str,
        key: &str,
        path: &str,
        delta: i64,
        bounds: Bounds,
    ) -> Result<i64>;
}

/// Extension trait providing typed convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Loads and decodes a document body, along with its version.
    async fn load_as<T>(&self, collection: &str, key: &str) -> Result<Option<(T, Version)>>
    where
        T: DeserializeOwned + Send,
    {
        match self.load(collection, key).await? {
            Some(doc) => Ok(Some((doc.decode()?, doc.version))),
            None => Ok(None),
        }
    }

    /// Encodes and saves a typed value, returning the new version.
    async fn save_as<T>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
        options: SaveOptions,
    ) -> Result<Version>
    where
        T: Serialize + Sync,
    {
        let now = Utc::now();
        let document = Document {
            collection: collection.to_string(),
            key: key.to_string(),
            version: Version::initial(),
            body: serde_json::to_value(value)?,
            created_at: now,
            updated_at: now,
            expires_at,
        };
        Ok(self.save(document, options).await?.version)
    }

    /// Runs a query and decodes every body.
    async fn query_as<T>(&self, query: DocumentQuery) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.query(query)
            .await?
            .iter()
            .map(|doc| doc.decode().map_err(StoreError::from))
            .collect()
    }

    /// Checks if a live document exists.
    async fn exists(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self.load(collection, key).await?.is_some())
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}
