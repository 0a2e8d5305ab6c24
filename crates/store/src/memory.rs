use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    Document, DocumentQuery, Filter, Result, SortKey, StoreError, Version,
    store::{Bounds, DocumentStore, SaveOptions},
};

type DocumentKey = (String, String);

/// In-memory document store implementation.
///
/// This implementation keeps all documents in a map guarded by a single
/// async lock and provides the same interface as the PostgreSQL
/// implementation. Every write happens under the write lock, which makes
/// `adjust` and versioned `save` atomic.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<DocumentKey, Document>>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live documents in a collection.
    pub async fn document_count(&self, collection: &str) -> usize {
        let now = Utc::now();
        self.documents
            .read()
            .await
            .values()
            .filter(|d| d.collection == collection && !d.is_expired(now))
            .count()
    }

    /// Clears all documents.
    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }

    fn matching(&self, docs: &HashMap<DocumentKey, Document>, query: &DocumentQuery) -> Vec<Document> {
        let now = Utc::now();
        let mut matched: Vec<Document> = docs
            .values()
            .filter(|d| d.collection == query.collection && !d.is_expired(now))
            .filter(|d| query.filters.iter().all(|f| matches_filter(&d.body, f)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ordering = match &query.sort.key {
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::Field(path) => compare_json(a.body.pointer(path), b.body.pointer(path)),
            };
            let ordering = if query.sort.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then_with(|| a.key.cmp(&b.key))
        });
        matched
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let id = (collection.to_string(), key.to_string());
        {
            let docs = self.documents.read().await;
            match docs.get(&id) {
                None => return Ok(None),
                Some(doc) if !doc.is_expired(Utc::now()) => return Ok(Some(doc.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it so it stops occupying the key
        let mut docs = self.documents.write().await;
        if docs.get(&id).is_some_and(|d| d.is_expired(Utc::now())) {
            docs.remove(&id);
            tracing::debug!(collection, key, "expired document dropped");
        }
        Ok(None)
    }

    async fn save(&self, mut document: Document, options: SaveOptions) -> Result<Document> {
        let now = Utc::now();
        let id = (document.collection.clone(), document.key.clone());
        let mut docs = self.documents.write().await;

        let existing = docs.get(&id).filter(|d| !d.is_expired(now));
        let current_version = existing.map_or(Version::initial(), |d| d.version);

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(StoreError::ConcurrencyConflict {
                collection: document.collection,
                key: document.key,
                expected,
                actual: current_version,
            });
        }

        document.version = current_version.next();
        document.created_at = existing.map_or(now, |d| d.created_at);
        document.updated_at = now;

        docs.insert(id, document.clone());
        Ok(document)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let mut docs = self.documents.write().await;
        let removed = docs.remove(&(collection.to_string(), key.to_string()));
        Ok(removed.is_some_and(|d| !d.is_expired(Utc::now())))
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let docs = self.documents.read().await;
        let matched = self.matching(&docs, &query);

        // Apply offset and limit
        let offset = query.offset.unwrap_or(0);
        let matched = matched.into_iter().skip(offset);
        let matched: Vec<_> = if let Some(limit) = query.limit {
            matched.take(limit).collect()
        } else {
            matched.collect()
        };

        Ok(matched)
    }

    async fn count(&self, query: DocumentQuery) -> Result<u64> {
        let docs = self.documents.read().await;
        Ok(self.matching(&docs, &query).len() as u64)
    }

    async fn adjust(
        &self,
        collection: &str,
        key: &str,
        path: &str,
        delta: i64,
        bounds: Bounds,
    ) -> Result<i64> {
        let now = Utc::now();
        let mut docs = self.documents.write().await;

        let doc = docs
            .get_mut(&(collection.to_string(), key.to_string()))
            .filter(|d| !d.is_expired(now))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })?;

        if let Some(guard) = bounds.guard.as_ref().filter(|_| !bounds.guard_holds(&doc.body)) {
            return Err(StoreError::GuardMismatch {
                collection: collection.to_string(),
                key: key.to_string(),
                path: guard.path.clone(),
            });
        }

        let invalid_path = || StoreError::InvalidPath {
            collection: collection.to_string(),
            key: key.to_string(),
            path: path.to_string(),
        };

        let field = doc.body.pointer_mut(path).ok_or_else(invalid_path)?;
        let current = field.as_i64().ok_or_else(invalid_path)?;
        let updated = current.checked_add(delta).ok_or_else(invalid_path)?;

        if !bounds.contains(updated) {
            return Err(StoreError::BoundViolation {
                collection: collection.to_string(),
                key: key.to_string(),
                path: path.to_string(),
                current,
                delta,
            });
        }

        *field = Value::from(updated);
        doc.version = doc.version.next();
        doc.updated_at = now;
        Ok(updated)
    }
}

fn matches_filter(body: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { path, value } => body.pointer(path) == Some(value),
        Filter::Contains { path, value } => body
            .pointer(path)
            .is_some_and(|actual| json_contains(actual, value)),
        Filter::Gte { path, value } => body
            .pointer(path)
            .and_then(Value::as_f64)
            .is_some_and(|n| n >= *value),
        Filter::Lte { path, value } => body
            .pointer(path)
            .and_then(Value::as_f64)
            .is_some_and(|n| n <= *value),
        Filter::Text { paths, needle } => {
            let needle = needle.to_lowercase();
            paths.iter().any(|p| {
                body.pointer(p)
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
        }
    }
}

/// JSON containment with the same semantics as PostgreSQL's `jsonb @>`.
fn json_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(e)) => e
            .iter()
            .all(|(k, ev)| a.get(k).is_some_and(|av| json_contains(av, ev))),
        (Value::Array(a), Value::Array(e)) => e
            .iter()
            .all(|ev| a.iter().any(|av| json_contains(av, ev))),
        (Value::Array(a), scalar) if !scalar.is_object() => a.contains(scalar),
        _ => actual == expected,
    }
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
