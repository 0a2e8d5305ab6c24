use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Version number of a stored document, used for optimistic concurrency control.
///
/// A document that has never been saved is at version 0. The first save
/// produces version 1 and every later save increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of a document that does not exist yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version (1) assigned by the first save.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A JSON document addressed by `(collection, key)`.
///
/// Saves replace the whole body atomically; there are no cross-document
/// transactions. Documents with an `expires_at` in the past are treated by
/// every store as if they had been deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Logical collection (e.g. "products", "carts").
    pub collection: String,

    /// Primary key within the collection.
    pub key: String,

    /// Stored version. Ignored on save; the store assigns the next one.
    pub version: Version,

    /// The document body.
    pub body: serde_json::Value,

    /// When the document was first saved.
    pub created_at: DateTime<Utc>,

    /// When the document was last saved.
    pub updated_at: DateTime<Utc>,

    /// Optional expiry; the document disappears once this instant passes.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Creates a new document builder.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    /// Returns true if the document has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Deserializes the body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

/// Builder for constructing documents to save.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    collection: Option<String>,
    key: Option<String>,
    body: Option<serde_json::Value>,
    expires_at: Option<DateTime<Utc>>,
}

impl DocumentBuilder {
    /// Sets the collection.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the body from a serializable value.
    pub fn body<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Sets the body from a raw JSON value.
    pub fn body_raw(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the expiry instant.
    pub fn expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Builds the document.
    ///
    /// # Panics
    ///
    /// Panics if collection, key or body are not set.
    pub fn build(self) -> Document {
        self.try_build()
            .expect("collection, key and body are required")
    }

    /// Tries to build the document, returning None if required fields are missing.
    pub fn try_build(self) -> Option<Document> {
        let now = Utc::now();
        Some(Document {
            collection: self.collection?,
            key: self.key?,
            version: Version::initial(),
            body: self.body?,
            created_at: now,
            updated_at: now,
            expires_at: self.expires_at,
        })
    }
}
