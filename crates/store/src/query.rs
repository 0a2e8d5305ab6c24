use serde_json::Value;

/// A single predicate over a document body.
///
/// Paths are JSON pointers (`/variants`, `/shipping_address/email`).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The value at `path` equals `value`.
    Eq { path: String, value: Value },

    /// The value at `path` contains `value` (JSON containment: objects match
    /// on a subset of keys, arrays match if every expected element is
    /// contained in some actual element).
    Contains { path: String, value: Value },

    /// The number at `path` is greater than or equal to `value`.
    Gte { path: String, value: f64 },

    /// The number at `path` is less than or equal to `value`.
    Lte { path: String, value: f64 },

    /// Case-insensitive substring match of `needle` against the strings at
    /// any of `paths`.
    Text { paths: Vec<String>, needle: String },
}

/// What to order query results by.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// Document creation time.
    CreatedAt,
    /// A scalar field in the body.
    Field(String),
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            descending: false,
        }
    }
}

/// Builder for constructing document queries.
///
/// All filters must match (logical AND). Expired documents never match.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Collection to search.
    pub collection: String,

    /// Predicates that must all hold.
    pub filters: Vec<Filter>,

    /// Result ordering. Ties are broken by key.
    pub sort: Sort,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query over every document in a collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Adds an equality filter.
    pub fn equals(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a containment filter.
    pub fn contains(mut self, path: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Contains {
            path: path.into(),
            value,
        });
        self
    }

    /// Adds a lower bound on a numeric field.
    pub fn gte(mut self, path: impl Into<String>, value: f64) -> Self {
        self.filters.push(Filter::Gte {
            path: path.into(),
            value,
        });
        self
    }

    /// Adds an upper bound on a numeric field.
    pub fn lte(mut self, path: impl Into<String>, value: f64) -> Self {
        self.filters.push(Filter::Lte {
            path: path.into(),
            value,
        });
        self
    }

    /// Adds a free-text filter over several string fields.
    pub fn text(mut self, paths: &[&str], needle: impl Into<String>) -> Self {
        self.filters.push(Filter::Text {
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
            needle: needle.into(),
        });
        self
    }

    /// Orders by creation time, newest first.
    pub fn newest_first(mut self) -> Self {
        self.sort = Sort {
            key: SortKey::CreatedAt,
            descending: true,
        };
        self
    }

    /// Orders by a body field.
    pub fn sort_by(mut self, path: impl Into<String>, descending: bool) -> Self {
        self.sort = Sort {
            key: SortKey::Field(path.into()),
            descending,
        };
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many documents before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Applies 1-based page/limit pagination.
    pub fn page(self, page: usize, limit: usize) -> Self {
        self.offset(page.saturating_sub(1) * limit).limit(limit)
    }
}

/// Splits a JSON pointer into its path segments (`/a/b` -> `["a", "b"]`).
pub fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}
