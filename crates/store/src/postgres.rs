use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Document, DocumentQuery, Filter, Result, SortKey, StoreError, Version,
    query::pointer_segments,
    store::{Bounds, DocumentStore, SaveOptions},
};

const COLUMNS: &str = "collection, key, version, body, created_at, updated_at, expires_at";
const LIVE: &str = "(expires_at IS NULL OR expires_at > $3)";

/// PostgreSQL-backed document store implementation.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

/// A positional parameter collected while building a dynamic query.
enum Param {
    Text(String),
    Path(Vec<String>),
    Json(Value),
    Float(f64),
    Int(i64),
    Time(DateTime<Utc>),
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Physically removes every expired document. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes one document if it has expired. Returns true if a row was removed.
    async fn drop_if_expired(&self, collection: &str, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE collection = $1 AND key = $2 AND expires_at <= $3",
        )
        .bind(collection)
        .bind(key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let dropped = result.rows_affected() > 0;
        if dropped {
            tracing::debug!(collection, key, "expired document dropped");
        }
        Ok(dropped)
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            collection: row.try_get("collection")?,
            key: row.try_get("key")?,
            version: Version::new(row.try_get("version")?),
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    async fn live_version(&self, collection: &str, key: &str, now: DateTime<Utc>) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT version FROM documents WHERE collection = $1 AND key = $2 AND {LIVE}"
        ))
        .bind(collection)
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map_or(Version::initial(), Version::new))
    }

    /// Builds the WHERE clause shared by `query` and `count`.
    ///
    /// `$1` is the collection and `$2` the current time.
    fn where_clause(query: &DocumentQuery, now: DateTime<Utc>) -> (String, Vec<Param>) {
        let mut params = vec![Param::Text(query.collection.clone()), Param::Time(now)];
        let mut sql =
            String::from(" WHERE collection = $1 AND (expires_at IS NULL OR expires_at > $2)");

        fn push(params: &mut Vec<Param>, param: Param) -> usize {
            params.push(param);
            params.len()
        }

        for filter in &query.filters {
            match filter {
                Filter::Eq { path, value } => {
                    let p = push(&mut params, Param::Path(pointer_segments(path)));
                    let v = push(&mut params, Param::Json(value.clone()));
                    sql.push_str(&format!(" AND body #> ${p}::text[] = ${v}::jsonb"));
                }
                Filter::Contains { path, value } => {
                    let p = push(&mut params, Param::Path(pointer_segments(path)));
                    let v = push(&mut params, Param::Json(value.clone()));
                    sql.push_str(&format!(" AND body #> ${p}::text[] @> ${v}::jsonb"));
                }
                Filter::Gte { path, value } | Filter::Lte { path, value } => {
                    let op = if matches!(filter, Filter::Gte { .. }) { ">=" } else { "<=" };
                    let p = push(&mut params, Param::Path(pointer_segments(path)));
                    let v = push(&mut params, Param::Float(*value));
                    sql.push_str(&format!(
                        " AND (CASE WHEN jsonb_typeof(body #> ${p}::text[]) = 'number' \
                         THEN (body #>> ${p}::text[])::float8 END) {op} ${v}"
                    ));
                }
                Filter::Text { paths, needle } => {
                    let pattern = format!("%{}%", escape_like(needle));
                    let n = push(&mut params, Param::Text(pattern));
                    let alternatives: Vec<String> = paths
                        .iter()
                        .map(|path| {
                            let p = push(&mut params, Param::Path(pointer_segments(path)));
                            format!("(body #>> ${p}::text[]) ILIKE ${n}")
                        })
                        .collect();
                    if alternatives.is_empty() {
                        sql.push_str(" AND FALSE");
                    } else {
                        sql.push_str(&format!(" AND ({})", alternatives.join(" OR ")));
                    }
                }
            }
        }

        (sql, params)
    }

    fn bind_all<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        params: Vec<Param>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        for param in params {
            query = match param {
                Param::Text(v) => query.bind(v),
                Param::Path(v) => query.bind(v),
                Param::Json(v) => query.bind(v),
                Param::Float(v) => query.bind(v),
                Param::Int(v) => query.bind(v),
                Param::Time(v) => query.bind(v),
            };
        }
        query
    }
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn load(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM documents WHERE collection = $1 AND key = $2 AND {LIVE}"
        ))
        .bind(collection)
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_document(row).map(Some),
            None => {
                self.drop_if_expired(collection, key).await?;
                Ok(None)
            }
        }
    }

    async fn save(&self, document: Document, options: SaveOptions) -> Result<Document> {
        let now = Utc::now();

        let row: Option<PgRow> = match options.expected_version {
            // Must be absent (or expired, which counts as absent)
            Some(expected) if expected == Version::initial() => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO documents ({COLUMNS})
                    VALUES ($1, $2, 1, $4, $3, $3, $5)
                    ON CONFLICT (collection, key) DO UPDATE SET
                        version = 1,
                        body = EXCLUDED.body,
                        created_at = EXCLUDED.created_at,
                        updated_at = EXCLUDED.updated_at,
                        expires_at = EXCLUDED.expires_at
                    WHERE documents.expires_at IS NOT NULL AND documents.expires_at <= $3
                    RETURNING {COLUMNS}
                    "#
                ))
                .bind(&document.collection)
                .bind(&document.key)
                .bind(now)
                .bind(&document.body)
                .bind(document.expires_at)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query(&format!(
                    r#"
                    UPDATE documents SET
                        version = version + 1,
                        body = $4,
                        updated_at = $3,
                        expires_at = $5
                    WHERE collection = $1 AND key = $2 AND version = $6 AND {LIVE}
                    RETURNING {COLUMNS}
                    "#
                ))
                .bind(&document.collection)
                .bind(&document.key)
                .bind(now)
                .bind(&document.body)
                .bind(document.expires_at)
                .bind(expected.as_i64())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO documents ({COLUMNS})
                    VALUES ($1, $2, 1, $4, $3, $3, $5)
                    ON CONFLICT (collection, key) DO UPDATE SET
                        version = CASE WHEN documents.expires_at <= $3 THEN 1
                                       ELSE documents.version + 1 END,
                        created_at = CASE WHEN documents.expires_at <= $3 THEN EXCLUDED.created_at
                                          ELSE documents.created_at END,
                        body = EXCLUDED.body,
                        updated_at = EXCLUDED.updated_at,
                        expires_at = EXCLUDED.expires_at
                    RETURNING {COLUMNS}
                    "#
                ))
                .bind(&document.collection)
                .bind(&document.key)
                .bind(now)
                .bind(&document.body)
                .bind(document.expires_at)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match row {
            Some(row) => Self::row_to_document(row),
            None => {
                let actual = self
                    .live_version(&document.collection, &document.key, now)
                    .await?;
                Err(StoreError::ConcurrencyConflict {
                    expected: options.expected_version.unwrap_or(Version::initial()),
                    actual,
                    collection: document.collection,
                    key: document.key,
                })
            }
        }
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let live: Option<bool> = sqlx::query_scalar(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND key = $2
            RETURNING (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(live.unwrap_or(false))
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let (where_sql, mut params) = Self::where_clause(&query, Utc::now());
        let mut sql = format!("SELECT {COLUMNS} FROM documents{where_sql}");

        let direction = if query.sort.descending { "DESC" } else { "ASC" };
        match &query.sort.key {
            SortKey::CreatedAt => sql.push_str(&format!(" ORDER BY created_at {direction}")),
            SortKey::Field(path) => {
                params.push(Param::Path(pointer_segments(path)));
                sql.push_str(&format!(
                    " ORDER BY body #> ${}::text[] {direction} NULLS FIRST",
                    params.len()
                ));
            }
        }
        sql.push_str(", key ASC");

        if let Some(limit) = query.limit {
            params.push(Param::Int(limit as i64));
            sql.push_str(&format!(" LIMIT ${}", params.len()));
        }
        if let Some(offset) = query.offset {
            params.push(Param::Int(offset as i64));
            sql.push_str(&format!(" OFFSET ${}", params.len()));
        }

        let rows = Self::bind_all(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn count(&self, query: DocumentQuery) -> Result<u64> {
        let (where_sql, params) = Self::where_clause(&query, Utc::now());
        let sql = format!("SELECT COUNT(*) AS total FROM documents{where_sql}");

        let row = Self::bind_all(sqlx::query(&sql), params)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
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
        let segments = pointer_segments(path);

        // Bounds and guard are evaluated against the locked row at write time
        let current = "(CASE WHEN jsonb_typeof(body #> $4::text[]) = 'number' \
                       THEN (body #>> $4::text[])::numeric END)";
        let updated: Option<i64> = sqlx::query_scalar(&format!(
            r#"
            UPDATE documents SET
                body = jsonb_set(body, $4::text[], to_jsonb({current} + $5)),
                version = version + 1,
                updated_at = $3
            WHERE collection = $1 AND key = $2 AND {LIVE}
              AND {current} IS NOT NULL
              AND ($6::bigint IS NULL OR {current} + $5 >= $6)
              AND ($7::bigint IS NULL OR {current} + $5 <= $7)
              AND ($8::text[] IS NULL OR body #> $8::text[] = $9::jsonb)
            RETURNING (body #>> $4::text[])::bigint
            "#
        ))
        .bind(collection)
        .bind(key)
        .bind(now)
        .bind(&segments)
        .bind(delta)
        .bind(bounds.floor)
        .bind(bounds.ceiling)
        .bind(bounds.guard.as_ref().map(|g| pointer_segments(&g.path)))
        .bind(bounds.guard.as_ref().map(|g| g.expected.clone()))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(value) = updated {
            return Ok(value);
        }

        // Nothing was written: work out why
        let document = self.load(collection, key).await?.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        })?;

        if let Some(guard) = bounds.guard.as_ref().filter(|_| !bounds.guard_holds(&document.body)) {
            return Err(StoreError::GuardMismatch {
                collection: collection.to_string(),
                key: key.to_string(),
                path: guard.path.clone(),
            });
        }

        match document.body.pointer(path).and_then(Value::as_i64) {
            Some(current) => Err(StoreError::BoundViolation {
                collection: collection.to_string(),
                key: key.to_string(),
                path: path.to_string(),
                current,
                delta,
            }),
            None => Err(StoreError::InvalidPath {
                collection: collection.to_string(),
                key: key.to_string(),
                path: path.to_string(),
            }),
        }
    }
}
