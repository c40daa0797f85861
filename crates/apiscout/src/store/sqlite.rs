//! SQLite-backed store with a filesystem blob directory.
//!
//! Schemas, navigation steps and endpoint id lists are stored as JSON text.
//! Timestamps are RFC 3339 text.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{upsert_into, Store};
use crate::error::{ResourceKind, ScoutError, ScoutResult};
use crate::schema::JsonSchema;
use crate::types::{CapturedEndpoint, HttpMethod, PathStatus, RunRecord, ScoutedPath, Site};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    domain TEXT NOT NULL,
    first_scouted_at TEXT NOT NULL,
    last_scouted_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS endpoints (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL,
    method TEXT NOT NULL,
    pattern TEXT NOT NULL,
    request_schema TEXT,
    response_schema TEXT,
    sample_count INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    UNIQUE (site_id, method, pattern)
);
CREATE INDEX IF NOT EXISTS idx_endpoints_site ON endpoints(site_id);
CREATE TABLE IF NOT EXISTS paths (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL,
    task TEXT NOT NULL,
    steps TEXT NOT NULL,
    endpoint_ids TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    fail_count INTEGER NOT NULL DEFAULT 0,
    heal_count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    path_id TEXT,
    site_id TEXT,
    duration_ms INTEGER NOT NULL,
    error TEXT,
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

const ENDPOINT_COLUMNS: &str = "id, site_id, method, pattern, request_schema, response_schema, \
     sample_count, first_seen, last_seen";

const PATH_COLUMNS: &str = "id, site_id, task, steps, endpoint_ids, status, created_at, \
     last_used_at, fail_count, heal_count";

/// Durable store: one SQLite database plus a blob directory.
///
/// rusqlite calls block, so every query runs on tokio's blocking pool.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    blob_dir: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `db_path`, keeping blobs under `blob_dir`.
    pub fn open(db_path: &Path, blob_dir: &Path) -> ScoutResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(blob_dir)?;
        let db = Connection::open(db_path)?;
        Self::init(db, blob_dir)
    }

    /// In-memory database; blobs still go to `blob_dir`.
    pub fn open_in_memory(blob_dir: &Path) -> ScoutResult<Self> {
        std::fs::create_dir_all(blob_dir)?;
        Self::init(Connection::open_in_memory()?, blob_dir)
    }

    fn init(db: Connection, blob_dir: &Path) -> ScoutResult<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            blob_dir: blob_dir.to_path_buf(),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> ScoutResult<T>
    where
        F: FnOnce(&mut Connection) -> ScoutResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|_| ScoutError::persistence("database lock poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ScoutError::persistence(format!("database task failed: {e}")))?
    }

    /// Filesystem location of a blob key. Keys never escape the blob directory.
    pub fn blob_path(&self, key: &str) -> ScoutResult<PathBuf> {
        let mut path = self.blob_dir.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." {
                return Err(ScoutError::persistence(format!("invalid blob key: {key}")));
            }
            path.push(part);
        }
        Ok(path)
    }
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn parse_schema(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<JsonSchema>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

#[derive(Debug)]
struct BadValue(String);

impl std::fmt::Display for BadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BadValue {}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        first_scouted_at: parse_ts(row, 3)?,
        last_scouted_at: parse_ts(row, 4)?,
    })
}

fn endpoint_from_row(row: &Row<'_>) -> rusqlite::Result<CapturedEndpoint> {
    let method: String = row.get(2)?;
    Ok(CapturedEndpoint {
        id: row.get(0)?,
        site_id: row.get(1)?,
        method: method.parse::<HttpMethod>().map_err(|e| conversion_error(2, BadValue(e)))?,
        pattern: row.get(3)?,
        request_schema: parse_schema(row, 4)?,
        response_schema: parse_schema(row, 5)?,
        sample_count: row.get(6)?,
        first_seen: parse_ts(row, 7)?,
        last_seen: parse_ts(row, 8)?,
    })
}

fn path_from_row(row: &Row<'_>) -> rusqlite::Result<ScoutedPath> {
    let status: String = row.get(5)?;
    let last_used_at: Option<String> = row.get(7)?;
    Ok(ScoutedPath {
        id: row.get(0)?,
        site_id: row.get(1)?,
        task: row.get(2)?,
        steps: parse_json(row, 3)?,
        endpoint_ids: parse_json(row, 4)?,
        status: status.parse::<PathStatus>().map_err(|e| conversion_error(5, BadValue(e)))?,
        created_at: parse_ts(row, 6)?,
        last_used_at: last_used_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| conversion_error(7, e))?,
        fail_count: row.get(8)?,
        heal_count: row.get(9)?,
    })
}

fn schema_text(schema: &Option<JsonSchema>) -> ScoutResult<Option<String>> {
    Ok(schema.as_ref().map(serde_json::to_string).transpose()?)
}

fn enum_text<T: serde::Serialize>(value: &T) -> ScoutResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_site(&self, site: &Site) -> ScoutResult<()> {
        let site = site.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sites (id, url, domain, first_scouted_at, last_scouted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    site.id,
                    site.url,
                    site.domain,
                    ts(&site.first_scouted_at),
                    ts(&site.last_scouted_at)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_site(&self, id: &str) -> ScoutResult<Site> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, url, domain, first_scouted_at, last_scouted_at FROM sites WHERE id = ?1",
                params![id],
                site_from_row,
            )
            .optional()?
            .ok_or_else(|| ScoutError::not_found(ResourceKind::Site, id.as_str()))
        })
        .await
    }

    async fn save_endpoints(&self, endpoints: &[CapturedEndpoint]) -> ScoutResult<Vec<CapturedEndpoint>> {
        let endpoints = endpoints.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut persisted = Vec::with_capacity(endpoints.len());

            for incoming in endpoints {
                let existing = tx
                    .query_row(
                        &format!(
                            "SELECT {ENDPOINT_COLUMNS} FROM endpoints
                             WHERE site_id = ?1 AND method = ?2 AND pattern = ?3"
                        ),
                        params![incoming.site_id, incoming.method.as_str(), incoming.pattern],
                        endpoint_from_row,
                    )
                    .optional()?;

                let record = match existing {
                    Some(mut existing) => {
                        upsert_into(&mut existing, &incoming);
                        tx.execute(
                            "UPDATE endpoints
                             SET request_schema = ?2, response_schema = ?3, sample_count = ?4, last_seen = ?5
                             WHERE id = ?1",
                            params![
                                existing.id,
                                schema_text(&existing.request_schema)?,
                                schema_text(&existing.response_schema)?,
                                existing.sample_count,
                                ts(&existing.last_seen)
                            ],
                        )?;
                        existing
                    }
                    None => {
                        tx.execute(
                            &format!("INSERT INTO endpoints ({ENDPOINT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                            params![
                                incoming.id,
                                incoming.site_id,
                                incoming.method.as_str(),
                                incoming.pattern,
                                schema_text(&incoming.request_schema)?,
                                schema_text(&incoming.response_schema)?,
                                incoming.sample_count,
                                ts(&incoming.first_seen),
                                ts(&incoming.last_seen)
                            ],
                        )?;
                        incoming
                    }
                };
                persisted.push(record);
            }

            tx.commit()?;
            Ok(persisted)
        })
        .await
    }

    async fn get_endpoints(&self, site_id: &str) -> ScoutResult<Vec<CapturedEndpoint>> {
        let site_id = site_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE site_id = ?1 ORDER BY rowid"
            ))?;
            let rows = stmt.query_map(params![site_id], endpoint_from_row)?;
            let endpoints = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(endpoints)
        })
        .await
    }

    async fn save_path(&self, path: &ScoutedPath) -> ScoutResult<()> {
        let path = path.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO paths ({PATH_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    path.id,
                    path.site_id,
                    path.task,
                    serde_json::to_string(&path.steps)?,
                    serde_json::to_string(&path.endpoint_ids)?,
                    path.status.as_str(),
                    ts(&path.created_at),
                    path.last_used_at.as_ref().map(ts),
                    path.fail_count,
                    path.heal_count
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn touch_path(&self, id: &str, at: DateTime<Utc>) -> ScoutResult<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE paths SET last_used_at = ?2 WHERE id = ?1",
                params![id, ts(&at)],
            )?;
            if changed == 0 {
                return Err(ScoutError::not_found(ResourceKind::Path, id.as_str()));
            }
            Ok(())
        })
        .await
    }

    async fn get_path(&self, id: &str) -> ScoutResult<ScoutedPath> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {PATH_COLUMNS} FROM paths WHERE id = ?1"),
                params![id],
                path_from_row,
            )
            .optional()?
            .ok_or_else(|| ScoutError::not_found(ResourceKind::Path, id.as_str()))
        })
        .await
    }

    async fn list_paths(&self) -> ScoutResult<Vec<ScoutedPath>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATH_COLUMNS} FROM paths ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], path_from_row)?;
            let paths = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(paths)
        })
        .await
    }

    async fn save_run(&self, run: &RunRecord) -> ScoutResult<()> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO runs (id, kind, status, path_id, site_id, duration_ms, error, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.id,
                    enum_text(&run.kind)?,
                    enum_text(&run.status)?,
                    run.path_id,
                    run.site_id,
                    run.duration_ms as i64,
                    run.error,
                    run.detail.to_string(),
                    ts(&run.created_at)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn save_blob(&self, key: &str, bytes: &[u8]) -> ScoutResult<()> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}
