use crate::domain::{CertificateRecord, ContentHash, IssueMetadata};
use crate::infrastructure::registry::{
    LookupOutcome, RegistryClient, RegistryError, Rejection, SubmitOutcome,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::debug;

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

/// Append-only certificate registry kept in a local SQLite database.
///
/// The `hash` column is UNIQUE and triggers abort any UPDATE or DELETE, so an
/// accepted record can never be replaced or removed. Queries run on the
/// blocking pool so the async runtime is never stalled by disk I/O.
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    pub fn open(path: &str) -> Result<Self, RegistryError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        debug!("Opened local registry at {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS certificates (
                hash TEXT UNIQUE NOT NULL,
                content_id TEXT,
                issued_to TEXT NOT NULL,
                issued_by TEXT NOT NULL,
                filename TEXT,
                issued_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_issued_at ON certificates(issued_at);

            CREATE TRIGGER IF NOT EXISTS certificates_no_update
            BEFORE UPDATE ON certificates
            BEGIN
                SELECT RAISE(ABORT, 'certificates are append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS certificates_no_delete
            BEFORE DELETE ON certificates
            BEGIN
                SELECT RAISE(ABORT, 'certificates are append-only');
            END;",
        )
    }

    /// Run `work` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RegistryError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RegistryError::Storage("registry connection poisoned".to_string()))?;
            work(&guard)
        })
        .await
        .map_err(|e| RegistryError::Storage(format!("registry task failed: {}", e)))?
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<CertificateRecord, rusqlite::Error> {
        let hash: String = row.get(0)?;
        let hash = ContentHash::parse(&hash).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(CertificateRecord {
            hash,
            content_id: row.get(1)?,
            issued_to: row.get(2)?,
            issued_by: row.get(3)?,
            filename: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }

    pub fn count_certificates(&self) -> Result<usize, RegistryError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RegistryError::Storage("registry connection poisoned".to_string()))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM certificates", [], |row| row.get(0))?;

        Ok(count as usize)
    }
}

#[async_trait]
impl RegistryClient for SqliteRegistry {
    async fn submit(
        &self,
        hash: &ContentHash,
        _content: &[u8],
        metadata: &IssueMetadata,
    ) -> Result<SubmitOutcome, RegistryError> {
        let record =
            CertificateRecord::from_submission(hash.clone(), metadata, chrono::Utc::now().timestamp());

        self.with_connection(move |conn| {
            match conn.execute(
                "INSERT INTO certificates (hash, content_id, issued_to, issued_by, filename, issued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.hash.as_str(),
                    &record.content_id,
                    &record.issued_to,
                    &record.issued_by,
                    &record.filename,
                    record.timestamp
                ],
            ) {
                Ok(_) => Ok(SubmitOutcome::Accepted(record)),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    debug!("Hash {} already registered", record.hash);
                    Ok(SubmitOutcome::Rejected(Rejection::DuplicateHash))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn lookup(&self, hash: &ContentHash) -> Result<LookupOutcome, RegistryError> {
        let hash = hash.clone();
        self.with_connection(move |conn| {
            let record = conn
                .query_row(
                    "SELECT hash, content_id, issued_to, issued_by, filename, issued_at
                     FROM certificates
                     WHERE hash = ?1",
                    params![hash.as_str()],
                    Self::row_to_record,
                )
                .optional()?;

            Ok(match record {
                Some(record) => LookupOutcome::Found(record),
                None => LookupOutcome::NotFound,
            })
        })
        .await
    }

    async fn list(&self) -> Result<Vec<CertificateRecord>, RegistryError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT hash, content_id, issued_to, issued_by, filename, issued_at
                 FROM certificates
                 ORDER BY issued_at DESC, rowid DESC",
            )?;

            let records = stmt
                .query_map([], Self::row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
        .await
    }
}
