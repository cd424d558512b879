//! SQLite Record Store
//!
//! A single connection opened at startup, shared behind a mutex and driven
//! from the blocking pool. Every operation is one statement with SQLite's
//! implicit commit.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lazy_static::lazy_static;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, Row};
use tokio::task;
use tracing::{debug, info, warn};

use super::{RecordStore, StoreError, StoreResult, TABLE};
use crate::config::DatabaseTarget;
use crate::records::{NewPerson, PersonFields, PersonRecord, RecordSummary, FIELDS};

lazy_static! {
    static ref INSERT_SQL: String = {
        let columns: Vec<&str> = FIELDS.iter().map(|f| f.name).collect();
        let placeholders: Vec<String> =
            (1..=FIELDS.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            TABLE,
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    static ref SELECT_ALL_SQL: String = {
        let columns: Vec<&str> = FIELDS.iter().map(|f| f.name).collect();
        format!("SELECT id, {} FROM {}", columns.join(", "), TABLE)
    };
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::UniqueViolation { message: err.to_string() }
            }
            _ => StoreError::Storage(err.to_string()),
        }
    }
}

/// SQL function folding text to Unicode lowercase, used by name search.
const FOLD_FN: &str = "ufold";

/// DDL for the records table, generated from the column table.
pub fn create_table_sql() -> String {
    let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for field in FIELDS {
        let constraint = if field.required {
            "NOT NULL UNIQUE".to_string()
        } else {
            format!("NOT NULL DEFAULT '{}'", field.default)
        };
        columns.push(format!("{} VARCHAR({}) {}", field.name, field.max_len, constraint));
    }
    format!("CREATE TABLE {} (\n    {}\n);", TABLE, columns.join(",\n    "))
}

/// Create the records table unless it already exists.
///
/// Returns `true` when the table was created. An existing table is left
/// untouched, whatever its columns.
fn init_schema(conn: &Connection) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![TABLE],
        |row| row.get(0),
    )?;

    if exists {
        info!("Table '{}' already exists, no schema changes applied", TABLE);
        return Ok(false);
    }

    info!("Creating table '{}'", TABLE);
    conn.execute_batch(&create_table_sql())?;
    Ok(true)
}

fn row_to_record(row: &Row) -> rusqlite::Result<PersonRecord> {
    let mut fields = PersonFields::default();
    for (i, spec) in FIELDS.iter().enumerate() {
        // Tables created elsewhere may hold NULLs.
        let value: Option<String> = row.get(i + 1)?;
        if let Some(slot) = fields.get_mut(spec.name) {
            *slot = value.unwrap_or_default();
        }
    }
    Ok(PersonRecord { id: row.get(0)?, fields })
}

fn row_to_summary(row: &Row) -> rusqlite::Result<RecordSummary> {
    Ok(RecordSummary {
        id: row.get(0)?,
        given_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        surname: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        identification_number: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

/// Register the case-folding function on a fresh connection.
fn register_functions(conn: &Connection) -> StoreResult<()> {
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteRecordStore {
    /// Open the database and make sure the records table exists.
    pub async fn open(target: &DatabaseTarget) -> StoreResult<Self> {
        let target = target.clone();

        let conn = task::spawn_blocking(move || {
            let conn = match &target {
                DatabaseTarget::Memory => Connection::open_in_memory()?,
                DatabaseTarget::File(path) => Connection::open(path)?,
            };
            register_functions(&conn)?;
            init_schema(&conn)?;
            info!("Record store ready at {}", target);
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Storage(format!("store open task failed: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Storage("connection lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| StoreError::Storage("record store is closed".to_string()))?;
            op(conn)
        })
        .await
        .map_err(|e| StoreError::Storage(format!("store task failed: {}", e)))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, record: NewPerson) -> StoreResult<i64> {
        self.with_conn(move |conn| {
            conn.execute(INSERT_SQL.as_str(), params_from_iter(record.bind_values()))?;
            let id = conn.last_insert_rowid();
            info!("Stored record {} ({})", id, record.fields.identification_number);
            Ok(id)
        })
        .await
    }

    async fn list_all(&self) -> StoreResult<Vec<PersonRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(SELECT_ALL_SQL.as_str())?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn search(&self, substring: &str) -> StoreResult<Vec<RecordSummary>> {
        let term = substring.to_lowercase();
        debug!("Searching records for {:?}", term);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, given_name, surname, identification_number FROM {table} \
                 WHERE instr({fold}(given_name), ?1) > 0 OR instr({fold}(surname), ?1) > 0",
                table = TABLE,
                fold = FOLD_FN,
            ))?;
            let summaries = stmt
                .query_map(params![term], row_to_summary)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
        .await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let sql = format!("DELETE FROM {} WHERE id = ?1", TABLE);
            let affected = conn.execute(&sql, params![id])?;
            if affected == 0 {
                warn!("Delete requested for missing record {}", id);
                return Err(StoreError::NotFound(id));
            }
            info!("Deleted record {}", id);
            Ok(())
        })
        .await
    }

    async fn count(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Storage("connection lock poisoned".to_string()))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| StoreError::from(e))?;
                info!("Record store closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(format!("store task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::NamedTempFile;

    fn person(id_number: &str, given_name: &str, surname: &str) -> NewPerson {
        PersonFields {
            identification_number: id_number.to_string(),
            given_name: given_name.to_string(),
            surname: surname.to_string(),
            ..Default::default()
        }
        .into()
    }

    async fn memory_store() -> Result<SqliteRecordStore> {
        Ok(SqliteRecordStore::open(&DatabaseTarget::Memory).await?)
    }

    #[tokio::test]
    async fn test_create_and_list() -> Result<()> {
        let store = memory_store().await?;

        let record = person("ID001", "Mario", "Rossi").with_derived_code();
        let id = store.create(record.clone()).await?;
        assert!(id > 0);

        let all = store.list_all().await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].fields, record.fields);
        assert_eq!(all[0].fields.email, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_identification_number() -> Result<()> {
        let store = memory_store().await?;
        store.create(person("ID001", "Mario", "Rossi")).await?;

        let err = store.create(person("ID001", "Luigi", "Verdi")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }), "got {:?}", err);
        assert_eq!(err.kind(), "unique_violation");
        assert!(err.to_string().contains("identification_number"));
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_identification_number_is_rejected_by_table() -> Result<()> {
        let store = memory_store().await?;
        store.create(person("ID001", "Mario", "Rossi")).await?;

        let body = serde_json::json!({ "given_name": "Luigi" });
        let record = NewPerson::from_json(body.as_object().unwrap())?;
        let err = store.create(record).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)), "got {:?}", err);
        assert!(err.to_string().contains("NOT NULL"));
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_on_both_names() -> Result<()> {
        let store = memory_store().await?;
        let rossi = store.create(person("ID001", "Mario", "Rossi")).await?;
        let rosanna = store.create(person("ID002", "Rosanna", "Bianchi")).await?;
        store.create(person("ID003", "Luigi", "Verdi")).await?;

        let mut ids: Vec<i64> = store.search("ROS").await?.iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, vec![rossi, rosanna]);

        let hits = store.search("rossi").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identification_number, "ID001");
        assert_eq!(hits[0].given_name, "Mario");

        assert_eq!(store.search("").await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_wildcards_are_literal() -> Result<()> {
        let store = memory_store().await?;
        store.create(person("ID001", "Mario", "Rossi")).await?;
        store.create(person("ID002", "Anna_Maria", "Neri")).await?;

        assert!(store.search("%").await?.is_empty());
        let hits = store.search("a_m").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identification_number, "ID002");
        Ok(())
    }

    #[tokio::test]
    async fn test_search_folds_accented_names() -> Result<()> {
        let store = memory_store().await?;
        store.create(person("ID001", "Élodie", "Ørsted")).await?;
        store.create(person("ID002", "Nicolò", "DELL'ÀNGELO")).await?;
        store.create(person("ID003", "Mario", "Rossi")).await?;

        let hits = store.search("élodie").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identification_number, "ID001");

        let hits = store.search("ØRS").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].surname, "Ørsted");

        let hits = store.search("NICOLÒ").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identification_number, "ID002");

        let hits = store.search("àngelo").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identification_number, "ID002");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete() -> Result<()> {
        let store = memory_store().await?;
        let keep = store.create(person("ID001", "Mario", "Rossi")).await?;
        let gone = store.create(person("ID002", "Luigi", "Verdi")).await?;

        let err = store.delete(gone + 100).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.count().await?, 2);

        store.delete(gone).await?;
        let remaining = store.list_all().await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_keeps_existing_table() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let target = DatabaseTarget::File(temp_file.path().to_path_buf());

        let store = SqliteRecordStore::open(&target).await?;
        store.create(person("ID001", "Mario", "Rossi")).await?;
        store.close().await?;

        let reopened = SqliteRecordStore::open(&target).await?;
        assert_eq!(reopened.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_store_reports_storage_error() -> Result<()> {
        let store = memory_store().await?;
        store.ping().await?;
        store.close().await?;

        let err = store.ping().await.unwrap_err();
        assert_eq!(err.kind(), "storage");
        Ok(())
    }

    #[test]
    fn test_init_schema_only_once() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        assert!(init_schema(&conn)?);
        assert!(!init_schema(&conn)?);
        Ok(())
    }

    #[test]
    fn test_create_table_sql_constraints() {
        let ddl = create_table_sql();
        assert!(ddl.contains("identification_number VARCHAR(50) NOT NULL UNIQUE"));
        assert!(ddl.contains("given_name VARCHAR(100) NOT NULL DEFAULT ''"));
    }
}
