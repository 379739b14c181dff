use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;
use crate::schema;

/// Where a `DATABASE_URL` points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Resolve a storage URL.
    ///
    /// Accepts SQLAlchemy-style `sqlite:///relative.db` and `sqlite:////abs.db`,
    /// a bare path, or `:memory:` / `sqlite://` for a private in-memory database.
    pub fn parse(url: &str) -> Result<Self, StoreError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(StoreError::Invalid("empty database url".into()));
        }
        if url == ":memory:" || url == "sqlite://" || url == "sqlite:///:memory:" {
            return Ok(Self::Memory);
        }
        if let Some(rest) = url.strip_prefix("sqlite:///") {
            if rest.is_empty() {
                return Err(StoreError::Invalid(format!("no path in database url: {url}")));
            }
            return Ok(Self::File(PathBuf::from(rest)));
        }
        if url.contains("://") {
            return Err(StoreError::Invalid(format!("unsupported database url: {url}")));
        }
        Ok(Self::File(PathBuf::from(url)))
    }
}

/// Thread-safe SQLite connection wrapper.
/// Every repository call runs one statement under this mutex, so each
/// individual add/remove/read is atomic.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open the database a `DATABASE_URL` points at.
    pub fn open_url(url: &str) -> Result<Self, StoreError> {
        match DatabaseLocation::parse(url)? {
            DatabaseLocation::Memory => Self::in_memory(),
            DatabaseLocation::File(path) => Self::open(&path),
        }
    }

    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        init_schema(&conn)?;

        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::PRAGMAS)
        .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;

    conn.execute_batch(schema::CREATE_TABLES)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();

    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [schema::SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.path(), Path::new(":memory:"));
    }

    #[test]
    fn schema_version_set() {
        let db = Database::in_memory().unwrap();
        let version: u32 = db
            .with_conn(|conn| {
                conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn tables_created() {
        let db = Database::in_memory().unwrap();
        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;
                Ok(names)
            })
            .unwrap();
        assert!(tables.contains(&"contacts".to_string()));
        assert!(tables.contains(&"messages".to_string()));
    }

    #[test]
    fn reopen_file_database_keeps_single_version_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sched.db");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        let rows: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn url_forms() {
        assert_eq!(DatabaseLocation::parse(":memory:").unwrap(), DatabaseLocation::Memory);
        assert_eq!(DatabaseLocation::parse("sqlite://").unwrap(), DatabaseLocation::Memory);
        assert_eq!(
            DatabaseLocation::parse("sqlite:///sched.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("sched.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite:////var/lib/sched.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("/var/lib/sched.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("data/sched.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/sched.db"))
        );
    }

    #[test]
    fn unsupported_urls_rejected() {
        assert!(matches!(
            DatabaseLocation::parse("postgres://localhost/sched"),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(DatabaseLocation::parse(""), Err(StoreError::Invalid(_))));
        assert!(matches!(DatabaseLocation::parse("sqlite:///"), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn open_url_in_memory() {
        let db = Database::open_url("sqlite://").unwrap();
        assert_eq!(db.path(), Path::new(":memory:"));
    }
}
