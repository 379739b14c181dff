//! Subscriber directory: the set of phones that receive broadcasts.

use chrono::Utc;
use tracing::instrument;

use sched_core::ids::ContactId;
use sched_core::Phone;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactRow {
    pub id: ContactId,
    pub phone: String,
    pub created_at: String,
}

/// Result of [`ContactRepo::add`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added(ContactRow),
    AlreadyExists,
}

/// Result of [`ContactRepo::remove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

#[derive(Clone)]
pub struct ContactRepo {
    db: Database,
}

impl ContactRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a contact. A phone that is already present is reported as
    /// `AlreadyExists`, including when a concurrent insert won the race.
    #[instrument(skip(self), fields(phone = %phone))]
    pub fn add(&self, phone: &Phone) -> Result<AddOutcome, StoreError> {
        let id = ContactId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO contacts (id, phone, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(phone) DO NOTHING",
                rusqlite::params![id.as_str(), phone.as_str(), now],
            )?;

            if inserted == 0 {
                return Ok(AddOutcome::AlreadyExists);
            }

            Ok(AddOutcome::Added(ContactRow {
                id,
                phone: phone.as_str().to_string(),
                created_at: now,
            }))
        })
    }

    #[instrument(skip(self), fields(phone = %phone))]
    pub fn remove(&self, phone: &Phone) -> Result<RemoveOutcome, StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM contacts WHERE phone = ?1", [phone.as_str()])?;
            Ok(if deleted == 0 {
                RemoveOutcome::NotFound
            } else {
                RemoveOutcome::Removed
            })
        })
    }

    #[instrument(skip(self), fields(phone = %phone))]
    pub fn exists(&self, phone: &Phone) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM contacts WHERE phone = ?1)",
                [phone.as_str()],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    /// Every subscribed contact. Order is unspecified.
    #[instrument(skip(self))]
    pub fn list_all(&self) -> Result<Vec<ContactRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, phone, created_at FROM contacts")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ContactRow {
                        id: ContactId::from_raw(row.get::<_, String>(0)?),
                        phone: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}
