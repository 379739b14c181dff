//! Message pool: candidate broadcast texts.

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;

use sched_core::ids::MessageId;

use crate::database::Database;
use crate::error::StoreError;

/// Longest text a message may hold, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRow {
    pub id: MessageId,
    pub text: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a message. Identical texts may be stored more than once.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn insert(&self, text: &str) -> Result<MessageRow, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::Invalid("message text is empty".into()));
        }
        let chars = text.chars().count();
        if chars > MAX_MESSAGE_LEN {
            return Err(StoreError::Invalid(format!(
                "message text is {chars} characters, limit is {MAX_MESSAGE_LEN}"
            )));
        }

        let id = MessageId::new();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.as_str(), text, now],
            )?;
            Ok(MessageRow {
                id,
                text: text.to_string(),
                created_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(message_id = %id))]
    pub fn remove(&self, id: &MessageId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", [id.as_str()])?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("message {id}")));
            }
            Ok(())
        })
    }

    /// Uniformly random message, or `None` when the pool is empty.
    pub fn pick_random(&self) -> Result<Option<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, text, created_at FROM messages ORDER BY RANDOM() LIMIT 1",
                    [],
                    |row| {
                        Ok(MessageRow {
                            id: MessageId::from_raw(row.get::<_, String>(0)?),
                            text: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// All messages, oldest first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, text, created_at FROM messages ORDER BY created_at, id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MessageRow {
                        id: MessageId::from_raw(row.get::<_, String>(0)?),
                        text: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn repo() -> MessageRepo {
        MessageRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn pick_from_empty_pool_is_none() {
        assert!(repo().pick_random().unwrap().is_none());
    }

    #[test]
    fn pick_returns_stored_message() {
        let repo = repo();
        let stored = repo.insert("Sabia que o polvo tem três corações?").unwrap();
        let picked = repo.pick_random().unwrap().unwrap();
        assert_eq!(picked, stored);
    }

    #[test]
    fn pick_eventually_covers_pool() {
        let repo = repo();
        for text in ["um", "dois", "três"] {
            repo.insert(text).unwrap();
        }
        let seen: HashSet<String> = (0..200)
            .filter_map(|_| repo.pick_random().unwrap())
            .map(|m| m.text)
            .collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn duplicates_permitted() {
        let repo = repo();
        repo.insert("same").unwrap();
        repo.insert("same").unwrap();
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn length_bound_enforced() {
        let repo = repo();
        assert!(repo.insert(&"a".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(matches!(
            repo.insert(&"a".repeat(MAX_MESSAGE_LEN + 1)),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(repo.insert("   "), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn remove_by_id() {
        let repo = repo();
        let row = repo.insert("bye").unwrap();
        repo.remove(&row.id).unwrap();
        assert_eq!(repo.count().unwrap(), 0);
        assert!(matches!(repo.remove(&row.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_in_insertion_order() {
        let repo = repo();
        repo.insert("first").unwrap();
        repo.insert("second").unwrap();
        let texts: Vec<_> = repo.list().unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["first", "second"]);
    }
}
