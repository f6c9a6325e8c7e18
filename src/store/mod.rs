//! SQLite decision store
//!
//! Append-mostly log of classification verdicts. One row per message, keyed
//! by the provider's message id; the check-then-append sequence runs inside a
//! single immediate transaction so racing scan workers cannot both claim the
//! same message.
//!
//! Rows written before the identifier scheme existed have a NULL
//! `message_id` and are matched by `(sender, subject)`. That fallback is
//! lossy: two distinct messages with the same sender and subject conflate.
//! It exists to avoid duplicate alerts on old databases, not for correctness.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::error::MailguardError;
use crate::types::{Explanation, NewVerdict, RemediationAction, VerdictRecord};

/// Database connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Aggregate counters over the decision log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: u64,
    pub phishing: u64,
    pub safe: u64,
}

/// Append-only decision log backed by SQLite
pub struct DecisionStore {
    pool: DbPool,
}

impl DecisionStore {
    /// Open (or create) the decision store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MailguardError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(8).build(manager).map_err(|e| {
            MailguardError::Database(format!("Failed to create decision store pool: {}", e))
        })?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, MailguardError> {
        // Single connection so every pool checkout sees the same database
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(|e| {
            MailguardError::Database(format!("Failed to create decision store pool: {}", e))
        })?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Get a connection from the pool
    fn connection(&self) -> Result<DbConnection, MailguardError> {
        self.pool.get().map_err(|e| {
            MailguardError::Database(format!("Failed to get store connection: {}", e))
        })
    }

    /// Initialize the schema
    fn initialize_schema(&self) -> Result<(), MailguardError> {
        let conn = self.connection()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 10000;

            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT,
                sender TEXT NOT NULL DEFAULT '',
                receiver TEXT,
                subject TEXT NOT NULL DEFAULT '',
                body_excerpt TEXT NOT NULL DEFAULT '',
                is_phishing INTEGER NOT NULL DEFAULT 0,
                confidence REAL NOT NULL DEFAULT 0,
                rationale TEXT NOT NULL DEFAULT '',
                explanation TEXT,
                action TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| MailguardError::Database(format!("Failed to initialize schema: {}", e)))?;

        self.migrate_schema(&conn)?;

        // Indexes last: the message_id index cannot exist until a legacy
        // table has gained the column.
        conn.execute_batch(
            r#"
            CREATE INDEX IF NOT EXISTS idx_decisions_message_id ON decisions(message_id);
            CREATE INDEX IF NOT EXISTS idx_decisions_created_at ON decisions(created_at DESC);
            "#,
        )
        .map_err(|e| MailguardError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Migrate databases created by older versions.
    ///
    /// Early layouts lacked the `message_id` and `receiver` columns. Adding
    /// them in place keeps existing rows; those rows stay on the
    /// `(sender, subject)` match path until they age out.
    fn migrate_schema(&self, conn: &DbConnection) -> Result<(), MailguardError> {
        for column in ["message_id", "receiver"] {
            let present: bool = conn
                .query_row(
                    "SELECT COUNT(*) FROM pragma_table_info('decisions') WHERE name = ?1",
                    params![column],
                    |row| row.get::<_, i32>(0).map(|count| count > 0),
                )
                .unwrap_or(false);

            if !present {
                info!("Migrating decisions table: adding '{}' column", column);
                conn.execute(
                    &format!("ALTER TABLE decisions ADD COLUMN {} TEXT", column),
                    [],
                )
                .map_err(|e| {
                    MailguardError::Database(format!(
                        "Failed to add column {}: {}",
                        column, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Whether a verdict already exists for this message id.
    ///
    /// Point-in-time check used to skip settled messages cheaply; the
    /// authoritative check is the one inside [`append_if_absent`].
    ///
    /// [`append_if_absent`]: DecisionStore::append_if_absent
    pub fn exists(&self, message_id: &str) -> Result<bool, MailguardError> {
        let conn = self.connection()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM decisions WHERE message_id = ?1 LIMIT 1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Legacy match for rows that predate the message id column.
    ///
    /// Lossy on purpose: identical `(sender, subject)` pairs conflate.
    pub fn exists_legacy(&self, sender: &str, subject: &str) -> Result<bool, MailguardError> {
        let conn = self.connection()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM decisions
                 WHERE message_id IS NULL AND sender = ?1 AND subject = ?2
                 LIMIT 1",
                params![sender, subject],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Append a verdict unless the message is already decided.
    ///
    /// The existence check and the insert run in one immediate transaction;
    /// this is the claim point for the at-most-once-remediation invariant.
    /// Returns true if this call inserted the row, false if the message was
    /// already decided (by id, or by the legacy `(sender, subject)` match).
    pub fn append_if_absent(&self, verdict: &NewVerdict) -> Result<bool, MailguardError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let already: Option<i64> = tx
            .query_row(
                "SELECT id FROM decisions
                 WHERE message_id = ?1
                    OR (message_id IS NULL AND sender = ?2 AND subject = ?3)
                 LIMIT 1",
                params![verdict.message_id, verdict.sender, verdict.subject],
                |row| row.get(0),
            )
            .optional()?;

        if already.is_some() {
            debug!("Message {} already decided, skipping append", verdict.message_id);
            return Ok(false);
        }

        let explanation_json = if verdict.explanation.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&verdict.explanation)?)
        };

        tx.execute(
            "INSERT INTO decisions
             (message_id, sender, subject, body_excerpt, is_phishing, confidence,
              rationale, explanation, action, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                verdict.message_id,
                verdict.sender,
                verdict.subject,
                verdict.body_excerpt,
                verdict.is_phishing as i32,
                verdict.confidence,
                verdict.rationale,
                explanation_json,
                verdict.action_taken.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Record a message sent by the user as a synthetic safe verdict.
    pub fn record_sent(
        &self,
        sender: &str,
        receiver: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailguardError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO decisions
             (sender, receiver, subject, body_excerpt, is_phishing, confidence,
              rationale, action, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, 'User sent', ?5, ?6)",
            params![
                sender,
                receiver,
                subject,
                body,
                RemediationAction::Sent.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent phishing verdicts, newest first.
    pub fn query_phishing(&self, limit: u32) -> Result<Vec<VerdictRecord>, MailguardError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, message_id, sender, receiver, subject, body_excerpt,
                    is_phishing, confidence, rationale, explanation, action, created_at
             FROM decisions
             WHERE is_phishing = 1
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Aggregate counters. `total == phishing + safe` always holds.
    pub fn stats(&self) -> Result<StoreStats, MailguardError> {
        let conn = self.connection()?;
        let total: u64 =
            conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))?;
        let phishing: u64 = conn.query_row(
            "SELECT COUNT(*) FROM decisions WHERE is_phishing = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreStats {
            total,
            phishing,
            safe: total - phishing,
        })
    }

    /// Administrative retention trim: keep only the newest `keep` rows by
    /// insertion order. Returns the number of rows deleted.
    pub fn trim_to_newest(&self, keep: u64) -> Result<u64, MailguardError> {
        let conn = self.connection()?;

        let current: u64 =
            conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))?;
        if current <= keep {
            debug!("No trim needed, store has {} rows", current);
            return Ok(0);
        }

        let deleted = conn.execute(
            "DELETE FROM decisions
             WHERE id NOT IN (
                 SELECT id FROM decisions
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1
             )",
            params![keep],
        )?;
        conn.execute_batch("VACUUM")?;

        info!("Trimmed {} old decisions, kept {} most recent", deleted, keep);
        Ok(deleted as u64)
    }

    /// Administrative full reset: delete every decision.
    pub fn reset(&self) -> Result<(), MailguardError> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM decisions", [])?;
        conn.execute_batch("VACUUM")?;
        warn!("Decision store reset: all verdicts deleted");
        Ok(())
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<VerdictRecord> {
    let explanation_json: Option<String> = row.get(9)?;
    let explanation = explanation_json
        .as_deref()
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default();

    let action: String = row.get(10)?;
    let created_at: String = row.get(11)?;

    Ok(VerdictRecord {
        id: row.get(0)?,
        message_id: row.get(1)?,
        sender: row.get(2)?,
        receiver: row.get(3)?,
        subject: row.get(4)?,
        body_excerpt: row.get(5)?,
        is_phishing: row.get::<_, i32>(6)? != 0,
        confidence: row.get(7)?,
        rationale: row.get(8)?,
        explanation,
        action_taken: RemediationAction::parse(&action)
            .unwrap_or(RemediationAction::Delivered),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenWeight;
    use std::sync::Arc;

    fn verdict(message_id: &str, phishing: bool) -> NewVerdict {
        NewVerdict {
            message_id: message_id.to_string(),
            sender: "alice@example.com".to_string(),
            subject: format!("subject for {}", message_id),
            body_excerpt: "body".to_string(),
            is_phishing: phishing,
            confidence: if phishing { 0.91 } else { 0.88 },
            rationale: if phishing { "bad".to_string() } else { "ok".to_string() },
            explanation: if phishing {
                Explanation {
                    phishing_tokens: vec![TokenWeight {
                        token: "urgent".to_string(),
                        weight: 0.123,
                    }],
                    safe_tokens: vec![],
                }
            } else {
                Explanation::default()
            },
            action_taken: if phishing {
                RemediationAction::Quarantined
            } else {
                RemediationAction::Delivered
            },
        }
    }

    #[test]
    fn test_append_and_exists() {
        let store = DecisionStore::in_memory().unwrap();
        assert!(!store.exists("m1").unwrap());

        assert!(store.append_if_absent(&verdict("m1", true)).unwrap());
        assert!(store.exists("m1").unwrap());

        // Second append for the same id is a no-op
        assert!(!store.append_if_absent(&verdict("m1", true)).unwrap());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.phishing, 1);
    }

    #[test]
    fn test_stats_consistency() {
        let store = DecisionStore::in_memory().unwrap();
        for i in 0..7 {
            store
                .append_if_absent(&verdict(&format!("m{}", i), i % 3 == 0))
                .unwrap();
        }
        store
            .record_sent("me@example.com", "bob@example.com", "hi", "hello")
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 8);
        assert_eq!(stats.total, stats.phishing + stats.safe);
        assert_eq!(stats.phishing, 3);
    }

    #[test]
    fn test_query_phishing_roundtrip() {
        let store = DecisionStore::in_memory().unwrap();
        store.append_if_absent(&verdict("safe1", false)).unwrap();
        store.append_if_absent(&verdict("bad1", true)).unwrap();
        store.append_if_absent(&verdict("bad2", true)).unwrap();

        let records = store.query_phishing(10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_phishing));
        assert_eq!(records[0].explanation.phishing_tokens.len(), 1);
        assert_eq!(records[0].explanation.phishing_tokens[0].token, "urgent");
        assert_eq!(records[0].action_taken, RemediationAction::Quarantined);

        let limited = store.query_phishing(1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_concurrent_append_single_winner() {
        let store = Arc::new(DecisionStore::in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.append_if_absent(&verdict("raced", true)).unwrap()
                })
            })
            .collect();

        let inserted: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(inserted, 1);
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[test]
    fn test_legacy_sender_subject_fallback() {
        let store = DecisionStore::in_memory().unwrap();

        // Simulate a row written before message ids existed
        let conn = store.connection().unwrap();
        conn.execute(
            "INSERT INTO decisions (sender, subject, is_phishing, confidence,
                                    rationale, action, created_at)
             VALUES ('old@example.com', 'Old subject', 1, 0.8, 'legacy', 'quarantined', ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();
        drop(conn);

        assert!(store.exists_legacy("old@example.com", "Old subject").unwrap());
        assert!(!store.exists_legacy("old@example.com", "Other subject").unwrap());

        // append_if_absent treats a legacy match as already decided
        let mut v = verdict("new-id", true);
        v.sender = "old@example.com".to_string();
        v.subject = "Old subject".to_string();
        assert!(!store.append_if_absent(&v).unwrap());
    }

    #[test]
    fn test_migration_adds_message_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");

        // Build a database with the pre-message_id layout
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE decisions (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     sender TEXT NOT NULL DEFAULT '',
                     subject TEXT NOT NULL DEFAULT '',
                     body_excerpt TEXT NOT NULL DEFAULT '',
                     is_phishing INTEGER NOT NULL DEFAULT 0,
                     confidence REAL NOT NULL DEFAULT 0,
                     rationale TEXT NOT NULL DEFAULT '',
                     explanation TEXT,
                     action TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );
                 INSERT INTO decisions (sender, subject, is_phishing, confidence,
                                        rationale, action, created_at)
                 VALUES ('old@example.com', 'Hello', 1, 0.9, 'r', 'quarantined',
                         '2024-01-01T00:00:00+00:00');",
            )
            .unwrap();
        }

        let store = DecisionStore::open(&path).unwrap();

        // Old row survived and is reachable through the legacy match
        assert_eq!(store.stats().unwrap().total, 1);
        assert!(store.exists_legacy("old@example.com", "Hello").unwrap());

        // New rows carry an id
        assert!(store.append_if_absent(&verdict("fresh", false)).unwrap());
        assert!(store.exists("fresh").unwrap());
    }

    #[test]
    fn test_trim_keeps_newest() {
        let store = DecisionStore::in_memory().unwrap();
        for i in 0..10 {
            store
                .append_if_absent(&verdict(&format!("m{}", i), false))
                .unwrap();
        }

        let deleted = store.trim_to_newest(4).unwrap();
        assert_eq!(deleted, 6);
        assert_eq!(store.stats().unwrap().total, 4);

        // The newest ids survive
        assert!(store.exists("m9").unwrap());
        assert!(store.exists("m6").unwrap());
        assert!(!store.exists("m0").unwrap());

        assert_eq!(store.trim_to_newest(4).unwrap(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = DecisionStore::in_memory().unwrap();
        store.append_if_absent(&verdict("m1", true)).unwrap();
        store.reset().unwrap();
        assert_eq!(store.stats().unwrap().total, 0);
        assert!(!store.exists("m1").unwrap());
    }
}
