//! Ticket store: the only mutable shared state in the process.
//!
//! A thin layer over a `SqlitePool` with a strict transactional boundary:
//! every public mutator is one atomic unit, so readers observe either all of
//! a request's side-effects (ticket, prediction, history, notifications) or
//! none of them. Reads run outside transactions on consistent snapshots.
//!
//! The store is constructed once at startup and injected into the
//! orchestrator, the SLA loop, and the HTTP handlers: no global session.

pub mod activity;
pub mod tickets;
pub mod users;

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{HistoryAction, Queue};
use crate::error::AppError;

/// A history row ready for insertion inside a mutator's transaction.
#[derive(Debug, Clone)]
pub struct NewHistory {
    pub actor_id: Option<Uuid>,
    pub action: HistoryAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect, create the schema if needed, and seed the queue departments.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options: SqliteConnectOptions = url
            .parse::<SqliteConnectOptions>()
            .map_err(|e| AppError::Unavailable(format!("invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database exists per connection; a wider pool would
        // hand each connection its own empty database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Raw pool access for aggregate queries and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        self.seed_departments().await?;
        Ok(())
    }

    /// Queues map 1:1 to departments; make sure every queue has its row.
    async fn seed_departments(&self) -> Result<(), AppError> {
        for queue in Queue::ALL {
            sqlx::query("INSERT OR IGNORE INTO departments (id, name) VALUES (?, ?)")
                .bind(Uuid::new_v4())
                .bind(queue.as_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id            BLOB PRIMARY KEY,
        email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
        name          TEXT NOT NULL,
        role          TEXT NOT NULL,
        password_hash TEXT,
        phone         TEXT,
        created_at    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS departments (
        id   BLOB PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS categories (
        id          BLOB PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
        description TEXT,
        sla_minutes INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS operators (
        id            BLOB PRIMARY KEY,
        user_id       BLOB NOT NULL UNIQUE REFERENCES users(id),
        department_id BLOB REFERENCES departments(id) ON DELETE RESTRICT,
        is_active     INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS tickets (
        id                     BLOB PRIMARY KEY,
        source                 TEXT NOT NULL,
        author_id              BLOB NOT NULL REFERENCES users(id),
        subject                TEXT,
        body                   TEXT NOT NULL,
        language               TEXT NOT NULL,
        category_id            BLOB REFERENCES categories(id),
        priority               TEXT,
        issue_type             TEXT,
        ai_confidence          REAL NOT NULL DEFAULT 0,
        queue                  TEXT,
        assigned_department_id BLOB REFERENCES departments(id) ON DELETE RESTRICT,
        assigned_operator_id   BLOB REFERENCES operators(id),
        status                 TEXT NOT NULL,
        auto_resolved          INTEGER NOT NULL DEFAULT 0,
        needs_clarification    INTEGER NOT NULL DEFAULT 0,
        confidence_warning     TEXT,
        sla_deadline           TEXT,
        is_escalated           INTEGER NOT NULL DEFAULT 0,
        created_at             TEXT NOT NULL,
        updated_at             TEXT NOT NULL,
        closed_at              TEXT
    )",
    "CREATE TABLE IF NOT EXISTS ticket_messages (
        id          BLOB PRIMARY KEY,
        ticket_id   BLOB NOT NULL REFERENCES tickets(id),
        sender_id   BLOB NOT NULL REFERENCES users(id),
        text        TEXT NOT NULL,
        attachments TEXT,
        created_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ticket_history (
        id          BLOB PRIMARY KEY,
        ticket_id   BLOB NOT NULL REFERENCES tickets(id),
        actor_id    BLOB,
        action      TEXT NOT NULL,
        old_value   TEXT,
        new_value   TEXT,
        description TEXT,
        created_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id           BLOB PRIMARY KEY,
        recipient_id BLOB NOT NULL REFERENCES users(id),
        ticket_id    BLOB REFERENCES tickets(id),
        kind         TEXT NOT NULL,
        title        TEXT NOT NULL,
        message      TEXT NOT NULL,
        is_read      INTEGER NOT NULL DEFAULT 0,
        created_at   TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS feedback (
        id         BLOB PRIMARY KEY,
        ticket_id  BLOB NOT NULL REFERENCES tickets(id),
        user_id    BLOB,
        rating     INTEGER NOT NULL,
        comment    TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ai_predictions (
        id                    BLOB PRIMARY KEY,
        ticket_id             BLOB NOT NULL REFERENCES tickets(id),
        model_id              TEXT NOT NULL,
        predicted_category_id BLOB,
        predicted_priority    TEXT,
        predicted_issue_type  TEXT,
        confidence            REAL NOT NULL,
        created_at            TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS auto_responses (
        id            BLOB PRIMARY KEY,
        ticket_id     BLOB NOT NULL REFERENCES tickets(id),
        response_text TEXT NOT NULL,
        is_successful INTEGER NOT NULL DEFAULT 1,
        created_at    TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tickets_author ON tickets (author_id)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status_deadline ON tickets (status, sla_deadline)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications (recipient_id, is_read)",
    "CREATE INDEX IF NOT EXISTS idx_messages_ticket ON ticket_messages (ticket_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_history_ticket ON ticket_history (ticket_id, created_at)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_feedback_ticket ON feedback (ticket_id)",
];

#[cfg(test)]
pub(crate) mod testing {
    use super::Store;

    /// Fresh in-memory store with the full schema.
    pub async fn memory_store() -> Store {
        Store::connect("sqlite::memory:")
            .await
            .expect("in-memory store should connect")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_initializes_on_a_fresh_database() {
        let store = testing::memory_store().await;
        // a second init is a no-op thanks to IF NOT EXISTS
        store.init_schema().await.expect("re-init should succeed");
    }

    #[tokio::test]
    async fn every_queue_has_a_seeded_department() {
        let store = testing::memory_store().await;
        for queue in Queue::ALL {
            let dept = store
                .department_by_name(queue.as_str())
                .await
                .expect("lookup should succeed");
            assert!(dept.is_some(), "missing department for {queue}");
        }
    }

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate_departments() {
        let store = testing::memory_store().await;
        store.seed_departments().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM departments")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, Queue::ALL.len() as i64);
    }
}
