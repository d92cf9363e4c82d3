//! SQLite-backed message store.
//!
//! Implements the storage boundary the pipeline and the chat_history tool
//! talk to: idempotent turn persistence plus bounded recent-window reads.

use crate::models::{Turn, TurnRole};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Result as SqliteResult};

pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(database_url: &str) -> Result<Self, String> {
        let manager = if database_url == ":memory:" {
            SqliteConnectionManager::memory()
        } else {
            if let Some(parent) = std::path::Path::new(database_url).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create database directory: {}", e))?;
            }
            SqliteConnectionManager::file(database_url)
        };

        // A single in-memory connection would otherwise be a fresh empty
        // database per pool checkout.
        let max_size = if database_url == ":memory:" { 1 } else { 8 };

        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| format!("Failed to create connection pool: {}", e))?;

        let db = Database { pool };
        db.init_schema().map_err(|e| format!("Failed to initialize schema: {}", e))?;
        Ok(db)
    }

    pub fn conn(&self) -> DbConn {
        self.pool.get().expect("Failed to get database connection from pool")
    }

    fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_key TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT,
                sender_id TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                participants TEXT NOT NULL DEFAULT '[]',
                message_id TEXT UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_conversation
                ON turns (conversation_key, id);",
        )
    }

    /// Persist a turn. Idempotent on `message_id`: replaying a webhook event
    /// with the same platform identifier is a no-op. Returns the row id, or
    /// the existing row's id when the turn was already stored.
    pub fn append_turn(&self, turn: &Turn) -> SqliteResult<i64> {
        let conn = self.conn();
        let participants_json =
            serde_json::to_string(&turn.participants).unwrap_or_else(|_| "[]".to_string());

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO turns
                (conversation_key, role, text, sender_id, sender_name, participants, message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                turn.conversation_key,
                turn.role.as_str(),
                turn.text,
                turn.sender_id,
                turn.sender_name,
                participants_json,
                turn.message_id,
                turn.created_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            // Duplicate message_id — look up the original row.
            if let Some(ref message_id) = turn.message_id {
                return conn.query_row(
                    "SELECT id FROM turns WHERE message_id = ?1",
                    params![message_id],
                    |row| row.get(0),
                );
            }
        }

        Ok(conn.last_insert_rowid())
    }

    /// The bounded recent window for a conversation, newest first.
    pub fn recent_window(&self, conversation_key: &str, limit: usize) -> SqliteResult<Vec<Turn>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_key, role, text, sender_id, sender_name, participants, message_id, created_at
             FROM turns
             WHERE conversation_key = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![conversation_key, limit as i64], Self::row_to_turn)?;
        rows.collect()
    }

    /// Turns from one sender in a conversation, newest first. Used by the
    /// chat_history tool to reach past the prompt window.
    pub fn sender_history(
        &self,
        conversation_key: &str,
        sender_name: &str,
        limit: usize,
    ) -> SqliteResult<Vec<Turn>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_key, role, text, sender_id, sender_name, participants, message_id, created_at
             FROM turns
             WHERE conversation_key = ?1 AND sender_name = ?2 COLLATE NOCASE
             ORDER BY id DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![conversation_key, sender_name, limit as i64],
            Self::row_to_turn,
        )?;
        rows.collect()
    }

    fn row_to_turn(row: &rusqlite::Row) -> SqliteResult<Turn> {
        let role_str: String = row.get(2)?;
        let participants_json: String = row.get(6)?;
        let created_at_str: String = row.get(8)?;

        Ok(Turn {
            id: Some(row.get(0)?),
            conversation_key: row.get(1)?,
            role: TurnRole::from_str(&role_str).unwrap_or(TurnRole::User),
            text: row.get(3)?,
            sender_id: row.get(4)?,
            sender_name: row.get(5)?,
            participants: serde_json::from_str(&participants_json).unwrap_or_default(),
            message_id: row.get(7)?,
            created_at: created_at_str
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
