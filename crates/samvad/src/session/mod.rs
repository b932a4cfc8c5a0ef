//! Session persistence: append-only conversation turns and tool usage.
//!
//! One SQLite database holds a `conversations` table (one row per stored
//! turn) and a `tool_usage` table (informational log of tool invocations,
//! never read back into the reasoning loop). Turns are never mutated or
//! deleted. A mutex around the connection serializes concurrent writers so
//! per-session history is never interleaved out of order.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;

/// Role of a stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Human,
    Ai,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::Human => "human",
            TurnRole::Ai => "ai",
        }
    }

    fn from_db(value: &str) -> TurnRole {
        match value {
            "ai" => TurnRole::Ai,
            _ => TurnRole::Human,
        }
    }
}

/// One stored human or assistant message within a session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub role: TurnRole,
    pub content: String,
}

/// One logged tool invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolUsage {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub tool_name: String,
    pub input: String,
    pub output: String,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tool_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                input TEXT NOT NULL,
                output TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Mint a fresh session identifier. Nothing is stored until the first
    /// turn, so a never-used session is absent from `list_sessions`.
    pub fn create_session(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Append one turn. Each append is its own transaction; a storage
    /// failure means the interaction is not complete.
    pub fn append_turn(&self, session_id: &str, role: TurnRole, content: &str) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (thread_id, timestamp, role, content) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, timestamp, role.as_str(), content],
        )?;
        Ok(())
    }

    /// Append one completed interaction's human/assistant pair in a single
    /// transaction, so concurrent interactions on the same session can
    /// never interleave between the two turns.
    pub fn append_exchange(&self, session_id: &str, human: &str, ai: &str) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (role, content) in [(TurnRole::Human, human), (TurnRole::Ai, ai)] {
            tx.execute(
                "INSERT INTO conversations (thread_id, timestamp, role, content) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, timestamp, role.as_str(), content],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All turns of a session in non-decreasing timestamp order; identical
    /// timestamps fall back to insertion order.
    pub fn get_history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let conn = self.conn.lock();
        let mut statement = conn.prepare(
            "SELECT id, thread_id, timestamp, role, content FROM conversations
             WHERE thread_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let turns = statement
            .query_map(params![session_id], |row| {
                Ok(Turn {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    role: TurnRole::from_db(&row.get::<_, String>(3)?),
                    content: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    /// Distinct session ids that have at least one stored turn.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut statement =
            conn.prepare("SELECT DISTINCT thread_id FROM conversations ORDER BY thread_id")?;
        let ids = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Log a tool invocation. Informational only.
    pub fn log_tool_invocation(
        &self,
        session_id: &str,
        tool_name: &str,
        input: &str,
        output: &str,
    ) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tool_usage (thread_id, timestamp, tool_name, input, output)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, timestamp, tool_name, input, output],
        )?;
        Ok(())
    }

    pub fn get_tool_usage(&self, session_id: &str) -> Result<Vec<ToolUsage>> {
        let conn = self.conn.lock();
        let mut statement = conn.prepare(
            "SELECT id, thread_id, timestamp, tool_name, input, output FROM tool_usage
             WHERE thread_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let usage = statement
            .query_map(params![session_id], |row| {
                Ok(ToolUsage {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    tool_name: row.get(3)?,
                    input: row.get(4)?,
                    output: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(usage)
    }
}
