// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{error, warn};

use crate::error::AgentError;
use crate::point::Point;

use super::Buffer;

const DEFAULT_MAX_SIZE: usize = 100_000;

/// WAL-mode SQLite buffer. Survives process restarts; points are stored as
/// JSON blobs in a single table, ordered by auto-increment rowid for FIFO.
pub struct SqliteBuffer {
    max_size: usize,
    conn: Mutex<Connection>,
}

impl SqliteBuffer {
    pub fn open(path: impl AsRef<Path>, max_size: usize) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS points (id INTEGER PRIMARY KEY AUTOINCREMENT, data TEXT NOT NULL)",
            [],
        )?;
        Ok(Self { max_size, conn: Mutex::new(conn) })
    }

    /// Open the default buffer location, `~/.plexus/buffer.db`.
    pub fn open_default(max_size: usize) -> anyhow::Result<Self> {
        let dir = default_dir()?;
        std::fs::create_dir_all(&dir)?;
        Self::open(dir.join("buffer.db"), max_size)
    }
}

fn default_dir() -> anyhow::Result<PathBuf> {
    let home = dirs_home()?;
    Ok(home.join(".plexus"))
}

fn dirs_home() -> anyhow::Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("HOME environment variable not set"))
}

impl Buffer for SqliteBuffer {
    fn add(&self, points: &[Point]) -> Result<usize, AgentError> {
        if points.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result: rusqlite::Result<usize> = (|| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare_cached("INSERT INTO points (data) VALUES (?1)")?;
                for p in points {
                    let json = serde_json::to_string(p)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    stmt.execute([json])?;
                }
            }
            tx.commit()?;
            evict(&conn, self.max_size)
        })();

        match result {
            Ok(evicted) => {
                if evicted > 0 {
                    warn!(evicted, "durable buffer full, dropped oldest points");
                }
                Ok(evicted)
            }
            Err(e) => {
                error!(error = %e, "failed to persist points to durable buffer");
                Err(AgentError::Transport(format!("durable buffer write failed: {e}")))
            }
        }
    }

    fn snapshot(&self) -> Vec<Point> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result: rusqlite::Result<Vec<Point>> = (|| {
            let mut stmt = conn.prepare("SELECT data FROM points ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                let json = row?;
                if let Ok(p) = serde_json::from_str::<Point>(&json) {
                    out.push(p);
                } else {
                    warn!("dropping unreadable row from durable buffer");
                }
            }
            Ok(out)
        })();
        result.unwrap_or_else(|e| {
            error!(error = %e, "failed to read durable buffer");
            Vec::new()
        })
    }

    fn clear(&self) {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = conn.execute("DELETE FROM points", []) {
            error!(error = %e, "failed to clear durable buffer");
        }
    }

    fn len(&self) -> usize {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0)).unwrap_or(0)
    }
}

/// Evict oldest rows over `max_size`. Returns the number evicted.
fn evict(conn: &Connection, max_size: usize) -> rusqlite::Result<usize> {
    let count: usize = conn.query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))?;
    if count <= max_size {
        return Ok(0);
    }
    let overflow = count - max_size;
    conn.execute(
        "DELETE FROM points WHERE id IN (SELECT id FROM points ORDER BY id LIMIT ?1)",
        [overflow],
    )?;
    Ok(overflow)
}

#[cfg(test)]
#[path = "durable_tests.rs"]
mod tests;
