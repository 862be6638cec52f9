use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::extract::TaskRecord;
use crate::parser::tokens::Rect;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS task_records (
            id           INTEGER PRIMARY KEY,
            run_id       TEXT NOT NULL,
            frame        TEXT NOT NULL,
            position     INTEGER NOT NULL,
            name         TEXT NOT NULL,
            description  TEXT NOT NULL,
            reward       TEXT,
            time_limit   TEXT,
            difficulty   TEXT,
            accept_box   TEXT,
            abandon_box  TEXT,
            extracted_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(run_id, frame, position)
        );
        CREATE INDEX IF NOT EXISTS idx_records_name ON task_records(name);
        CREATE INDEX IF NOT EXISTS idx_records_run ON task_records(run_id);
        ",
    )?;
    Ok(())
}

// ── Records ──

/// Replace one frame's records, in panel order. Returns rows written.
pub fn save_records(
    conn: &Connection,
    run_id: &str,
    frame: &str,
    records: &[TaskRecord],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM task_records WHERE run_id = ?1 AND frame = ?2",
        rusqlite::params![run_id, frame],
    )?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO task_records
             (run_id, frame, position, name, description, reward, time_limit, difficulty,
              accept_box, abandon_box)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for (position, r) in records.iter().enumerate() {
            count += stmt.execute(rusqlite::params![
                run_id,
                frame,
                position as i64,
                r.name,
                r.description,
                r.reward,
                r.time_limit,
                r.difficulty,
                rect_to_json(r.accept_box)?,
                rect_to_json(r.abandon_box)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct HistoryRow {
    pub run_id: String,
    pub frame: String,
    pub extracted_at: String,
    pub record: TaskRecord,
}

pub fn fetch_history(
    conn: &Connection,
    name: Option<&str>,
    limit: usize,
) -> Result<Vec<HistoryRow>> {
    let where_clause = if name.is_some() { " WHERE name = ?1" } else { "" };
    let sql = format!(
        "SELECT run_id, frame, extracted_at, name, description, reward, time_limit,
                difficulty, accept_box, abandon_box
         FROM task_records{}
         ORDER BY id DESC
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = match &name {
        Some(n) => vec![n as &dyn rusqlite::types::ToSql],
        None => Vec::new(),
    };
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            let accept: Option<String> = row.get(8)?;
            let abandon: Option<String> = row.get(9)?;
            Ok(HistoryRow {
                run_id: row.get(0)?,
                frame: row.get(1)?,
                extracted_at: row.get(2)?,
                record: TaskRecord {
                    name: row.get(3)?,
                    description: row.get(4)?,
                    reward: row.get(5)?,
                    time_limit: row.get(6)?,
                    difficulty: row.get(7)?,
                    accept_box: rect_from_json(accept),
                    abandon_box: rect_from_json(abandon),
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn rect_to_json(rect: Option<Rect>) -> Result<Option<String>> {
    Ok(rect.map(|r| serde_json::to_string(&r)).transpose()?)
}

fn rect_from_json(raw: Option<String>) -> Option<Rect> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

// ── Stats ──

pub struct Stats {
    pub records: usize,
    pub frames: usize,
    pub runs: usize,
    pub names: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let records: usize =
        conn.query_row("SELECT COUNT(*) FROM task_records", [], |r| r.get(0))?;
    let frames: usize = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT DISTINCT run_id, frame FROM task_records)",
        [],
        |r| r.get(0),
    )?;
    let runs: usize =
        conn.query_row("SELECT COUNT(DISTINCT run_id) FROM task_records", [], |r| r.get(0))?;
    let names: usize =
        conn.query_row("SELECT COUNT(DISTINCT name) FROM task_records", [], |r| r.get(0))?;
    Ok(Stats {
        records,
        frames,
        runs,
        names,
    })
}
