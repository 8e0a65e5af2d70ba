//! SQLite persistence for the work-order log and catalog.
//!
//! The schema is intentionally small: an append-only `events` table plus
//! the read-mostly catalog tables (`work_order`, `findings`, `materials`).
//! Sessions are never stored - they are derived from the events by
//! `hangar-core` on every read.
//!
//! Appends are idempotent (`ON CONFLICT(id) DO NOTHING` on the caller's
//! event id) and serialized by SQLite's write lock, which is the
//! per-(finding, employee) linearization point the engine's check-then-act
//! contract assumes. Reads return events ordered by `recorded_at` with
//! `rowid` breaking ties, so every consumer sees one canonical order.

use chrono::{DateTime, Utc};
use hangar_protocol::{
    Finding, FindingStatus, Material, WorkEvent, WorkOrderInfo, WorkOrderSnapshot,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::PathBuf;

use crate::error::{io, json, sqlite, Result, StoreError};

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event log
    // ─────────────────────────────────────────────────────────────────────

    /// Appends one event. Validates first; a rejected record never reaches
    /// the log. Re-appending an id already present is a silent no-op.
    pub fn append_event(&self, event: &WorkEvent) -> Result<()> {
        event.validate()?;

        self.with_connection(|conn| {
            let payload =
                serde_json::to_string(event).map_err(json("serialize event payload"))?;

            conn.execute(
                "INSERT INTO events (id, recorded_at, finding_id, employee_id, action, payload)\
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)\
                 ON CONFLICT(id) DO NOTHING",
                params![
                    event.event_id,
                    event.recorded_at.to_rfc3339(),
                    event.finding_id,
                    event.employee_id,
                    event.action.as_str(),
                    payload
                ],
            )
            .map_err(sqlite("insert event"))?;

            Ok(())
        })
    }

    /// The full log in derivation order: timestamp ascending, insertion
    /// order breaking ties.
    pub fn list_events(&self) -> Result<Vec<WorkEvent>> {
        self.query_events("SELECT payload FROM events ORDER BY recorded_at ASC, rowid ASC", [])
    }

    pub fn list_events_for_finding(&self, finding_id: &str) -> Result<Vec<WorkEvent>> {
        self.query_events(
            "SELECT payload FROM events WHERE finding_id = ?1 \
             ORDER BY recorded_at ASC, rowid ASC",
            params![finding_id],
        )
    }

    pub fn latest_event_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_connection(|conn| {
            let recorded_at: Option<String> = conn
                .query_row(
                    "SELECT recorded_at FROM events ORDER BY recorded_at DESC, rowid DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sqlite("query latest event timestamp"))?;
            Ok(recorded_at.as_deref().and_then(parse_rfc3339))
        })
    }

    fn query_events<P: rusqlite::Params>(&self, sql: &str, query_params: P) -> Result<Vec<WorkEvent>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql).map_err(sqlite("prepare events query"))?;

            let rows = stmt
                .query_map(query_params, |row| row.get::<_, String>(0))
                .map_err(sqlite("read event rows"))?;

            let mut events = Vec::new();
            for row in rows {
                let payload = row.map_err(sqlite("decode event row"))?;
                let event: WorkEvent =
                    serde_json::from_str(&payload).map_err(json("parse event payload"))?;
                events.push(event);
            }

            Ok(events)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────

    pub fn upsert_work_order(&self, info: &WorkOrderInfo) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO work_order (id, wo_no, reg, customer, description, pn, sn) \
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                    wo_no = excluded.wo_no, \
                    reg = excluded.reg, \
                    customer = excluded.customer, \
                    description = excluded.description, \
                    pn = excluded.pn, \
                    sn = excluded.sn",
                params![
                    info.wo_no,
                    info.reg,
                    info.customer,
                    info.description,
                    info.pn,
                    info.sn
                ],
            )
            .map_err(sqlite("upsert work order"))?;
            Ok(())
        })
    }

    pub fn get_work_order(&self) -> Result<Option<WorkOrderInfo>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT wo_no, reg, customer, description, pn, sn FROM work_order WHERE id = 1",
                [],
                |row| {
                    Ok(WorkOrderInfo {
                        wo_no: row.get(0)?,
                        reg: row.get(1)?,
                        customer: row.get(2)?,
                        description: row.get(3)?,
                        pn: row.get(4)?,
                        sn: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(sqlite("query work order"))
        })
    }

    pub fn upsert_finding(&self, finding: &Finding) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO findings (id, description, action_given, image_url, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET \
                    description = excluded.description, \
                    action_given = excluded.action_given, \
                    image_url = excluded.image_url, \
                    status = excluded.status",
                params![
                    finding.id,
                    finding.description,
                    finding.action_given,
                    finding.image_url,
                    finding.status.as_str()
                ],
            )
            .map_err(sqlite("upsert finding"))?;
            Ok(())
        })
    }

    pub fn get_finding(&self, finding_id: &str) -> Result<Option<Finding>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, description, action_given, image_url, status \
                 FROM findings WHERE id = ?1",
                params![finding_id],
                finding_from_row,
            )
            .optional()
            .map_err(sqlite("query finding"))
        })
    }

    pub fn list_findings(&self) -> Result<Vec<Finding>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, description, action_given, image_url, status \
                     FROM findings ORDER BY id ASC",
                )
                .map_err(sqlite("prepare findings query"))?;

            let rows = stmt
                .query_map([], finding_from_row)
                .map_err(sqlite("query findings"))?;

            let mut findings = Vec::new();
            for row in rows {
                findings.push(row.map_err(sqlite("decode finding row"))?);
            }
            Ok(findings)
        })
    }

    /// Applies a finalization's status transition. The engine decides when
    /// this is allowed; the store only records it.
    pub fn set_finding_status(&self, finding_id: &str, status: FindingStatus) -> Result<()> {
        let updated = self.with_connection(|conn| {
            conn.execute(
                "UPDATE findings SET status = ?2 WHERE id = ?1",
                params![finding_id, status.as_str()],
            )
            .map_err(sqlite("update finding status"))
        })?;

        if updated == 0 {
            return Err(StoreError::FindingNotFound(finding_id.to_string()));
        }
        tracing::info!(finding_id, status = status.as_str(), "finding status updated");
        Ok(())
    }

    pub fn upsert_material(&self, material: &Material) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO materials (pn, finding_id, description, qty, uom, available) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(pn, finding_id) DO UPDATE SET \
                    description = excluded.description, \
                    qty = excluded.qty, \
                    uom = excluded.uom, \
                    available = excluded.available",
                params![
                    material.pn,
                    material.finding_id,
                    material.description,
                    material.qty,
                    material.uom,
                    material.available
                ],
            )
            .map_err(sqlite("upsert material"))?;
            Ok(())
        })
    }

    pub fn list_materials(&self) -> Result<Vec<Material>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT pn, finding_id, description, qty, uom, available \
                     FROM materials ORDER BY finding_id ASC, pn ASC",
                )
                .map_err(sqlite("prepare materials query"))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(Material {
                        pn: row.get(0)?,
                        finding_id: row.get(1)?,
                        description: row.get(2)?,
                        qty: row.get(3)?,
                        uom: row.get(4)?,
                        available: row.get(5)?,
                    })
                })
                .map_err(sqlite("query materials"))?;

            let mut materials = Vec::new();
            for row in rows {
                materials.push(row.map_err(sqlite("decode material row"))?);
            }
            Ok(materials)
        })
    }

    /// The read-only catalog snapshot handed to presentation layers.
    /// Missing work-order info degrades to an empty header.
    pub fn snapshot(&self) -> Result<WorkOrderSnapshot> {
        Ok(WorkOrderSnapshot {
            info: self.get_work_order()?.unwrap_or_default(),
            findings: self.list_findings()?,
            materials: self.list_materials()?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS events (
                    id TEXT PRIMARY KEY,
                    recorded_at TEXT NOT NULL,
                    finding_id TEXT NOT NULL,
                    employee_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    payload TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_events_finding
                    ON events (finding_id, recorded_at);
                 CREATE TABLE IF NOT EXISTS work_order (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    wo_no TEXT NOT NULL,
                    reg TEXT NOT NULL,
                    customer TEXT NOT NULL,
                    description TEXT NOT NULL,
                    pn TEXT NOT NULL,
                    sn TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS findings (
                    id TEXT PRIMARY KEY,
                    description TEXT NOT NULL,
                    action_given TEXT NOT NULL DEFAULT '',
                    image_url TEXT,
                    status TEXT NOT NULL DEFAULT 'OPEN'
                 );
                 CREATE TABLE IF NOT EXISTS materials (
                    pn TEXT NOT NULL,
                    finding_id TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    qty REAL NOT NULL DEFAULT 0,
                    uom TEXT NOT NULL DEFAULT '',
                    available INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (pn, finding_id)
                 );
                 COMMIT;",
            )
            .map_err(sqlite("initialize schema"))?;
            Ok(())
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io("create store data dir"))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(sqlite("open sqlite db"))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(sqlite("enable WAL"))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(sqlite("set synchronous"))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(sqlite("set busy_timeout"))?;

        Ok(conn)
    }
}

fn finding_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Finding> {
    let status_raw: String = row.get(4)?;
    let status = FindingStatus::from_str(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            status_raw.len(),
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown finding status: {}", status_raw),
            )),
        )
    })?;

    Ok(Finding {
        id: row.get(0)?,
        description: row.get(1)?,
        action_given: row.get(2)?,
        image_url: row.get(3)?,
        status,
    })
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
