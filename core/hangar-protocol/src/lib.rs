//! Log and catalog types for the Hangar man-hour tracker.
//!
//! This crate is shared by the engine, the store, and the CLI to prevent
//! schema drift. The store is the authority on what gets persisted, but
//! every consumer reuses the same types to construct valid records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifiers longer than this are rejected before they reach the log.
pub const MAX_ID_LEN: usize = 64;
pub const MAX_EVENT_ID_LEN: usize = 128;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Lifecycle status of a finding. Only last-worker finalization (or the
/// external seed) is allowed to change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    #[default]
    Open,
    InProgress,
    OnHold,
    Closed,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Open => "OPEN",
            FindingStatus::InProgress => "IN_PROGRESS",
            FindingStatus::OnHold => "ON_HOLD",
            FindingStatus::Closed => "CLOSED",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(FindingStatus::Open),
            "IN_PROGRESS" => Some(FindingStatus::InProgress),
            "ON_HOLD" => Some(FindingStatus::OnHold),
            "CLOSED" => Some(FindingStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkAction {
    Start,
    Stop,
}

impl WorkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkAction::Start => "START",
            WorkAction::Stop => "STOP",
        }
    }
}

/// One record of the append-only performing log.
///
/// The log is the single source of truth; sessions are derived from it and
/// never stored. STOP records carry the stop payload (final status, the
/// authoritative duration, and optional closure evidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkEvent {
    pub event_id: String,
    pub finding_id: String,
    pub employee_id: String,
    pub task_code: String,
    pub action: WorkAction,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<FindingStatus>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl WorkEvent {
    pub fn start(
        event_id: impl Into<String>,
        finding_id: impl Into<String>,
        employee_id: impl Into<String>,
        task_code: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            finding_id: finding_id.into(),
            employee_id: employee_id.into(),
            task_code: task_code.into(),
            action: WorkAction::Start,
            recorded_at,
            status: None,
            duration_secs: None,
            evidence: None,
        }
    }

    pub fn stop(
        event_id: impl Into<String>,
        finding_id: impl Into<String>,
        employee_id: impl Into<String>,
        task_code: impl Into<String>,
        recorded_at: DateTime<Utc>,
        status: FindingStatus,
        duration_secs: u64,
        evidence: Option<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            finding_id: finding_id.into(),
            employee_id: employee_id.into(),
            task_code: task_code.into(),
            action: WorkAction::Stop,
            recorded_at,
            status: Some(status),
            duration_secs: Some(duration_secs),
            evidence,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.event_id.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_event_id", "event_id is required"));
        }
        if self.event_id.len() > MAX_EVENT_ID_LEN {
            return Err(ErrorInfo::new(
                "invalid_event_id",
                format!("event_id must be {} characters or fewer", MAX_EVENT_ID_LEN),
            ));
        }

        require_id(&self.finding_id, "finding_id")?;
        require_id(&self.employee_id, "employee_id")?;
        require_id(&self.task_code, "task_code")?;

        match self.action {
            WorkAction::Start => {
                if self.status.is_some() || self.duration_secs.is_some() || self.evidence.is_some()
                {
                    return Err(ErrorInfo::new(
                        "invalid_payload",
                        "START records carry no stop payload",
                    ));
                }
            }
            WorkAction::Stop => {
                let status = self.status.ok_or_else(|| {
                    ErrorInfo::new("missing_field", "STOP records require a status")
                })?;
                if self.duration_secs.is_none() {
                    return Err(ErrorInfo::new(
                        "missing_field",
                        "STOP records require duration_secs",
                    ));
                }
                if status == FindingStatus::Open {
                    return Err(ErrorInfo::new(
                        "invalid_status",
                        "OPEN is not a valid stop status",
                    ));
                }
                if status == FindingStatus::Closed && !has_evidence(&self.evidence) {
                    return Err(ErrorInfo::new(
                        "evidence_required",
                        "closing STOP records require evidence",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Parses and validates an event from a JSON payload, for transport layers
/// that receive records as raw JSON.
pub fn parse_event(value: serde_json::Value) -> Result<WorkEvent, ErrorInfo> {
    let event: WorkEvent = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("event payload is invalid JSON: {}", err),
        )
    })?;
    event.validate()?;
    Ok(event)
}

/// True when an opaque evidence payload is actually present. The engine
/// checks presence only, never content or format.
pub fn has_evidence(evidence: &Option<String>) -> bool {
    evidence
        .as_deref()
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}

fn require_id(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    if value.len() > MAX_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_field",
            format!("{} must be {} characters or fewer", field, MAX_ID_LEN),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Work-order catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Header context for a work order, read-only from the engine's view.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkOrderInfo {
    #[serde(default)]
    pub wo_no: String,
    #[serde(default)]
    pub reg: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pn: String,
    #[serde(default)]
    pub sn: String,
}

/// A maintenance discrepancy recorded against the work order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub action_given: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: FindingStatus,
}

/// A material line, many per finding. No lifecycle of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub pn: String,
    pub finding_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub uom: String,
    #[serde(default)]
    pub available: bool,
}

/// Read-only catalog snapshot handed to presentation layers alongside the
/// derived session sets.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkOrderSnapshot {
    #[serde(default)]
    pub info: WorkOrderInfo,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl WorkOrderSnapshot {
    pub fn finding(&self, finding_id: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.id == finding_id)
    }

    pub fn materials_for<'a>(&'a self, finding_id: &'a str) -> impl Iterator<Item = &'a Material> + 'a {
        self.materials
            .iter()
            .filter(move |m| m.finding_id == finding_id)
    }
}
