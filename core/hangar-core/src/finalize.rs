//! Stop resolution and the finalization state machine.
//!
//! Stopping runs in three steps, each a fresh derivation over the log:
//!
//! ```text
//! request_stop   -> NoActiveSessions | SingleCandidate | SelectCandidate
//! resolve_stop   -> NotActive | PassThrough | RequiresFinalStatus
//! complete_stop  -> Completed | NotActive | RequiresFinalStatus | EvidenceRequired
//! ```
//!
//! A stop while other workers remain active is a pass-through: the STOP
//! record carries IN_PROGRESS and the finding's own status is untouched.
//! The last worker out must pick a final status, and CLOSED demands
//! evidence before anything is appended. A pending finalization holds no
//! lock; abandoning it just leaves the session open in the log.

use chrono::{DateTime, Utc};
use hangar_protocol::{has_evidence, FindingStatus, WorkEvent};

use crate::derive::{active_sessions, Session};
use crate::duration::elapsed_secs;

/// First step: who could be stopped on this finding?
#[derive(Debug, Clone, PartialEq)]
pub enum StopPrompt {
    /// Nothing to stop; a no-op condition, not a fault.
    NoActiveSessions,
    /// Exactly one active session - the implicit stop target.
    SingleCandidate(Session),
    /// Two or more active sessions; the caller must pick one. The engine
    /// never guesses.
    SelectCandidate(Vec<Session>),
}

pub fn request_stop(log: &[WorkEvent], finding_id: &str) -> StopPrompt {
    let mut sessions = active_sessions(log, finding_id);
    match sessions.len() {
        0 => StopPrompt::NoActiveSessions,
        1 => StopPrompt::SingleCandidate(sessions.remove(0)),
        _ => StopPrompt::SelectCandidate(sessions),
    }
}

/// Second step: what does stopping this specific employee mean?
#[derive(Debug, Clone, PartialEq)]
pub enum StopResolution {
    /// No open session for that employee. Idempotent no-op.
    NotActive,
    /// Others remain active; the stop will not touch the finding status.
    PassThrough(Session),
    /// Last active worker: the caller must supply a final status
    /// (and evidence, if closing) before the stop can complete.
    RequiresFinalStatus(Session),
}

pub fn resolve_stop(log: &[WorkEvent], finding_id: &str, employee_id: &str) -> StopResolution {
    let sessions = active_sessions(log, finding_id);
    let Some(session) = sessions
        .iter()
        .find(|session| session.employee_id == employee_id)
        .cloned()
    else {
        return StopResolution::NotActive;
    };

    if sessions.len() > 1 {
        StopResolution::PassThrough(session)
    } else {
        StopResolution::RequiresFinalStatus(session)
    }
}

/// Terminal statuses a last worker may assign. A closed set so the
/// OPEN-is-not-terminal rule holds at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    InProgress,
    OnHold,
    Closed,
}

impl FinalStatus {
    pub fn as_finding_status(&self) -> FindingStatus {
        match self {
            FinalStatus::InProgress => FindingStatus::InProgress,
            FinalStatus::OnHold => FindingStatus::OnHold,
            FinalStatus::Closed => FindingStatus::Closed,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "IN_PROGRESS" => Some(FinalStatus::InProgress),
            "ON_HOLD" => Some(FinalStatus::OnHold),
            "CLOSED" => Some(FinalStatus::Closed),
            _ => None,
        }
    }
}

/// What the caller wants the stop to do.
#[derive(Debug, Clone, PartialEq)]
pub enum StopDisposition {
    /// Plain stop; valid only while other workers remain active.
    PassThrough,
    /// Last-worker finalization with a target status and optional
    /// evidence payload (mandatory when closing).
    Finalize {
        status: FinalStatus,
        evidence: Option<String>,
    },
}

/// The stop payload that becomes part of the appended STOP record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub status: FindingStatus,
    pub duration_secs: u64,
    pub evidence_present: bool,
}

/// A completed stop: the event to append, the recorded outcome, and the
/// finding status to apply (only set on last-worker finalization).
#[derive(Debug, Clone, PartialEq)]
pub struct StopCompletion {
    pub event: WorkEvent,
    pub outcome: StopOutcome,
    pub finding_status: Option<FindingStatus>,
}

/// Third step result. Only `Completed` yields an event; every other
/// variant leaves the log exactly as it was.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum StopAttempt {
    Completed(StopCompletion),
    /// No open session for that employee (repeat or stale request).
    NotActive,
    /// The employee turned out to be the last worker and the disposition
    /// carried no final status.
    RequiresFinalStatus(Session),
    /// Closing was requested without an evidence payload.
    EvidenceRequired,
}

/// Completes a stop for a chosen employee.
///
/// Re-derives from the supplied log snapshot, so callers re-reading the
/// log immediately before the append get check-then-act protection for
/// free. Duration is computed once here, against `now`, and persisted in
/// the STOP record as the authoritative value.
pub fn complete_stop(
    log: &[WorkEvent],
    finding_id: &str,
    employee_id: &str,
    event_id: &str,
    disposition: StopDisposition,
    now: DateTime<Utc>,
) -> StopAttempt {
    let sessions = active_sessions(log, finding_id);
    let Some(session) = sessions
        .iter()
        .find(|session| session.employee_id == employee_id)
        .cloned()
    else {
        return StopAttempt::NotActive;
    };

    let duration_secs = elapsed_secs(session.started_at, now);
    let others_remain = sessions.len() > 1;

    if others_remain {
        // Other workers keep the finding open; the disposition's status is
        // irrelevant until the last one leaves.
        return StopAttempt::Completed(build_completion(
            &session,
            event_id,
            FindingStatus::InProgress,
            duration_secs,
            None,
            None,
            now,
        ));
    }

    match disposition {
        StopDisposition::PassThrough => StopAttempt::RequiresFinalStatus(session),
        StopDisposition::Finalize { status, evidence } => {
            let status = status.as_finding_status();
            if status == FindingStatus::Closed && !has_evidence(&evidence) {
                return StopAttempt::EvidenceRequired;
            }
            tracing::debug!(
                finding_id,
                employee_id,
                status = status.as_str(),
                "last worker finalizing finding"
            );
            StopAttempt::Completed(build_completion(
                &session,
                event_id,
                status,
                duration_secs,
                evidence,
                Some(status),
                now,
            ))
        }
    }
}

fn build_completion(
    session: &Session,
    event_id: &str,
    status: FindingStatus,
    duration_secs: u64,
    evidence: Option<String>,
    finding_status: Option<FindingStatus>,
    now: DateTime<Utc>,
) -> StopCompletion {
    let evidence_present = has_evidence(&evidence);
    let event = WorkEvent::stop(
        event_id,
        session.finding_id.clone(),
        session.employee_id.clone(),
        session.task_code.clone(),
        now,
        status,
        duration_secs,
        evidence,
    );
    StopCompletion {
        event,
        outcome: StopOutcome {
            status,
            duration_secs,
            evidence_present,
        },
        finding_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    fn start(id: &str, finding: &str, employee: &str, secs: u32) -> WorkEvent {
        WorkEvent::start(id, finding, employee, "MNT", at(secs))
    }

    fn finalize(status: FinalStatus, evidence: Option<&str>) -> StopDisposition {
        StopDisposition::Finalize {
            status,
            evidence: evidence.map(|value| value.to_string()),
        }
    }

    #[test]
    fn request_stop_with_empty_finding() {
        assert_eq!(request_stop(&[], "F1"), StopPrompt::NoActiveSessions);
    }

    #[test]
    fn request_stop_with_single_worker() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        match request_stop(&log, "F1") {
            StopPrompt::SingleCandidate(session) => assert_eq!(session.employee_id, "EMP1"),
            other => panic!("expected single candidate, got {:?}", other),
        }
    }

    #[test]
    fn request_stop_with_two_workers_needs_selection() {
        let log = vec![start("e1", "F1", "EMP1", 0), start("e2", "F1", "EMP2", 5)];
        match request_stop(&log, "F1") {
            StopPrompt::SelectCandidate(sessions) => assert_eq!(sessions.len(), 2),
            other => panic!("expected selection, got {:?}", other),
        }
    }

    #[test]
    fn resolve_stop_pass_through_when_others_remain() {
        let log = vec![start("e1", "F1", "EMP1", 0), start("e2", "F1", "EMP2", 5)];
        assert!(matches!(
            resolve_stop(&log, "F1", "EMP1"),
            StopResolution::PassThrough(_)
        ));
    }

    #[test]
    fn resolve_stop_requires_status_for_last_worker() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        assert!(matches!(
            resolve_stop(&log, "F1", "EMP1"),
            StopResolution::RequiresFinalStatus(_)
        ));
    }

    #[test]
    fn resolve_stop_for_inactive_employee_is_not_active() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        assert_eq!(resolve_stop(&log, "F1", "EMP2"), StopResolution::NotActive);
    }

    #[test]
    fn pass_through_stop_leaves_finding_status_alone() {
        let log = vec![start("e1", "F1", "EMP1", 0), start("e2", "F1", "EMP2", 5)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-3",
            StopDisposition::PassThrough,
            at(90),
        );
        match attempt {
            StopAttempt::Completed(completion) => {
                assert_eq!(completion.outcome.status, FindingStatus::InProgress);
                assert_eq!(completion.outcome.duration_secs, 90);
                assert!(!completion.outcome.evidence_present);
                assert_eq!(completion.finding_status, None);
                assert_eq!(completion.event.employee_id, "EMP1");
                assert!(completion.event.validate().is_ok());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn pass_through_duration_uses_that_employees_start() {
        // EMP1 starts at 10:00:00 and stops at 10:01:30 -> 90 seconds.
        let log = vec![start("e1", "F1", "EMP1", 0), start("e2", "F1", "EMP2", 20)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-3",
            StopDisposition::PassThrough,
            Utc.with_ymd_and_hms(2026, 8, 6, 10, 1, 30).unwrap(),
        );
        match attempt {
            StopAttempt::Completed(completion) => {
                assert_eq!(completion.outcome.duration_secs, 90);
                assert_eq!(completion.event.duration_secs, Some(90));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn last_worker_without_status_must_come_back() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-2",
            StopDisposition::PassThrough,
            at(30),
        );
        assert!(matches!(attempt, StopAttempt::RequiresFinalStatus(_)));
    }

    #[test]
    fn closing_without_evidence_is_refused() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-2",
            finalize(FinalStatus::Closed, None),
            at(30),
        );
        assert_eq!(attempt, StopAttempt::EvidenceRequired);
    }

    #[test]
    fn blank_evidence_counts_as_absent() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-2",
            finalize(FinalStatus::Closed, Some("   ")),
            at(30),
        );
        assert_eq!(attempt, StopAttempt::EvidenceRequired);
    }

    #[test]
    fn closing_with_evidence_completes_and_closes() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-2",
            finalize(FinalStatus::Closed, Some("aGVsbG8=")),
            at(45),
        );
        match attempt {
            StopAttempt::Completed(completion) => {
                assert_eq!(completion.finding_status, Some(FindingStatus::Closed));
                assert_eq!(completion.outcome.status, FindingStatus::Closed);
                assert_eq!(completion.outcome.duration_secs, 45);
                assert!(completion.outcome.evidence_present);
                assert!(completion.event.validate().is_ok());
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn holding_needs_no_evidence() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-2",
            finalize(FinalStatus::OnHold, None),
            at(30),
        );
        match attempt {
            StopAttempt::Completed(completion) => {
                assert_eq!(completion.finding_status, Some(FindingStatus::OnHold));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn repeated_stop_is_a_no_op() {
        let log = vec![start("e1", "F1", "EMP1", 0)];
        let first = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-2",
            finalize(FinalStatus::InProgress, None),
            at(30),
        );
        let completion = match first {
            StopAttempt::Completed(completion) => completion,
            other => panic!("expected completion, got {:?}", other),
        };

        let mut log = log;
        log.push(completion.event);
        let second = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-3",
            finalize(FinalStatus::InProgress, None),
            at(60),
        );
        assert_eq!(second, StopAttempt::NotActive);
    }

    #[test]
    fn finalize_disposition_while_others_remain_passes_through() {
        // The chosen status only matters for the last worker out.
        let log = vec![start("e1", "F1", "EMP1", 0), start("e2", "F1", "EMP2", 5)];
        let attempt = complete_stop(
            &log,
            "F1",
            "EMP1",
            "evt-3",
            finalize(FinalStatus::Closed, Some("aGVsbG8=")),
            at(30),
        );
        match attempt {
            StopAttempt::Completed(completion) => {
                assert_eq!(completion.finding_status, None);
                assert_eq!(completion.outcome.status, FindingStatus::InProgress);
                assert!(!completion.outcome.evidence_present);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn final_status_parses_terminal_names_only() {
        assert_eq!(
            FinalStatus::from_str("IN_PROGRESS"),
            Some(FinalStatus::InProgress)
        );
        assert_eq!(FinalStatus::from_str("ON_HOLD"), Some(FinalStatus::OnHold));
        assert_eq!(FinalStatus::from_str("CLOSED"), Some(FinalStatus::Closed));
        assert_eq!(FinalStatus::from_str("OPEN"), None);
    }
}
