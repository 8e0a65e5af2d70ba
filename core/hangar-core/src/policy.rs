//! Conflict policy for START requests.
//!
//! A worker cannot hold two open sessions on the same finding. Joining a
//! finding that others are already working is allowed, but only after the
//! caller has shown the human who else is active and received an explicit
//! confirmation.

use chrono::{DateTime, Utc};
use hangar_protocol::WorkEvent;

use crate::derive::{active_sessions, Session};

/// Outcome of a START request. Only `Proceed` carries an event; the other
/// variants leave the log untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum StartDecision {
    /// Nobody is active on the finding; append the event immediately.
    Proceed { event: WorkEvent },
    /// The same employee already has an open session here. Policy
    /// violation: surfaced to the caller, nothing appended.
    AlreadyActive { session: Session },
    /// Other employees are active. Not an error - the caller must confirm
    /// with the human before retrying via [`confirm_start`].
    Conflict { active_others: Vec<Session> },
}

/// Applies the conflict policy to a proposed START.
pub fn request_start(
    log: &[WorkEvent],
    finding_id: &str,
    employee_id: &str,
    task_code: &str,
    event_id: &str,
    now: DateTime<Utc>,
) -> StartDecision {
    let sessions = active_sessions(log, finding_id);

    if let Some(session) = sessions
        .iter()
        .find(|session| session.employee_id == employee_id)
    {
        return StartDecision::AlreadyActive {
            session: session.clone(),
        };
    }

    if !sessions.is_empty() {
        return StartDecision::Conflict {
            active_others: sessions,
        };
    }

    StartDecision::Proceed {
        event: WorkEvent::start(event_id, finding_id, employee_id, task_code, now),
    }
}

/// The post-confirmation path: the human has seen who else is active and
/// chosen to join. Re-derives from the supplied snapshot so a stale
/// confirmation cannot smuggle in a duplicate session for the same
/// employee; a conflict with *others* is what was just confirmed, so it
/// proceeds.
pub fn confirm_start(
    log: &[WorkEvent],
    finding_id: &str,
    employee_id: &str,
    task_code: &str,
    event_id: &str,
    now: DateTime<Utc>,
) -> StartDecision {
    match request_start(log, finding_id, employee_id, task_code, event_id, now) {
        StartDecision::Conflict { .. } => StartDecision::Proceed {
            event: WorkEvent::start(event_id, finding_id, employee_id, task_code, now),
        },
        decision => decision,
    }
}
