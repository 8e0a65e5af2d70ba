//! # hangar-core
//!
//! Session derivation and finalization engine for work-order man-hour
//! tracking. Turns the append-only START/STOP log into the current set of
//! active sessions, gates new STARTs through the conflict policy, and
//! decides whether a STOP is a pass-through or a last-worker finalization.
//!
//! ## Design Principles
//!
//! - **Pure**: no I/O, no clock reads. Callers pass a log snapshot in and
//!   get derived state or append-ready events out; "now" is always injected.
//! - **Synchronous**: no async runtime dependency.
//! - **Re-derivable**: sessions are a projection of the log, recomputed from
//!   scratch on every call. No hidden caches.
//! - **Variant results, not exceptions**: every policy outcome and required
//!   confirmation is a tagged enum the caller matches exhaustively.

pub mod derive;
pub mod duration;
pub mod finalize;
pub mod policy;

pub use derive::{
    active_sessions, active_sessions_by_finding, employee_active_anywhere, Session,
};
pub use duration::{elapsed_secs, format_hms};
pub use finalize::{
    complete_stop, request_stop, resolve_stop, FinalStatus, StopAttempt, StopCompletion,
    StopDisposition, StopOutcome, StopPrompt, StopResolution,
};
pub use policy::{confirm_start, request_start, StartDecision};
