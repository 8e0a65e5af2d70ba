//! Command bodies: each one reads the log fresh, lets the engine decide,
//! and only then appends. Engine outcomes that need a human decision are
//! printed as guidance, not errors; store failures are the only hard
//! errors.

use base64::Engine as _;
use chrono::Utc;
use fs_err as fs;
use hangar_core::{
    active_sessions_by_finding, complete_stop, confirm_start, elapsed_secs,
    employee_active_anywhere, format_hms, request_start, request_stop, resolve_stop, FinalStatus,
    Session, StartDecision, StopAttempt, StopDisposition, StopPrompt, StopResolution,
};
use hangar_protocol::{WorkAction, WorkOrderSnapshot};
use hangar_store::Db;
use std::path::Path;

pub fn run_start(
    db_path: &Path,
    finding: &str,
    employee: &str,
    task: &str,
    join: bool,
) -> Result<(), String> {
    let finding = finding.trim();
    let employee = employee.trim();
    let task = task.trim();
    if finding.is_empty() || employee.is_empty() || task.is_empty() {
        return Err("Finding, employee ID and task code are all required".to_string());
    }

    let db = open_db(db_path)?;
    require_finding(&db, finding)?;

    let now = Utc::now();
    let event_id = new_event_id(employee);
    let log = db.list_events().map_err(|e| e.to_string())?;

    // Cross-finding heads-up only; working two findings at once is allowed.
    if let Some(session) = employee_active_anywhere(&log, employee) {
        if session.finding_id != finding {
            println!(
                "Note: {} is also active on finding {} (started {})",
                employee,
                session.finding_id,
                session.started_at.format("%H:%M:%S")
            );
        }
    }

    match request_start(&log, finding, employee, task, &event_id, now) {
        StartDecision::Proceed { event } => {
            db.append_event(&event).map_err(|e| e.to_string())?;
            println!("Started {} on finding {} ({})", employee, finding, task);
        }
        StartDecision::AlreadyActive { session } => {
            println!(
                "{} is already active on finding {} (started {})",
                employee,
                finding,
                session.started_at.format("%H:%M:%S")
            );
        }
        StartDecision::Conflict { active_others } => {
            println!("Finding {} is already being worked:", finding);
            print_sessions(&active_others, now);
            if !join {
                println!("Re-run with --join to work it together.");
                return Ok(());
            }

            // Fresh read before the confirmed append.
            let log = db.list_events().map_err(|e| e.to_string())?;
            match confirm_start(&log, finding, employee, task, &event_id, now) {
                StartDecision::Proceed { event } => {
                    db.append_event(&event).map_err(|e| e.to_string())?;
                    println!("Joined finding {} as {}", finding, employee);
                }
                StartDecision::AlreadyActive { .. } => {
                    println!("{} is already active on finding {}", employee, finding);
                }
                StartDecision::Conflict { .. } => unreachable!("confirm_start consumes conflicts"),
            }
        }
    }

    Ok(())
}

pub fn run_stop(
    db_path: &Path,
    finding: &str,
    employee: Option<&str>,
    status: Option<&str>,
    evidence: Option<&Path>,
) -> Result<(), String> {
    let finding = finding.trim();
    if finding.is_empty() {
        return Err("Finding is required".to_string());
    }

    let db = open_db(db_path)?;
    let now = Utc::now();
    let log = db.list_events().map_err(|e| e.to_string())?;

    let target = match request_stop(&log, finding) {
        StopPrompt::NoActiveSessions => {
            println!("No active sessions found for finding {}.", finding);
            return Ok(());
        }
        StopPrompt::SingleCandidate(session) => employee
            .map(|value| value.trim().to_string())
            .unwrap_or(session.employee_id),
        StopPrompt::SelectCandidate(sessions) => match employee {
            Some(value) => value.trim().to_string(),
            None => {
                println!("Several mechanics are active on finding {}:", finding);
                print_sessions(&sessions, now);
                println!("Re-run with --employee to pick who is stopping.");
                return Ok(());
            }
        },
    };

    let disposition = match resolve_stop(&log, finding, &target) {
        StopResolution::NotActive => {
            println!("{} is not currently active on finding {}.", target, finding);
            return Ok(());
        }
        StopResolution::PassThrough(_) => StopDisposition::PassThrough,
        StopResolution::RequiresFinalStatus(_) => {
            let Some(raw) = status else {
                println!(
                    "{} is the last active worker on finding {}.",
                    target, finding
                );
                println!("Supply --status IN_PROGRESS, ON_HOLD or CLOSED (CLOSED needs --evidence).");
                return Ok(());
            };
            let status = FinalStatus::from_str(raw.trim().to_uppercase().as_str())
                .ok_or_else(|| format!("Invalid final status: {}", raw))?;
            StopDisposition::Finalize {
                status,
                evidence: evidence.map(read_evidence).transpose()?,
            }
        }
    };

    let event_id = new_event_id(&target);
    match complete_stop(&log, finding, &target, &event_id, disposition, now) {
        StopAttempt::Completed(completion) => {
            db.append_event(&completion.event).map_err(|e| e.to_string())?;
            if let Some(status) = completion.finding_status {
                db.set_finding_status(finding, status)
                    .map_err(|e| e.to_string())?;
            }
            println!(
                "Stopped {} on finding {} after {} (status {})",
                target,
                finding,
                format_hms(completion.outcome.duration_secs),
                completion.outcome.status.as_str()
            );
        }
        StopAttempt::NotActive => {
            println!("{} is not currently active on finding {}.", target, finding);
        }
        StopAttempt::RequiresFinalStatus(_) => {
            println!(
                "{} is the last active worker on finding {}; supply --status.",
                target, finding
            );
        }
        StopAttempt::EvidenceRequired => {
            println!("Closure evidence is mandatory. Re-run with --evidence <FILE>.");
        }
    }

    Ok(())
}

pub fn run_status(db_path: &Path, finding: Option<&str>) -> Result<(), String> {
    let db = open_db(db_path)?;
    let snapshot = db.snapshot().map_err(|e| e.to_string())?;
    let log = db.list_events().map_err(|e| e.to_string())?;
    let now = Utc::now();
    let active = active_sessions_by_finding(&log);

    if !snapshot.info.wo_no.is_empty() {
        println!(
            "WO {}  {}  {}",
            snapshot.info.wo_no, snapshot.info.reg, snapshot.info.customer
        );
        println!(
            "{} (P/N {}, S/N {})",
            snapshot.info.description, snapshot.info.pn, snapshot.info.sn
        );
        println!();
    }

    let mut shown = 0usize;
    for entry in &snapshot.findings {
        if finding.is_some_and(|wanted| wanted != entry.id) {
            continue;
        }
        shown += 1;

        println!("#{} [{}] {}", entry.id, entry.status.as_str(), entry.description);
        if !entry.action_given.is_empty() {
            println!("    action: {}", entry.action_given);
        }
        for material in snapshot.materials_for(&entry.id) {
            println!(
                "    material: {} {} {} {}  {}",
                material.pn,
                material.description,
                material.qty,
                material.uom,
                if material.available {
                    "Available"
                } else {
                    "Unavailable"
                }
            );
        }
        if let Some(sessions) = active.get(&entry.id) {
            for session in sessions {
                println!(
                    "    active: {} ({})  {}",
                    session.employee_id,
                    session.task_code,
                    format_hms(elapsed_secs(session.started_at, now))
                );
            }
        }
    }

    if shown == 0 {
        match finding {
            Some(wanted) => return Err(format!("Unknown finding: {}", wanted)),
            None => println!("No findings recorded."),
        }
    }

    Ok(())
}

pub fn run_log(db_path: &Path, finding: Option<&str>) -> Result<(), String> {
    let db = open_db(db_path)?;
    let events = match finding {
        Some(finding_id) => db.list_events_for_finding(finding_id),
        None => db.list_events(),
    }
    .map_err(|e| e.to_string())?;

    if events.is_empty() {
        println!("No records.");
        return Ok(());
    }

    for event in events {
        let mut line = format!(
            "{}  #{}  {}  {}  {}",
            event.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            event.finding_id,
            event.employee_id,
            event.task_code,
            event.action.as_str()
        );
        if event.action == WorkAction::Stop {
            if let (Some(status), Some(duration)) = (event.status, event.duration_secs) {
                line.push_str(&format!(
                    "  {} {}",
                    status.as_str(),
                    format_hms(duration)
                ));
            }
        }
        println!("{}", line);
    }

    Ok(())
}

pub fn run_seed(db_path: &Path, file: &Path) -> Result<(), String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read snapshot file: {}", e))?;
    let snapshot: WorkOrderSnapshot =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse snapshot: {}", e))?;

    let db = open_db(db_path)?;
    db.upsert_work_order(&snapshot.info)
        .map_err(|e| e.to_string())?;
    for finding in &snapshot.findings {
        db.upsert_finding(finding).map_err(|e| e.to_string())?;
    }
    for material in &snapshot.materials {
        db.upsert_material(material).map_err(|e| e.to_string())?;
    }

    println!(
        "Seeded work order {} with {} findings and {} materials",
        snapshot.info.wo_no,
        snapshot.findings.len(),
        snapshot.materials.len()
    );
    Ok(())
}

fn open_db(db_path: &Path) -> Result<Db, String> {
    Db::new(db_path.to_path_buf()).map_err(|e| format!("Failed to open work log: {}", e))
}

fn require_finding(db: &Db, finding_id: &str) -> Result<(), String> {
    match db.get_finding(finding_id).map_err(|e| e.to_string())? {
        Some(_) => Ok(()),
        None => Err(format!(
            "Unknown finding: {} (seed the work order first)",
            finding_id
        )),
    }
}

fn print_sessions(sessions: &[Session], now: chrono::DateTime<Utc>) {
    for session in sessions {
        println!(
            "  {} ({})  started {}  {}",
            session.employee_id,
            session.task_code,
            session.started_at.format("%H:%M:%S"),
            format_hms(elapsed_secs(session.started_at, now))
        );
    }
}

fn read_evidence(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| format!("Failed to read evidence file: {}", e))?;
    if bytes.is_empty() {
        return Err("Evidence file is empty".to_string());
    }
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn new_event_id(employee: &str) -> String {
    format!(
        "evt-{}-{}-{:08x}",
        Utc::now().timestamp_millis(),
        employee,
        rand::random::<u32>()
    )
}
