// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal rendering of daemon responses.

use apc_core::format_elapsed_ms;
use apc_daemon::{Response, SessionDetail, SessionSummary, StatusDto};

pub fn render(response: &Response) -> String {
    match response {
        Response::Ok => "ok".to_string(),
        Response::Subscribed => "subscribed".to_string(),
        Response::Status { status } => render_status(status),
        Response::Sessions { sessions } => render_sessions(sessions),
        Response::Session { session } => render_session(session),
        Response::PlanCreated { session, workflow } => {
            format!("session {session} created, planning started ({workflow})")
        }
        Response::PlanApproved { session, tasks } => {
            format!("plan approved for {session}: {tasks} task(s) loaded")
        }
        Response::WorkflowDispatched { workflow } => format!("dispatched {workflow}"),
        Response::WorkflowsDispatched { workflows } => {
            let ids: Vec<String> = workflows.iter().map(|w| w.to_string()).collect();
            format!("dispatched {} workflow(s): {}", workflows.len(), ids.join(", "))
        }
        Response::Pool { pool } => {
            format!(
                "pool: {} total, {} available, {} busy",
                pool.total, pool.available, pool.busy
            )
        }
        Response::SignalAccepted { delivery } => format!("signal {delivery}"),
        Response::Error { message } => format!("error: {message}"),
    }
}

fn render_status(status: &StatusDto) -> String {
    let mut out = format!(
        "apcd v{} up {}\npool: {}/{} available",
        status.version,
        format_elapsed_ms(status.uptime_secs * 1000),
        status.pool.available,
        status.pool.total,
    );
    out.push_str(&format!(
        "\nsessions: {}  workflows: {} active, {} pending",
        status.sessions, status.workflows_active, status.workflows_pending
    ));
    if status.degraded {
        out.push_str("\nDEGRADED: persistence failed, new work refused");
    }
    out
}

fn render_sessions(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "no sessions".to_string();
    }
    let mut out = String::new();
    for session in sessions {
        out.push_str(&format!(
            "{}  {:<10} v{}  {}\n",
            session.id,
            session.status.to_string(),
            session.plan_version,
            truncate(&session.requirement, 60),
        ));
    }
    out.trim_end().to_string()
}

fn render_session(detail: &SessionDetail) -> String {
    let mut out = format!(
        "{}  {}\nrequirement: {}\n",
        detail.summary.id,
        detail.summary.status,
        truncate(&detail.summary.requirement, 120),
    );
    if detail.workflows.is_empty() && detail.pending.is_empty() {
        out.push_str("no workflows");
        return out;
    }
    for workflow in &detail.workflows {
        out.push_str(&format!(
            "  {}  {:<20} {:<10} {}",
            workflow.id, workflow.kind, workflow.status.to_string(), workflow.phase
        ));
        if let Some(task) = workflow.task_id {
            out.push_str(&format!("  [{task}]"));
        }
        if let Some(error) = &workflow.error {
            out.push_str(&format!("  ! {error}"));
        }
        out.push('\n');
    }
    for pending in &detail.pending {
        out.push_str(&format!("  {pending}  (pending)\n"));
    }
    out.trim_end().to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
