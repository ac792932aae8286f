//! SLA deadlines, status buckets, and the escalation loop.
//!
//! Deadlines always count from the ticket's original `created_at`: a
//! priority change moves the deadline by swapping the per-priority duration,
//! never by restarting the clock.
//!
//! The loop is deliberately two-phase: a cheap snapshot of candidate ids,
//! then one short transaction per ticket that re-verifies the escalation
//! latch before acting. Two loop instances can run side by side; the
//! conditional UPDATE inside [`Store::escalate_ticket`] guarantees only one
//! of them wins each ticket.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{Priority, SlaState, TicketStatus};
use crate::store::Store;

/// Remaining time below which a live ticket is flagged `warning`.
fn warning_window() -> Duration {
    Duration::hours(1)
}

/// Per-priority time to resolution.
pub fn sla_duration(priority: Priority) -> Duration {
    match priority {
        Priority::Critical => Duration::hours(1),
        Priority::High => Duration::hours(4),
        Priority::Medium => Duration::hours(24),
        Priority::Low => Duration::hours(72),
    }
}

/// Deadline for a ticket created at `created_at` with the given priority.
pub fn deadline_for(priority: Priority, created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + sla_duration(priority)
}

/// SLA bucket for a ticket at `now`.
///
/// Terminal tickets are `met`; tickets without a deadline are `ok`.
pub fn sla_state(
    status: TicketStatus,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SlaState {
    if status.is_terminal() {
        return SlaState::Met;
    }
    let Some(deadline) = deadline else {
        return SlaState::Ok;
    };
    let remaining = deadline - now;
    if remaining < Duration::zero() {
        SlaState::Overdue
    } else if remaining > Duration::zero() && remaining <= warning_window() {
        SlaState::Warning
    } else {
        SlaState::Ok
    }
}

/// Whether the escalation loop should touch this ticket: unlatched, with a
/// deadline strictly in the future but within the window.
pub fn should_escalate(
    is_escalated: bool,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    if is_escalated {
        return false;
    }
    let Some(deadline) = deadline else {
        return false;
    };
    let remaining = deadline - now;
    remaining > Duration::zero() && remaining <= window
}

/// One sweep: snapshot candidates, escalate each under its own transaction.
/// Returns the number of tickets actually escalated.
pub async fn escalation_pass(
    store: &Store,
    now: DateTime<Utc>,
    window: Duration,
) -> anyhow::Result<usize> {
    let candidates = store.escalation_candidates(now, window).await?;
    let mut escalated = 0usize;
    for id in candidates {
        match store.escalate_ticket(id, now).await {
            Ok(Some(e)) => {
                info!(
                    ticket = %e.ticket_id,
                    from = %e.old_priority,
                    to = %e.new_priority,
                    "ticket escalated"
                );
                escalated += 1;
            }
            Ok(None) => debug!(ticket = %id, "escalation skipped — already latched"),
            Err(e) => warn!(ticket = %id, error = %e, "escalation failed — will retry next sweep"),
        }
    }
    Ok(escalated)
}

/// Background task: sweep on a fixed interval until shutdown is signalled.
/// A sweep in progress finishes its current ticket before the task exits.
pub async fn run_escalation_loop(
    store: Store,
    interval_secs: u64,
    window_hours: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let window = Duration::hours(window_hours as i64);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    // the first tick fires immediately; that is fine, the pass is idempotent

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = escalation_pass(&store, Utc::now(), window).await {
                    warn!(error = %e, "SLA sweep failed");
                }
            }
            _ = shutdown.changed() => {
                info!("SLA loop stopping");
                return;
            }
        }
    }
}
