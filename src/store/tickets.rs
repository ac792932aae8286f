//! Ticket mutators and queries.
//!
//! `create_ticket` is the widest transaction in the system: one commit covers
//! the ticket row, its AI prediction, an optional auto-response, the history
//! chain, and the notification fanout. `update_ticket` is diff-based: an
//! unchanged patch writes nothing at all, and every real change leaves
//! exactly one history row per changed tracked field.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{
    HistoryAction, IssueType, Priority, Ticket, TicketStatus, User,
};
use crate::error::AppError;
use crate::notify::{self, NewNotification};
use crate::sla;

use super::{NewHistory, Store};

/// Prediction fields stored alongside a freshly ingested ticket.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub model_id: String,
    pub predicted_category_id: Option<Uuid>,
    pub predicted_priority: Option<Priority>,
    pub predicted_issue_type: Option<IssueType>,
    pub confidence: f64,
}

/// Partial update applied by operators (and the soft-close endpoint).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub category_id: Option<Uuid>,
    pub assigned_department_id: Option<Uuid>,
    pub assigned_operator_id: Option<Uuid>,
}

impl TicketPatch {
    pub fn close() -> Self {
        Self { status: Some(TicketStatus::Closed), ..Self::default() }
    }
}

/// List filters for `GET /tickets`.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub skip: i64,
    pub limit: i64,
}

/// Result of a successful escalation.
#[derive(Debug, Clone)]
pub struct Escalation {
    pub ticket_id: Uuid,
    pub old_priority: Priority,
    pub new_priority: Priority,
}

impl Store {
    /// Insert a ticket with all of its ingestion side-effects in one
    /// transaction. Readers see everything or nothing.
    pub async fn create_ticket(
        &self,
        ticket: &Ticket,
        prediction: &NewPrediction,
        auto_response_text: Option<&str>,
        history: &[NewHistory],
        notifications: &[NewNotification],
    ) -> Result<(), AppError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO tickets (
                id, source, author_id, subject, body, language, category_id,
                priority, issue_type, ai_confidence, queue,
                assigned_department_id, assigned_operator_id, status,
                auto_resolved, needs_clarification, confidence_warning,
                sla_deadline, is_escalated, created_at, updated_at, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ticket.id)
        .bind(ticket.source)
        .bind(ticket.author_id)
        .bind(&ticket.subject)
        .bind(&ticket.body)
        .bind(ticket.language)
        .bind(ticket.category_id)
        .bind(ticket.priority)
        .bind(ticket.issue_type)
        .bind(ticket.ai_confidence)
        .bind(ticket.queue)
        .bind(ticket.assigned_department_id)
        .bind(ticket.assigned_operator_id)
        .bind(ticket.status)
        .bind(ticket.auto_resolved)
        .bind(ticket.needs_clarification)
        .bind(&ticket.confidence_warning)
        .bind(ticket.sla_deadline)
        .bind(ticket.is_escalated)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .bind(ticket.closed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ai_predictions (
                id, ticket_id, model_id, predicted_category_id,
                predicted_priority, predicted_issue_type, confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(ticket.id)
        .bind(&prediction.model_id)
        .bind(prediction.predicted_category_id)
        .bind(prediction.predicted_priority)
        .bind(prediction.predicted_issue_type)
        .bind(prediction.confidence)
        .bind(ticket.created_at)
        .execute(&mut *tx)
        .await?;

        if let Some(text) = auto_response_text {
            sqlx::query(
                "INSERT INTO auto_responses (id, ticket_id, response_text, is_successful, created_at)
                 VALUES (?, ?, ?, 1, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(ticket.id)
            .bind(text)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for row in history {
            insert_history_row(&mut tx, ticket.id, row, ticket.created_at).await?;
        }
        for n in notifications {
            insert_notification_row(&mut tx, n, ticket.created_at).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn ticket(&self, id: Uuid) -> Result<Ticket, AppError> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket {id} not found")))
    }

    pub async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, AppError> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM tickets WHERE 1=1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(category_id) = filter.category_id {
            qb.push(" AND category_id = ").push_bind(category_id);
        } else if let Some(name) = filter.category_name.as_deref().filter(|n| !n.is_empty()) {
            qb.push(" AND category_id IN (SELECT id FROM categories WHERE name LIKE ")
                .push_bind(format!("%{name}%"))
                .push(")");
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(if filter.limit > 0 { filter.limit } else { 50 })
            .push(" OFFSET ")
            .push_bind(filter.skip.max(0));

        Ok(qb.build_query_as::<Ticket>().fetch_all(&self.pool).await?)
    }

    /// Case-blind substring search over subject and body.
    pub async fn search_tickets(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>, AppError> {
        let term = format!("%{}%", query.trim());
        Ok(sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets
             WHERE subject LIKE ? OR body LIKE ?
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(&term)
        .bind(&term)
        .bind(if limit > 0 { limit } else { 50 })
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?)
    }

    /// Open tickets whose SLA deadline has passed, most overdue first.
    pub async fn overdue_tickets(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>, AppError> {
        Ok(sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets
             WHERE status NOT IN ('closed', 'auto_resolved')
               AND sla_deadline IS NOT NULL AND sla_deadline < ?
             ORDER BY sla_deadline ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Apply a patch. A no-op patch performs no writes; otherwise the ticket
    /// row, one history entry per changed tracked field, and any fanout
    /// notifications commit together.
    ///
    /// Authorization: a non-admin actor may close only their own ticket.
    pub async fn update_ticket(
        &self,
        id: Uuid,
        patch: &TicketPatch,
        actor: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<Ticket, AppError> {
        let mut tx = self.pool().begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket {id} not found")))?;

        if patch.status == Some(TicketStatus::Closed) {
            if let Some(actor) = actor {
                if !actor.is_admin() && actor.id != ticket.author_id {
                    return Err(AppError::Forbidden(
                        "only admins may close somebody else's ticket".into(),
                    ));
                }
            }
        }

        let actor_id = actor.map(|a| a.id);
        let mut updated = ticket.clone();
        let mut history: Vec<NewHistory> = Vec::new();
        let mut notifications: Vec<NewNotification> = Vec::new();

        if let Some(status) = patch.status {
            if status != ticket.status {
                history.push(NewHistory {
                    actor_id,
                    action: HistoryAction::StatusChanged,
                    old_value: Some(ticket.status.to_string()),
                    new_value: Some(status.to_string()),
                    description: Some(format!("Status changed: {} -> {}", ticket.status, status)),
                });
                updated.status = status;
                if status == TicketStatus::Closed {
                    updated.closed_at = Some(now);
                    notifications.extend(notify::ticket_closed(&ticket, actor_id));
                }
            }
        }

        if let Some(priority) = patch.priority {
            if Some(priority) != ticket.priority {
                history.push(NewHistory {
                    actor_id,
                    action: HistoryAction::PriorityChanged,
                    old_value: ticket.priority.map(|p| p.to_string()),
                    new_value: Some(priority.to_string()),
                    description: Some(format!(
                        "Priority changed: {} -> {}",
                        ticket.priority.map(|p| p.to_string()).unwrap_or_else(|| "unset".into()),
                        priority
                    )),
                });
                updated.priority = Some(priority);
                // Deadlines always count from the original creation instant.
                updated.sla_deadline = Some(sla::deadline_for(priority, ticket.created_at));
            }
        }

        if let Some(category_id) = patch.category_id {
            if Some(category_id) != ticket.category_id {
                updated.category_id = Some(category_id);
            }
        }

        if let Some(department_id) = patch.assigned_department_id {
            if Some(department_id) != ticket.assigned_department_id {
                updated.assigned_department_id = Some(department_id);
            }
        }

        if let Some(operator_id) = patch.assigned_operator_id {
            if Some(operator_id) != ticket.assigned_operator_id {
                history.push(NewHistory {
                    actor_id,
                    action: HistoryAction::Assigned,
                    old_value: ticket.assigned_operator_id.map(|o| o.to_string()),
                    new_value: Some(operator_id.to_string()),
                    description: Some("Ticket assigned to operator".into()),
                });
                updated.assigned_operator_id = Some(operator_id);

                let assignee: Option<Uuid> =
                    sqlx::query_scalar("SELECT user_id FROM operators WHERE id = ?")
                        .bind(operator_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                if let Some(user_id) = assignee {
                    notifications.extend(notify::ticket_assigned(&ticket, user_id, actor_id));
                }
            }
        }

        let changed = updated.status != ticket.status
            || updated.priority != ticket.priority
            || updated.category_id != ticket.category_id
            || updated.assigned_department_id != ticket.assigned_department_id
            || updated.assigned_operator_id != ticket.assigned_operator_id;
        if !changed {
            // Nothing to do; updated_at stays put.
            return Ok(ticket);
        }
        updated.updated_at = now;

        sqlx::query(
            "UPDATE tickets SET
                status = ?, priority = ?, category_id = ?,
                assigned_department_id = ?, assigned_operator_id = ?,
                sla_deadline = ?, closed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(updated.status)
        .bind(updated.priority)
        .bind(updated.category_id)
        .bind(updated.assigned_department_id)
        .bind(updated.assigned_operator_id)
        .bind(updated.sla_deadline)
        .bind(updated.closed_at)
        .bind(updated.updated_at)
        .bind(updated.id)
        .execute(&mut *tx)
        .await?;

        for row in &history {
            insert_history_row(&mut tx, id, row, now).await?;
        }
        for n in &notifications {
            insert_notification_row(&mut tx, n, now).await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Ids of open, unescalated tickets whose deadline falls within the
    /// escalation window. A snapshot: each id is re-verified under its own
    /// transaction by [`Store::escalate_ticket`].
    pub async fn escalation_candidates(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Uuid>, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM tickets
             WHERE status NOT IN ('closed', 'auto_resolved')
               AND is_escalated = 0
               AND priority IS NOT NULL
               AND sla_deadline IS NOT NULL
               AND sla_deadline > ? AND sla_deadline <= ?
             ORDER BY sla_deadline ASC",
        )
        .bind(now)
        .bind(now + window)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Escalate one ticket: bump priority a step, recompute the deadline from
    /// the original `created_at`, and latch `is_escalated`.
    ///
    /// The latch is the concurrency guard: the UPDATE re-checks
    /// `is_escalated = 0`, so of two racing loop instances exactly one
    /// returns `Some` and the other a clean `None`.
    pub async fn escalate_ticket(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Escalation>, AppError> {
        let mut tx = self.pool().begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE id = ? AND is_escalated = 0",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(ticket) = ticket else {
            return Ok(None); // gone, or another instance won the race
        };
        let Some(old_priority) = ticket.priority else {
            return Ok(None);
        };

        // Already-critical tickets keep their priority; the latch, the
        // history row, and the notification still happen.
        let new_priority = old_priority.escalated();
        let new_deadline = sla::deadline_for(new_priority, ticket.created_at);

        let result = sqlx::query(
            "UPDATE tickets
             SET is_escalated = 1, priority = ?, sla_deadline = ?, updated_at = ?
             WHERE id = ? AND is_escalated = 0",
        )
        .bind(new_priority)
        .bind(new_deadline)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let description = if old_priority == Priority::Critical {
            "Deadline approaching; priority already critical".to_string()
        } else {
            format!("Automatically escalated; new priority: {new_priority}")
        };
        insert_history_row(
            &mut tx,
            id,
            &NewHistory {
                actor_id: None,
                action: HistoryAction::Escalated,
                old_value: Some(old_priority.to_string()),
                new_value: Some(new_priority.to_string()),
                description: Some(description),
            },
            now,
        )
        .await?;

        let mut escalated_view = ticket.clone();
        escalated_view.priority = Some(new_priority);
        for n in notify::ticket_escalated(&escalated_view) {
            insert_notification_row(&mut tx, &n, now).await?;
        }

        tx.commit().await?;
        Ok(Some(Escalation { ticket_id: id, old_priority, new_priority }))
    }
}

pub(crate) async fn insert_history_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ticket_id: Uuid,
    row: &NewHistory,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO ticket_history (
            id, ticket_id, actor_id, action, old_value, new_value, description, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(ticket_id)
    .bind(row.actor_id)
    .bind(row.action)
    .bind(&row.old_value)
    .bind(&row.new_value)
    .bind(&row.description)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn insert_notification_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    n: &NewNotification,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO notifications (
            id, recipient_id, ticket_id, kind, title, message, is_read, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(n.recipient_id)
    .bind(n.ticket_id)
    .bind(n.kind)
    .bind(&n.title)
    .bind(&n.message)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::{Language, Role, TicketSource};
    use crate::store::users::NewUser;

    pub fn blank_ticket(author_id: Uuid, now: DateTime<Utc>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            source: TicketSource::Portal,
            author_id,
            subject: Some("Invoice question".into()),
            body: "When is my next bill due?".into(),
            language: Language::En,
            category_id: None,
            priority: Some(Priority::Medium),
            issue_type: Some(IssueType::Complex),
            ai_confidence: 0.9,
            queue: Some(crate::domain::Queue::GeneralSupport),
            assigned_department_id: None,
            assigned_operator_id: None,
            status: TicketStatus::New,
            auto_resolved: false,
            needs_clarification: false,
            confidence_warning: None,
            sla_deadline: Some(sla::deadline_for(Priority::Medium, now)),
            is_escalated: false,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn prediction() -> NewPrediction {
        NewPrediction {
            model_id: "test-model".into(),
            predicted_category_id: None,
            predicted_priority: Some(Priority::Medium),
            predicted_issue_type: Some(IssueType::Complex),
            confidence: 0.9,
        }
    }

    pub async fn seeded_author(store: &Store, now: DateTime<Utc>) -> User {
        store.upsert_author(Uuid::new_v4(), now).await.unwrap()
    }

    pub async fn seeded_admin(store: &Store, email: &str, now: DateTime<Utc>) -> User {
        store
            .create_user(
                NewUser {
                    email: email.into(),
                    name: "Admin".into(),
                    role: Role::Admin,
                    password_hash: None,
                    phone: None,
                },
                now,
            )
            .await
            .unwrap()
    }

    /// Insert a ticket with an empty side-effect set.
    pub async fn insert_plain(store: &Store, ticket: &Ticket) {
        store
            .create_ticket(ticket, &prediction(), None, &[], &[])
            .await
            .unwrap();
    }
}
