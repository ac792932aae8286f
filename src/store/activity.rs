//! Comments, feedback, notifications, and the audit trail.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AiPrediction, AutoResponse, Feedback, HistoryAction, Notification, Ticket, TicketHistory,
    TicketMessage, User,
};
use crate::error::AppError;
use crate::notify;

use super::tickets::{insert_history_row, insert_notification_row};
use super::{NewHistory, Store};

impl Store {
    /// Append a comment: message row, `comment_added` history, and the
    /// role-dependent notification fanout, all in one transaction.
    pub async fn add_comment(
        &self,
        ticket_id: Uuid,
        author: &User,
        text: &str,
        attachments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TicketMessage, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("comment text must not be empty".into()));
        }

        let mut tx = self.pool().begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_id} not found")))?;

        let message = TicketMessage {
            id: Uuid::new_v4(),
            ticket_id,
            sender_id: author.id,
            text: text.to_string(),
            attachments,
            created_at: now,
        };
        sqlx::query(
            "INSERT INTO ticket_messages (id, ticket_id, sender_id, text, attachments, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id)
        .bind(message.ticket_id)
        .bind(message.sender_id)
        .bind(&message.text)
        .bind(&message.attachments)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        insert_history_row(
            &mut tx,
            ticket_id,
            &NewHistory {
                actor_id: Some(author.id),
                action: HistoryAction::CommentAdded,
                old_value: None,
                new_value: None,
                description: Some("Comment added".into()),
            },
            now,
        )
        .await?;

        let admins = sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = 'admin'")
            .fetch_all(&mut *tx)
            .await?;
        for n in notify::comment_added(&ticket, author, &admins) {
            insert_notification_row(&mut tx, &n, now).await?;
        }

        tx.commit().await?;
        Ok(message)
    }

    /// Comments for a ticket, oldest first.
    pub async fn comments(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>, AppError> {
        // 404 for a ticket that never existed, empty list otherwise
        self.ticket(ticket_id).await?;
        Ok(sqlx::query_as::<_, TicketMessage>(
            "SELECT * FROM ticket_messages WHERE ticket_id = ? ORDER BY created_at ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Record CSAT feedback. One row per ticket, ever: the unique index
    /// turns a second submission into `Conflict`.
    pub async fn submit_feedback(
        &self,
        ticket_id: Uuid,
        user_id: Option<Uuid>,
        rating: i64,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Feedback, AppError> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::InvalidInput(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        self.ticket(ticket_id).await?;

        let feedback = Feedback {
            id: Uuid::new_v4(),
            ticket_id,
            user_id,
            rating,
            comment,
            created_at: now,
        };
        sqlx::query(
            "INSERT INTO feedback (id, ticket_id, user_id, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(feedback.id)
        .bind(feedback.ticket_id)
        .bind(feedback.user_id)
        .bind(feedback.rating)
        .bind(&feedback.comment)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("feedback already submitted for this ticket".into())
            }
            other => other,
        })?;
        Ok(feedback)
    }

    pub async fn feedback(&self, ticket_id: Uuid) -> Result<Option<Feedback>, AppError> {
        self.ticket(ticket_id).await?;
        Ok(sqlx::query_as::<_, Feedback>("SELECT * FROM feedback WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn notifications_for(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT * FROM notifications WHERE recipient_id = ",
        );
        qb.push_bind(recipient_id);
        if unread_only {
            qb.push(" AND is_read = 0");
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(if limit > 0 { limit } else { 50 });
        Ok(qb.build_query_as::<Notification>().fetch_all(&self.pool).await?)
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Mark one notification read. Scoped to the recipient so nobody can
    /// acknowledge somebody else's inbox.
    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Notification, AppError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND recipient_id = ?")
                .bind(notification_id)
                .bind(recipient_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "notification {notification_id} not found"
            )));
        }
        Ok(
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
                .bind(notification_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Mark everything read; returns how many rows flipped.
    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0")
                .bind(recipient_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Full audit trail for a ticket, oldest first. Rows within one
    /// transaction share a timestamp; the rowid keeps insertion order.
    pub async fn ticket_history(&self, ticket_id: Uuid) -> Result<Vec<TicketHistory>, AppError> {
        Ok(sqlx::query_as::<_, TicketHistory>(
            "SELECT * FROM ticket_history WHERE ticket_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn auto_responses(&self, ticket_id: Uuid) -> Result<Vec<AutoResponse>, AppError> {
        Ok(sqlx::query_as::<_, AutoResponse>(
            "SELECT * FROM auto_responses WHERE ticket_id = ? ORDER BY created_at ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn predictions(&self, ticket_id: Uuid) -> Result<Vec<AiPrediction>, AppError> {
        Ok(sqlx::query_as::<_, AiPrediction>(
            "SELECT * FROM ai_predictions WHERE ticket_id = ? ORDER BY created_at ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
