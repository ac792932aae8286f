//! Notification fanout policy.
//!
//! Pure builders mapping a domain event to the notifications it produces.
//! The store inserts whatever comes back in the same transaction as the
//! event itself. One rule holds everywhere: the actor that caused an event
//! is never notified about it.

use uuid::Uuid;

use crate::domain::{short_id, NotificationKind, Role, Ticket, User};

/// A notification ready for insertion.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

/// Ticket created → every admin except the author.
pub fn ticket_created(ticket: &Ticket, admins: &[User]) -> Vec<NewNotification> {
    admins
        .iter()
        .filter(|admin| admin.id != ticket.author_id)
        .map(|admin| NewNotification {
            recipient_id: admin.id,
            ticket_id: Some(ticket.id),
            kind: NotificationKind::TicketCreated,
            title: format!("New ticket #{}", short_id(&ticket.id)),
            message: format!("New ticket: {}", preview(ticket)),
        })
        .collect()
}

/// Comment added. Non-admin commenters notify every admin except themselves;
/// admin/employee commenters notify the ticket author.
pub fn comment_added(ticket: &Ticket, commenter: &User, admins: &[User]) -> Vec<NewNotification> {
    match commenter.role {
        Role::Client => admins
            .iter()
            .filter(|admin| admin.id != commenter.id)
            .map(|admin| NewNotification {
                recipient_id: admin.id,
                ticket_id: Some(ticket.id),
                kind: NotificationKind::Comment,
                title: format!("New comment in #{}", short_id(&ticket.id)),
                message: format!("{} commented on {}", commenter.name, preview(ticket)),
            })
            .collect(),
        Role::Admin | Role::Employee => {
            if ticket.author_id == commenter.id {
                return Vec::new();
            }
            vec![NewNotification {
                recipient_id: ticket.author_id,
                ticket_id: Some(ticket.id),
                kind: NotificationKind::AdminReply,
                title: format!("Administrator replied to #{}", short_id(&ticket.id)),
                message: format!("There is a new reply on: {}", preview(ticket)),
            }]
        }
    }
}

/// Status changed to closed → the author, unless the author closed it.
pub fn ticket_closed(ticket: &Ticket, actor_id: Option<Uuid>) -> Vec<NewNotification> {
    if actor_id == Some(ticket.author_id) {
        return Vec::new();
    }
    vec![NewNotification {
        recipient_id: ticket.author_id,
        ticket_id: Some(ticket.id),
        kind: NotificationKind::TicketClosed,
        title: format!("Ticket #{} closed", short_id(&ticket.id)),
        message: format!("Your ticket has been closed: {}", preview(ticket)),
    }]
}

/// SLA escalation → the author. The actor is the background loop, so this
/// always fires.
pub fn ticket_escalated(ticket: &Ticket) -> Vec<NewNotification> {
    vec![NewNotification {
        recipient_id: ticket.author_id,
        ticket_id: Some(ticket.id),
        kind: NotificationKind::TicketUpdated,
        title: format!("Ticket #{} escalated", short_id(&ticket.id)),
        message: format!(
            "The deadline is approaching; priority is now {}.",
            ticket.priority.map(|p| p.to_string()).unwrap_or_else(|| "unchanged".into())
        ),
    }]
}

/// Assignment change → the new assignee, unless they assigned themselves.
pub fn ticket_assigned(
    ticket: &Ticket,
    assignee_user_id: Uuid,
    actor_id: Option<Uuid>,
) -> Vec<NewNotification> {
    if actor_id == Some(assignee_user_id) {
        return Vec::new();
    }
    vec![NewNotification {
        recipient_id: assignee_user_id,
        ticket_id: Some(ticket.id),
        kind: NotificationKind::Assigned,
        title: format!("Ticket #{} assigned to you", short_id(&ticket.id)),
        message: format!("You have been assigned: {}", preview(ticket)),
    }]
}

/// Subject when present, else the first 100 code points of the body.
fn preview(ticket: &Ticket) -> String {
    match &ticket.subject {
        Some(s) if !s.trim().is_empty() => s.clone(),
        _ => ticket.body.chars().take(100).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::domain::{Language, TicketSource, TicketStatus};

    fn user(role: Role) -> User {
        let id = Uuid::new_v4();
        User {
            id,
            email: format!("{id}@example.invalid"),
            name: "Test User".into(),
            role,
            password_hash: None,
            phone: None,
            created_at: Utc::now(),
        }
    }

    fn ticket(author_id: Uuid) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            source: TicketSource::Portal,
            author_id,
            subject: Some("Invoice question".into()),
            body: "When is my next bill due?".into(),
            language: Language::En,
            category_id: None,
            priority: Some(crate::domain::Priority::Medium),
            issue_type: None,
            ai_confidence: 0.9,
            queue: None,
            assigned_department_id: None,
            assigned_operator_id: None,
            status: TicketStatus::New,
            auto_resolved: false,
            needs_clarification: false,
            confidence_warning: None,
            sla_deadline: None,
            is_escalated: false,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    #[test]
    fn creation_notifies_every_admin_except_the_author() {
        let author = user(Role::Admin);
        let other_admin = user(Role::Admin);
        let t = ticket(author.id);

        let out = ticket_created(&t, &[author.clone(), other_admin.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient_id, other_admin.id);
        assert_eq!(out[0].kind, NotificationKind::TicketCreated);
        assert!(out[0].title.contains(&short_id(&t.id)));
    }

    #[test]
    fn client_comment_fans_out_to_admins() {
        let client = user(Role::Client);
        let admins = [user(Role::Admin), user(Role::Admin)];
        let t = ticket(client.id);

        let out = comment_added(&t, &client, &admins);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.kind == NotificationKind::Comment));
    }

    #[test]
    fn admin_comment_notifies_the_author_only() {
        let client = user(Role::Client);
        let admin = user(Role::Admin);
        let t = ticket(client.id);

        let out = comment_added(&t, &admin, &[admin.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient_id, client.id);
        assert_eq!(out[0].kind, NotificationKind::AdminReply);
        assert!(out[0].title.starts_with("Administrator replied"));
    }

    #[test]
    fn admin_commenting_on_own_ticket_notifies_nobody() {
        let admin = user(Role::Admin);
        let t = ticket(admin.id);
        assert!(comment_added(&t, &admin, &[admin.clone()]).is_empty());
    }

    #[test]
    fn closing_your_own_ticket_is_silent() {
        let client = user(Role::Client);
        let t = ticket(client.id);
        assert!(ticket_closed(&t, Some(client.id)).is_empty());
    }

    #[test]
    fn admin_closing_notifies_the_author() {
        let client = user(Role::Client);
        let admin = user(Role::Admin);
        let t = ticket(client.id);

        let out = ticket_closed(&t, Some(admin.id));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient_id, client.id);
        assert_eq!(out[0].kind, NotificationKind::TicketClosed);
    }

    #[test]
    fn escalation_notifies_the_author() {
        let client = user(Role::Client);
        let t = ticket(client.id);
        let out = ticket_escalated(&t);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient_id, client.id);
        assert!(out[0].title.contains("escalated"));
    }

    #[test]
    fn self_assignment_is_silent() {
        let admin = user(Role::Admin);
        let t = ticket(Uuid::new_v4());
        assert!(ticket_assigned(&t, admin.id, Some(admin.id)).is_empty());
    }

    #[test]
    fn assignment_notifies_the_new_assignee() {
        let operator = user(Role::Employee);
        let t = ticket(Uuid::new_v4());
        let out = ticket_assigned(&t, operator.id, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient_id, operator.id);
        assert!(out[0].title.ends_with("assigned to you"));
    }

    #[test]
    fn preview_prefers_subject_and_falls_back_to_body() {
        let mut t = ticket(Uuid::new_v4());
        assert_eq!(preview(&t), "Invoice question");
        t.subject = None;
        assert_eq!(preview(&t), "When is my next bill due?");
        t.subject = Some("   ".into());
        assert_eq!(preview(&t), "When is my next bill due?");
    }
}
