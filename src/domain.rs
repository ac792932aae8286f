//! Core domain types shared across the pipeline.
//!
//! Every enum that ends up in a database column derives [`sqlx::Type`] and is
//! stored as its snake_case string form: SQLite has no native enums, and the
//! string form keeps the rows greppable. Wire serialization (serde) uses the
//! same casing so a value reads identically in the database, in JSON, and in
//! the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User role. Admins see every ticket and receive creation notifications;
/// clients only ever touch their own tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Employee,
    Admin,
}

/// Where a ticket entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketSource {
    Email,
    Chat,
    Portal,
    Phone,
}

/// Ticket / response-bank language.
///
/// The response bank itself is bilingual (RU/KK); English tickets are matched
/// against the Russian half of the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    Kk,
    En,
}

/// Ticket priority, ordered: `Low < Medium < High < Critical`.
///
/// The ordering is load-bearing: escalation promotes one step up, and the
/// routing policy checks `>= High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// One-step promotion used by SLA escalation. Critical saturates.
    pub fn escalated(self) -> Priority {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

/// The "how routable" axis of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// A canned answer exists: candidate for auto-resolution.
    Typical,
    /// Trivial for a human, not worth automating.
    Simple,
    /// Needs an expert.
    Complex,
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IssueType::Typical => "typical",
            IssueType::Simple => "simple",
            IssueType::Complex => "complex",
        })
    }
}

/// Ticket lifecycle status. Tickets are never deleted; `Closed` is the
/// terminal soft-delete state, `AutoResolved` the terminal happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InWork,
    Waiting,
    AutoResolved,
    Closed,
}

impl TicketStatus {
    /// Terminal states carry a `closed_at` timestamp.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::AutoResolved | TicketStatus::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TicketStatus::New => "new",
            TicketStatus::InWork => "in_work",
            TicketStatus::Waiting => "waiting",
            TicketStatus::AutoResolved => "auto_resolved",
            TicketStatus::Closed => "closed",
        })
    }
}

/// Destination queue decided by the routing policy. Maps 1:1 to a seeded
/// department row; the names are stable identifiers used in metrics, so they
/// keep their CamelCase form everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Queue {
    Automated,
    HighPriority,
    Billing,
    TechSupport,
    HR,
    CustomerService,
    GeneralSupport,
    ManualReview,
}

impl Queue {
    pub const ALL: [Queue; 8] = [
        Queue::Automated,
        Queue::HighPriority,
        Queue::Billing,
        Queue::TechSupport,
        Queue::HR,
        Queue::CustomerService,
        Queue::GeneralSupport,
        Queue::ManualReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Queue::Automated => "Automated",
            Queue::HighPriority => "HighPriority",
            Queue::Billing => "Billing",
            Queue::TechSupport => "TechSupport",
            Queue::HR => "HR",
            Queue::CustomerService => "CustomerService",
            Queue::GeneralSupport => "GeneralSupport",
            Queue::ManualReview => "ManualReview",
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit-log action kinds. Append-only; every status/priority change and
/// assignment produces exactly one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    StatusChanged,
    PriorityChanged,
    Assigned,
    CommentAdded,
    Closed,
    Reopened,
    Escalated,
}

/// Notification categories shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Comment,
    AdminReply,
    TicketCreated,
    TicketUpdated,
    TicketClosed,
    Assigned,
}

/// SLA health bucket for a ticket at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    Ok,
    Warning,
    Overdue,
    Met,
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Opaque hash produced by the external auth service.
    pub password_hash: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub source: TicketSource,
    pub author_id: Uuid,
    pub subject: Option<String>,
    pub body: String,
    pub language: Language,
    pub category_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    /// Problem-type confidence recorded at ingestion.
    pub ai_confidence: f64,
    pub queue: Option<Queue>,
    pub assigned_department_id: Option<Uuid>,
    pub assigned_operator_id: Option<Uuid>,
    pub status: TicketStatus,
    pub auto_resolved: bool,
    pub needs_clarification: bool,
    pub confidence_warning: Option<String>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub is_escalated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sla_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Operator {
    pub id: Uuid,
    pub user_id: Uuid,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    /// Opaque JSON blob, stored verbatim.
    pub attachments: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketHistory {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: HistoryAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AiPrediction {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub model_id: String,
    pub predicted_category_id: Option<Uuid>,
    pub predicted_priority: Option<Priority>,
    pub predicted_issue_type: Option<IssueType>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AutoResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub response_text: String,
    pub is_successful: bool,
    pub created_at: DateTime<Utc>,
}

/// First 8 hex characters of a ticket id: the human-facing short form used
/// in notification titles.
pub fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
