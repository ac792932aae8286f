//! Ingestion orchestrator: composes the whole pipeline for one ticket.
//!
//! `submit` runs classify → clarify-check → route → (maybe) auto-reply →
//! persist. Everything that can go wrong upstream degrades instead of
//! failing: a dead classifier falls back to the default classification and
//! leaves a "degraded classification" note in history, a missing or unhappy
//! auto-reply engine demotes the Automated queue to GeneralSupport. The only
//! hard failures are an empty body and a dead store.
//!
//! All five side-effects of a submission: ticket, prediction, optional
//! auto-response, history, notifications: commit in one store transaction.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::autoreply::AutoReplyEngine;
use crate::classifier::ClassifierGateway;
use crate::config::Config;
use crate::domain::{
    HistoryAction, Language, Queue, Ticket, TicketSource, TicketStatus,
};
use crate::error::AppError;
use crate::notify;
use crate::routing;
use crate::sla;
use crate::store::tickets::NewPrediction;
use crate::store::{NewHistory, Store};

/// Shared application state injected into every request handler.
pub struct AppState {
    pub store: Store,
    pub classifier: ClassifierGateway,
    /// `None` when the response bank failed to initialize: auto-reply is
    /// then disabled for the process lifetime and Automated routing demotes
    /// to GeneralSupport.
    pub autoreply: Option<AutoReplyEngine>,
    pub config: Arc<Config>,
}

/// An incoming ticket submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    #[serde(default = "default_source")]
    pub source: TicketSource,
    /// Missing for unauthenticated callers: a placeholder user is created.
    pub author_id: Option<Uuid>,
    pub subject: Option<String>,
    pub body: String,
    pub language: Option<Language>,
}

fn default_source() -> TicketSource {
    TicketSource::Portal
}

/// What the caller gets back: the stored ticket plus the routing verdict.
#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub ticket: Ticket,
    pub queue: Queue,
    pub message: String,
    pub auto_reply: Option<String>,
}

/// Ingest one ticket end to end.
#[tracing::instrument(skip(state, request), fields(source = ?request.source))]
pub async fn submit(state: &AppState, request: SubmitRequest) -> Result<SubmitOutcome, AppError> {
    let now = Utc::now();
    let body = request.body.trim().to_string();
    if body.is_empty() {
        return Err(AppError::InvalidInput("ticket body must not be empty".into()));
    }
    let subject = request
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    // 1. Author: upsert, synthesizing a placeholder for anonymous callers.
    let author = state
        .store
        .upsert_author(request.author_id.unwrap_or_else(Uuid::new_v4), now)
        .await?;

    // 2. Classify. Degradation is an outcome, not an error.
    let outcome = state
        .classifier
        .classify(subject.as_deref().unwrap_or(""), &body)
        .await?;
    let classification = outcome.classification().clone();
    let degraded_cause = outcome.degraded_cause().map(String::from);

    let category = state.store.ensure_category(&classification.category).await?;

    // 3 + 4. Clarification flags and queue come from the routing policy.
    let decision = routing::route(&classification, &state.config.routing);
    let mut queue = decision.queue;
    let mut message = decision.message.clone();

    // 5. Automated queue must actually produce a sendable draft.
    let mut status = TicketStatus::New;
    let mut auto_resolved = false;
    let mut closed_at = None;
    let mut auto_reply_text: Option<String> = None;
    if queue == Queue::Automated {
        let draft = state.autoreply.as_ref().map(|engine| {
            engine.generate_draft(
                &body,
                Some(classification.category.as_str()),
                Some(classification.issue_type),
                request.language,
            )
        });
        match draft {
            Some(draft) if draft.can_auto_reply => {
                status = TicketStatus::AutoResolved;
                auto_resolved = true;
                closed_at = Some(now);
                message = draft.text.clone();
                auto_reply_text = Some(draft.text);
            }
            Some(draft) => {
                queue = Queue::GeneralSupport;
                message = format!(
                    "Auto-reply not possible ({}); routed to general support.",
                    draft.reason.as_deref().unwrap_or("no reason")
                );
            }
            None => {
                queue = Queue::GeneralSupport;
                message = "Auto-reply engine unavailable; routed to general support.".into();
            }
        }
    }

    let language = request
        .language
        .unwrap_or_else(|| AutoReplyEngine::detect_language(&body));
    let department = state.store.department_by_name(queue.as_str()).await?;

    // 6. SLA deadline from the classified priority.
    let sla_deadline = Some(sla::deadline_for(classification.priority, now));

    let ticket = Ticket {
        id: Uuid::new_v4(),
        source: request.source,
        author_id: author.id,
        subject,
        body,
        language,
        category_id: Some(category.id),
        priority: Some(classification.priority),
        issue_type: Some(classification.issue_type),
        ai_confidence: classification.confidence.issue_type,
        queue: Some(queue),
        assigned_department_id: department.map(|d| d.id),
        assigned_operator_id: None,
        status,
        auto_resolved,
        needs_clarification: decision.needs_clarification,
        confidence_warning: decision.confidence_warning(),
        sla_deadline,
        is_escalated: false,
        created_at: now,
        updated_at: now,
        closed_at,
    };

    let description = match &degraded_cause {
        Some(cause) => format!("Ticket created (degraded classification: {cause})"),
        None => format!("Ticket created; routed to {queue}"),
    };
    let history = [NewHistory {
        actor_id: Some(author.id),
        action: HistoryAction::Created,
        old_value: None,
        new_value: Some(queue.to_string()),
        description: Some(description),
    }];

    let prediction = NewPrediction {
        model_id: state.classifier.model_id.clone(),
        predicted_category_id: Some(category.id),
        predicted_priority: Some(classification.priority),
        predicted_issue_type: Some(classification.issue_type),
        confidence: classification.confidence.issue_type,
    };

    // 7. One transaction for every side-effect.
    let admins = state.store.admins().await?;
    let notifications = notify::ticket_created(&ticket, &admins);
    state
        .store
        .create_ticket(&ticket, &prediction, auto_reply_text.as_deref(), &history, &notifications)
        .await?;

    info!(
        ticket = %ticket.id,
        queue = %queue,
        status = %ticket.status,
        auto_resolved,
        needs_clarification = ticket.needs_clarification,
        "ticket ingested"
    );

    Ok(SubmitOutcome { ticket, queue, message, auto_reply: auto_reply_text })
}
