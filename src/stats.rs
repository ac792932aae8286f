//! Dashboard metrics: read-only aggregates over the store.
//!
//! Everything here is derived on demand with plain aggregate queries; the
//! aggregator never writes. Percentages are rounded to two decimals for the
//! dashboard. The CSAT figure is a heuristic: a base score plus a bonus for
//! the auto-resolution rate plus a speed bonus driven by the configured
//! assumed response time.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::MetricsConfig;
use crate::error::AppError;
use crate::store::Store;

#[derive(Debug, Serialize)]
pub struct RoutingErrors {
    pub manual_review: i64,
    pub low_confidence: i64,
    pub needs_clarification: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyTrend {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub opened: i64,
    pub closed: i64,
}

#[derive(Debug, Serialize)]
pub struct Metrics {
    pub total_tickets: i64,
    pub closed_tickets: i64,
    pub auto_closed_tickets: i64,
    pub tickets_by_category: HashMap<String, i64>,
    pub tickets_by_queue: HashMap<String, i64>,
    pub tickets_by_issue_type: HashMap<String, i64>,
    /// Mean problem-type confidence across predictions, in percent.
    pub avg_confidence: f64,
    pub auto_resolution_rate: f64,
    pub needs_clarification_rate: f64,
    pub routing_errors: RoutingErrors,
    pub routing_error_rate: f64,
    pub avg_response_time_secs: f64,
    /// 0–100; see module docs for the formula.
    pub csat_score: f64,
    pub avg_resolution_hours_by_category: HashMap<String, f64>,
    /// Last 7 days, oldest first.
    pub daily_trend: Vec<DailyTrend>,
}

pub async fn compute(
    store: &Store,
    cfg: &MetricsConfig,
    now: DateTime<Utc>,
) -> Result<Metrics, AppError> {
    let pool = store.pool();

    let total_tickets: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets").fetch_one(pool).await?;
    let closed_tickets: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status = 'closed'")
            .fetch_one(pool)
            .await?;
    let auto_closed_tickets: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE auto_resolved = 1")
            .fetch_one(pool)
            .await?;

    let tickets_by_category: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
        "SELECT c.name, COUNT(*) FROM tickets t
         JOIN categories c ON t.category_id = c.id
         GROUP BY c.name",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let tickets_by_queue: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
        "SELECT queue, COUNT(*) FROM tickets WHERE queue IS NOT NULL GROUP BY queue",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let tickets_by_issue_type: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
        "SELECT issue_type, COUNT(*) FROM tickets WHERE issue_type IS NOT NULL GROUP BY issue_type",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let avg_confidence: Option<f64> =
        sqlx::query_scalar("SELECT AVG(confidence) FROM ai_predictions")
            .fetch_one(pool)
            .await?;

    let manual_review: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE queue = 'ManualReview'")
            .fetch_one(pool)
            .await?;
    let low_confidence: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE ai_confidence < 0.7")
            .fetch_one(pool)
            .await?;
    let needs_clarification: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE needs_clarification = 1")
            .fetch_one(pool)
            .await?;

    let rate = |count: i64| {
        if total_tickets > 0 {
            round2(count as f64 / total_tickets as f64 * 100.0)
        } else {
            0.0
        }
    };
    let auto_resolution_rate = rate(auto_closed_tickets);
    let needs_clarification_rate = rate(needs_clarification);
    // ManualReview is the primary routing-error indicator.
    let routing_error_rate = rate(manual_review);

    let auto_bonus = (auto_resolution_rate / 5.0).min(20.0);
    let speed_bonus = (10.0 - cfg.assumed_response_time_secs * 10.0).max(0.0);
    let csat_score = round2((70.0 + auto_bonus + speed_bonus).min(100.0));

    let avg_resolution_hours_by_category: HashMap<String, f64> =
        sqlx::query_as::<_, (String, f64)>(
            "SELECT c.name, AVG((julianday(t.closed_at) - julianday(t.created_at)) * 24)
             FROM tickets t
             JOIN categories c ON t.category_id = c.id
             WHERE t.closed_at IS NOT NULL
             GROUP BY c.name",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name, hours)| (name, round2(hours)))
        .collect();

    let mut daily_trend = Vec::with_capacity(7);
    for offset in (0..7i64).rev() {
        let day = (now - Duration::days(offset)).date_naive();
        let start = day
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc();
        let end = start + Duration::days(1);

        let opened: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE created_at >= ? AND created_at < ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;
        let closed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE closed_at IS NOT NULL AND closed_at >= ? AND closed_at < ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;

        daily_trend.push(DailyTrend { date: day.to_string(), opened, closed });
    }

    Ok(Metrics {
        total_tickets,
        closed_tickets,
        auto_closed_tickets,
        tickets_by_category,
        tickets_by_queue,
        tickets_by_issue_type,
        avg_confidence: round2(avg_confidence.unwrap_or(0.0) * 100.0),
        auto_resolution_rate,
        needs_clarification_rate,
        routing_errors: RoutingErrors { manual_review, low_confidence, needs_clarification },
        routing_error_rate,
        avg_response_time_secs: cfg.assumed_response_time_secs,
        csat_score,
        avg_resolution_hours_by_category,
        daily_trend,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueType, Queue, TicketStatus};
    use crate::store::testing::memory_store;
    use crate::store::tickets::test_support::{blank_ticket, insert_plain, seeded_author};

    #[tokio::test]
    async fn empty_store_produces_zeroed_metrics_with_base_csat() {
        let store = memory_store().await;
        let m = compute(&store, &MetricsConfig::default(), Utc::now()).await.unwrap();

        assert_eq!(m.total_tickets, 0);
        assert_eq!(m.closed_tickets, 0);
        assert_eq!(m.auto_resolution_rate, 0.0);
        assert_eq!(m.routing_error_rate, 0.0);
        assert!(m.tickets_by_queue.is_empty());
        // base 70 + 0 auto bonus + (10 - 0.8*10) = 72
        assert!((m.csat_score - 72.0).abs() < 1e-9);
        assert_eq!(m.daily_trend.len(), 7);
        assert!(m.daily_trend.iter().all(|d| d.opened == 0 && d.closed == 0));
    }

    #[tokio::test]
    async fn counts_and_rates_reflect_the_ticket_mix() {
        let store = memory_store().await;
        let now = Utc::now();
        let author = seeded_author(&store, now).await;
        let billing = store.ensure_category("Billing").await.unwrap();

        // one auto-resolved billing ticket
        let mut auto = blank_ticket(author.id, now);
        auto.category_id = Some(billing.id);
        auto.queue = Some(Queue::Automated);
        auto.issue_type = Some(IssueType::Typical);
        auto.status = TicketStatus::AutoResolved;
        auto.auto_resolved = true;
        auto.closed_at = Some(now);
        insert_plain(&store, &auto).await;

        // one manual-review ticket needing clarification
        let mut review = blank_ticket(author.id, now);
        review.queue = Some(Queue::ManualReview);
        review.needs_clarification = true;
        review.ai_confidence = 0.5;
        insert_plain(&store, &review).await;

        // one plainly closed ticket, resolved after 2 h
        let created = now - Duration::hours(2);
        let mut closed = blank_ticket(author.id, created);
        closed.category_id = Some(billing.id);
        closed.status = TicketStatus::Closed;
        closed.closed_at = Some(now);
        insert_plain(&store, &closed).await;

        let m = compute(&store, &MetricsConfig::default(), now).await.unwrap();

        assert_eq!(m.total_tickets, 3);
        assert_eq!(m.closed_tickets, 1);
        assert_eq!(m.auto_closed_tickets, 1);
        assert_eq!(m.tickets_by_category.get("Billing"), Some(&2));
        assert_eq!(m.tickets_by_queue.get("Automated"), Some(&1));
        assert_eq!(m.tickets_by_queue.get("ManualReview"), Some(&1));
        assert_eq!(m.tickets_by_issue_type.get("typical"), Some(&1));

        assert!((m.auto_resolution_rate - 33.33).abs() < 0.01);
        assert!((m.needs_clarification_rate - 33.33).abs() < 0.01);
        assert!((m.routing_error_rate - 33.33).abs() < 0.01);
        assert_eq!(m.routing_errors.manual_review, 1);
        assert_eq!(m.routing_errors.low_confidence, 1);

        // Billing resolution: (0 h for the auto ticket) and 2 h for the
        // closed one: mean 1 h.
        let billing_hours = m.avg_resolution_hours_by_category.get("Billing").unwrap();
        assert!((billing_hours - 1.0).abs() < 0.1, "was {billing_hours}");

        // today's bucket counts all three opens and both closes
        let today = m.daily_trend.last().unwrap();
        assert_eq!(today.opened, 3);
        assert_eq!(today.closed, 2);
    }

    #[tokio::test]
    async fn csat_bonus_is_capped_at_one_hundred() {
        let store = memory_store().await;
        let now = Utc::now();
        let author = seeded_author(&store, now).await;
        // every ticket auto-resolved: auto rate 100 % → bonus capped at 20
        for _ in 0..3 {
            let mut t = blank_ticket(author.id, now);
            t.status = TicketStatus::AutoResolved;
            t.auto_resolved = true;
            t.closed_at = Some(now);
            insert_plain(&store, &t).await;
        }

        let cfg = MetricsConfig { assumed_response_time_secs: 0.0 };
        let m = compute(&store, &cfg, now).await.unwrap();
        // 70 + 20 + 10 = 100 exactly, never above
        assert!((m.csat_score - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn avg_confidence_is_reported_in_percent() {
        let store = memory_store().await;
        let now = Utc::now();
        let author = seeded_author(&store, now).await;
        insert_plain(&store, &blank_ticket(author.id, now)).await; // prediction confidence 0.9

        let m = compute(&store, &MetricsConfig::default(), now).await.unwrap();
        assert!((m.avg_confidence - 90.0).abs() < 1e-9);
    }
}
