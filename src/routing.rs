//! Routing policy: the pure decision function of the pipeline.
//!
//! Given a classification and its per-axis confidences, decide the
//! destination queue. Rules are evaluated top to bottom, first match wins,
//! and the ordering is part of the contract:
//!
//! 1. any axis below the clarification threshold → `ManualReview`
//! 2. typical issue with high problem-type confidence → `Automated`
//! 3. typical issue with low problem-type confidence → `GeneralSupport`
//! 4. high/critical priority → `HighPriority`
//! 5. confident category → substring-mapped department queue
//! 6. everything else → `GeneralSupport`
//!
//! The `Automated` verdict is provisional: the orchestrator still has to get
//! a usable draft out of the auto-reply engine, and demotes to
//! `GeneralSupport` when it cannot.

use crate::classifier::Classification;
use crate::config::RoutingConfig;
use crate::domain::{IssueType, Priority, Queue};

/// Outcome of the routing policy for one ticket.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub queue: Queue,
    /// Human-readable note naming the decisive inputs.
    pub message: String,
    pub needs_clarification: bool,
    /// Axes that fell below the clarification threshold, e.g. `category (50%)`.
    pub low_confidence: Vec<String>,
}

impl RouteDecision {
    /// Warning string stored on the ticket when any axis was uncertain.
    pub fn confidence_warning(&self) -> Option<String> {
        if self.low_confidence.is_empty() {
            None
        } else {
            Some(format!(
                "Low model confidence: {}. Manual review required.",
                self.low_confidence.join(", ")
            ))
        }
    }
}

/// Decide the destination queue. Deterministic; no I/O.
pub fn route(c: &Classification, cfg: &RoutingConfig) -> RouteDecision {
    let conf = &c.confidence;

    // Rule 1: any uncertain axis forces human review.
    let mut low = Vec::new();
    if conf.category < cfg.clarification_confidence {
        low.push(format!("category ({:.0}%)", conf.category * 100.0));
    }
    if conf.priority < cfg.clarification_confidence {
        low.push(format!("priority ({:.0}%)", conf.priority * 100.0));
    }
    if conf.issue_type < cfg.clarification_confidence {
        low.push(format!("issue type ({:.0}%)", conf.issue_type * 100.0));
    }
    if !low.is_empty() {
        return RouteDecision {
            queue: Queue::ManualReview,
            message: format!(
                "Needs clarification — low confidence on {}. Category: {}, priority: {}.",
                low.join(", "),
                c.category,
                c.priority
            ),
            needs_clarification: true,
            low_confidence: low,
        };
    }

    // Rules 2 and 3: typical issues.
    if c.issue_type == IssueType::Typical {
        if conf.issue_type >= cfg.auto_resolve_confidence {
            return decided(
                Queue::Automated,
                format!(
                    "Typical issue ({:.0}% confidence) — attempting automatic resolution.",
                    conf.issue_type * 100.0
                ),
            );
        }
        return decided(
            Queue::GeneralSupport,
            format!(
                "Possibly typical ({:.0}% confidence) — needs operator verification. Category: {}.",
                conf.issue_type * 100.0,
                c.category
            ),
        );
    }

    // Rule 4: priority escalation.
    if c.priority >= Priority::High {
        return decided(
            Queue::HighPriority,
            format!(
                "Routed to the high-priority queue. Category: {} (priority confidence {:.0}%).",
                c.category,
                conf.priority * 100.0
            ),
        );
    }

    // Rule 5: category substring map.
    if conf.category >= cfg.clarification_confidence {
        let queue = queue_for_category(&c.category);
        return decided(
            queue,
            format!(
                "Routed to {} by category `{}` (confidence {:.0}%). Priority: {}.",
                queue,
                c.category,
                conf.category * 100.0,
                c.priority
            ),
        );
    }

    // Rule 6: nothing to go on.
    decided(
        Queue::GeneralSupport,
        format!(
            "Category uncertain ({:.0}%) — routed to general support. Assumed category: {}.",
            conf.category * 100.0,
            c.category
        ),
    )
}

fn decided(queue: Queue, message: String) -> RouteDecision {
    RouteDecision { queue, message, needs_clarification: false, low_confidence: Vec::new() }
}

/// Fixed substring map from category names (English or Russian) to queues.
/// The match set and its order are part of the policy contract.
fn queue_for_category(category: &str) -> Queue {
    let lower = category.to_lowercase();
    if category.contains("Billing") || lower.contains("биллинг") || lower.contains("платеж") {
        Queue::Billing
    } else if category.contains("Technical") || category.contains("IT") || lower.contains("техническая") {
        Queue::TechSupport
    } else if category.contains("HR") || lower.contains("кадр") {
        Queue::HR
    } else if category.contains("Customer") || lower.contains("сервис") || lower.contains("клиентский") {
        Queue::CustomerService
    } else {
        Queue::GeneralSupport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Confidence;
    use crate::domain::IssueType;

    fn cfg() -> RoutingConfig {
        RoutingConfig::default()
    }

    fn classification(
        category: &str,
        priority: Priority,
        issue_type: IssueType,
        conf: (f64, f64, f64),
    ) -> Classification {
        Classification {
            category: category.into(),
            priority,
            issue_type,
            confidence: Confidence {
                category: conf.0,
                priority: conf.1,
                issue_type: conf.2,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Rule 1: clarification gate
    // -----------------------------------------------------------------------

    #[test]
    fn low_category_confidence_forces_manual_review() {
        let c = classification("Billing", Priority::Medium, IssueType::Typical, (0.5, 0.9, 0.9));
        let d = route(&c, &cfg());
        assert_eq!(d.queue, Queue::ManualReview);
        assert!(d.needs_clarification);
        assert_eq!(d.low_confidence, vec!["category (50%)".to_string()]);
        assert!(d.confidence_warning().unwrap().contains("category (50%)"));
    }

    #[test]
    fn clarification_gate_beats_every_other_rule() {
        // High priority and typical issue type: but the priority axis is weak.
        let c = classification("Billing", Priority::Critical, IssueType::Typical, (0.9, 0.1, 0.9));
        assert_eq!(route(&c, &cfg()).queue, Queue::ManualReview);
    }

    #[test]
    fn exactly_seventy_percent_on_every_axis_is_confident() {
        let c = classification("Billing", Priority::Medium, IssueType::Complex, (0.70, 0.70, 0.70));
        let d = route(&c, &cfg());
        assert!(!d.needs_clarification);
        assert!(d.low_confidence.is_empty());
    }

    #[test]
    fn just_below_seventy_percent_needs_clarification() {
        let c =
            classification("Billing", Priority::Medium, IssueType::Complex, (0.6999, 0.9, 0.9));
        let d = route(&c, &cfg());
        assert!(d.needs_clarification);
        assert_eq!(d.queue, Queue::ManualReview);
    }

    #[test]
    fn multiple_weak_axes_are_all_listed() {
        let c = classification("Billing", Priority::Medium, IssueType::Complex, (0.5, 0.6, 0.9));
        let d = route(&c, &cfg());
        assert_eq!(d.low_confidence.len(), 2);
        assert!(d.low_confidence[0].starts_with("category"));
        assert!(d.low_confidence[1].starts_with("priority"));
    }

    // -----------------------------------------------------------------------
    // Rules 2/3: typical issues
    // -----------------------------------------------------------------------

    #[test]
    fn confident_typical_goes_to_automated() {
        let c = classification("Billing", Priority::Medium, IssueType::Typical, (0.9, 0.8, 0.85));
        assert_eq!(route(&c, &cfg()).queue, Queue::Automated);
    }

    #[test]
    fn automated_threshold_is_inclusive() {
        let c = classification("Billing", Priority::Medium, IssueType::Typical, (0.9, 0.8, 0.75));
        assert_eq!(route(&c, &cfg()).queue, Queue::Automated);
    }

    #[test]
    fn weak_typical_goes_to_general_support() {
        let c = classification("Billing", Priority::Medium, IssueType::Typical, (0.9, 0.8, 0.74));
        let d = route(&c, &cfg());
        assert_eq!(d.queue, Queue::GeneralSupport);
        assert!(d.message.contains("74%"));
    }

    // -----------------------------------------------------------------------
    // Rule 4: priority
    // -----------------------------------------------------------------------

    #[test]
    fn high_priority_beats_category_mapping() {
        let c = classification("Billing", Priority::High, IssueType::Complex, (0.95, 0.9, 0.9));
        assert_eq!(route(&c, &cfg()).queue, Queue::HighPriority);
    }

    #[test]
    fn critical_priority_also_routes_high_priority() {
        let c = classification("HR", Priority::Critical, IssueType::Simple, (0.9, 0.9, 0.9));
        assert_eq!(route(&c, &cfg()).queue, Queue::HighPriority);
    }

    // -----------------------------------------------------------------------
    // Rule 5: category substring map
    // -----------------------------------------------------------------------

    #[test]
    fn category_substrings_map_to_department_queues() {
        for (category, queue) in [
            ("Billing", Queue::Billing),
            ("Вопросы платежей", Queue::Billing),
            ("Technical support", Queue::TechSupport),
            ("IT", Queue::TechSupport),
            ("Техническая поддержка", Queue::TechSupport),
            ("HR", Queue::HR),
            ("Отдел кадров", Queue::HR),
            ("Customer care", Queue::CustomerService),
            ("Клиентский сервис", Queue::CustomerService),
        ] {
            let c = classification(category, Priority::Medium, IssueType::Complex, (0.9, 0.9, 0.9));
            assert_eq!(route(&c, &cfg()).queue, queue, "category: {category}");
        }
    }

    #[test]
    fn unmapped_category_lands_in_general_support() {
        let c =
            classification("Общие вопросы", Priority::Low, IssueType::Simple, (0.9, 0.9, 0.9));
        assert_eq!(route(&c, &cfg()).queue, Queue::GeneralSupport);
    }

    #[test]
    fn billing_wins_over_later_substrings_in_order() {
        // A name matching both "Billing" and "сервис": first rule in the map wins.
        let c = classification(
            "Billing сервис",
            Priority::Medium,
            IssueType::Complex,
            (0.9, 0.9, 0.9),
        );
        assert_eq!(route(&c, &cfg()).queue, Queue::Billing);
    }
}
