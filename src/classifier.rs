//! Classifier gateway: typed adapter over the ML service's `/predict` RPC.
//!
//! The upstream model speaks its own label vocabulary (Russian label strings
//! such as «Типовой»); this gateway maps it onto the canonical enums before
//! anything downstream sees it. Unknown labels map to safe defaults with a
//! floor confidence, and an unreachable upstream produces an explicit
//! [`Outcome::Degraded`] carrying the fallback classification: the caller
//! branches on the variant, records a warning, and keeps going. Nothing in
//! here throws across the boundary except `InvalidInput` for an empty query.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::config::ClassifierConfig;
use crate::domain::{IssueType, Priority};
use crate::error::AppError;

/// Confidence assigned when the upstream is unreachable or a label is
/// unknown to the adapter.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Confidence assumed when the upstream omits an axis entirely.
const MISSING_CONFIDENCE: f64 = 0.5;
/// Category used on the full-fallback path.
const FALLBACK_CATEGORY: &str = "General";

/// Per-axis posterior confidence of the winning label, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confidence {
    pub category: f64,
    pub priority: f64,
    pub issue_type: f64,
}

impl Confidence {
    pub fn min(&self) -> f64 {
        self.category.min(self.priority).min(self.issue_type)
    }
}

/// A normalized classification result.
#[derive(Debug, Clone)]
pub struct Classification {
    pub category: String,
    pub priority: Priority,
    pub issue_type: IssueType,
    pub confidence: Confidence,
}

impl Classification {
    /// The fallback used when the upstream cannot be consulted at all.
    pub fn fallback() -> Self {
        Self {
            category: FALLBACK_CATEGORY.to_string(),
            priority: Priority::Medium,
            issue_type: IssueType::Complex,
            confidence: Confidence {
                category: FALLBACK_CONFIDENCE,
                priority: FALLBACK_CONFIDENCE,
                issue_type: FALLBACK_CONFIDENCE,
            },
        }
    }
}

/// Result variant the orchestrator branches on. `Degraded` means the request
/// continues on the fallback: it is not an error.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok(Classification),
    Degraded { fallback: Classification, cause: String },
}

impl Outcome {
    pub fn classification(&self) -> &Classification {
        match self {
            Outcome::Ok(c) => c,
            Outcome::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn degraded_cause(&self) -> Option<&str> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Degraded { cause, .. } => Some(cause),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    category: Option<String>,
    priority: Option<String>,
    problem_type: Option<String>,
    confidence: Option<WireConfidence>,
}

#[derive(Debug, Default, Deserialize)]
struct WireConfidence {
    category: Option<f64>,
    priority: Option<f64>,
    problem_type: Option<f64>,
}

/// RPC client for the classifier service.
pub struct ClassifierGateway {
    client: reqwest::Client,
    base_url: String,
    /// Model identifier stamped onto stored predictions.
    pub model_id: String,
}

impl ClassifierGateway {
    pub fn new(cfg: &ClassifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            model_id: cfg.model_id.clone(),
        }
    }

    /// Classify `(subject, body)`.
    ///
    /// Fails only on empty input; every upstream problem degrades instead.
    pub async fn classify(&self, subject: &str, body: &str) -> Result<Outcome, AppError> {
        let subject = subject.trim();
        let body = body.trim();
        if subject.is_empty() && body.is_empty() {
            return Err(AppError::InvalidInput(
                "classification requires a subject or a body".into(),
            ));
        }

        match self.predict(subject, body).await {
            Ok(resp) => Ok(Outcome::Ok(normalize(resp))),
            Err(cause) => {
                warn!(%cause, "classifier unreachable — using fallback classification");
                Ok(Outcome::Degraded { fallback: Classification::fallback(), cause })
            }
        }
    }

    async fn predict(&self, subject: &str, body: &str) -> Result<PredictResponse, String> {
        let url = format!("{}/predict", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "subject": subject, "body": body }))
            .send()
            .await
            .map_err(|e| format!("POST {url}: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("classifier returned HTTP {status}"));
        }
        response
            .json::<PredictResponse>()
            .await
            .map_err(|e| format!("parsing classifier response: {e}"))
    }
}

fn normalize(resp: PredictResponse) -> Classification {
    let wire = resp.confidence.unwrap_or_default();
    let mut confidence = Confidence {
        category: wire.category.unwrap_or(MISSING_CONFIDENCE),
        priority: wire.priority.unwrap_or(MISSING_CONFIDENCE),
        issue_type: wire.problem_type.unwrap_or(MISSING_CONFIDENCE),
    };

    let priority = match resp.priority.as_deref().and_then(map_priority) {
        Some(p) => p,
        None => {
            confidence.priority = FALLBACK_CONFIDENCE;
            Priority::Medium
        }
    };
    let issue_type = match resp.problem_type.as_deref().and_then(map_issue_type) {
        Some(t) => t,
        None => {
            confidence.issue_type = FALLBACK_CONFIDENCE;
            IssueType::Complex
        }
    };

    Classification {
        category: resp
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string()),
        priority,
        issue_type,
        confidence,
    }
}

/// Upstream priority vocabulary → canonical enum. Accepts the model's Russian
/// labels and the canonical English names.
fn map_priority(label: &str) -> Option<Priority> {
    match label.trim() {
        "Низкий" | "low" => Some(Priority::Low),
        "Средний" | "medium" => Some(Priority::Medium),
        "Высокий" | "high" => Some(Priority::High),
        "Критический" | "critical" => Some(Priority::Critical),
        _ => None,
    }
}

/// Upstream problem-type vocabulary → canonical enum.
fn map_issue_type(label: &str) -> Option<IssueType> {
    match label.trim() {
        "Типовой" | "typical" => Some(IssueType::Typical),
        "Простой" | "simple" => Some(IssueType::Simple),
        "Сложный" | "complex" => Some(IssueType::Complex),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(url: &str) -> ClassifierGateway {
        ClassifierGateway::new(&ClassifierConfig {
            url: url.to_string(),
            timeout_ms: 2_000,
            model_id: "test-model".into(),
        })
    }

    // -----------------------------------------------------------------------
    // Label mapping: pure, no I/O
    // -----------------------------------------------------------------------

    #[test]
    fn russian_labels_map_to_canonical_enums() {
        assert_eq!(map_priority("Высокий"), Some(Priority::High));
        assert_eq!(map_priority("Критический"), Some(Priority::Critical));
        assert_eq!(map_issue_type("Типовой"), Some(IssueType::Typical));
        assert_eq!(map_issue_type("Простой"), Some(IssueType::Simple));
    }

    #[test]
    fn english_labels_are_accepted_too() {
        assert_eq!(map_priority("medium"), Some(Priority::Medium));
        assert_eq!(map_issue_type("complex"), Some(IssueType::Complex));
    }

    #[test]
    fn unknown_labels_default_with_floor_confidence() {
        let resp = PredictResponse {
            category: Some("Billing".into()),
            priority: Some("Urgentish".into()),
            problem_type: Some("???".into()),
            confidence: Some(WireConfidence {
                category: Some(0.9),
                priority: Some(0.9),
                problem_type: Some(0.9),
            }),
        };
        let c = normalize(resp);
        assert_eq!(c.priority, Priority::Medium);
        assert_eq!(c.issue_type, IssueType::Complex);
        // the defaulted axes lose their reported confidence
        assert!((c.confidence.priority - FALLBACK_CONFIDENCE).abs() < f64::EPSILON);
        assert!((c.confidence.issue_type - FALLBACK_CONFIDENCE).abs() < f64::EPSILON);
        // the trusted axis keeps its value
        assert!((c.confidence.category - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_confidence_map_assumes_half() {
        let resp = PredictResponse {
            category: Some("Billing".into()),
            priority: Some("Средний".into()),
            problem_type: Some("Типовой".into()),
            confidence: None,
        };
        let c = normalize(resp);
        assert!((c.confidence.category - 0.5).abs() < f64::EPSILON);
        assert!((c.confidence.issue_type - 0.5).abs() < f64::EPSILON);
    }

    // -----------------------------------------------------------------------
    // RPC behavior
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn successful_predict_yields_ok_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "category": "Биллинг",
                "priority": "Высокий",
                "problem_type": "Типовой",
                "confidence": { "category": 0.92, "priority": 0.81, "problem_type": 0.88 }
            })))
            .mount(&server)
            .await;

        let outcome = gateway_for(&server.uri())
            .classify("Invoice", "When is my bill due?")
            .await
            .unwrap();

        let Outcome::Ok(c) = outcome else { panic!("expected Ok outcome") };
        assert_eq!(c.category, "Биллинг");
        assert_eq!(c.priority, Priority::High);
        assert_eq!(c.issue_type, IssueType::Typical);
        assert!((c.confidence.issue_type - 0.88).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn upstream_error_degrades_with_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcome = gateway_for(&server.uri())
            .classify("Subject", "Body")
            .await
            .unwrap();

        let Outcome::Degraded { fallback, cause } = outcome else {
            panic!("expected Degraded outcome")
        };
        assert_eq!(fallback.category, "General");
        assert_eq!(fallback.priority, Priority::Medium);
        assert_eq!(fallback.issue_type, IssueType::Complex);
        assert!((fallback.confidence.min() - FALLBACK_CONFIDENCE).abs() < f64::EPSILON);
        assert!(cause.contains("500"), "cause was: {cause}");
    }

    #[tokio::test]
    async fn unreachable_upstream_degrades_instead_of_failing() {
        // Port 9 is discard; nothing listens there in the test environment.
        let outcome = gateway_for("http://127.0.0.1:9")
            .classify("Subject", "Body")
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Degraded { .. }));
    }

    #[tokio::test]
    async fn malformed_upstream_json_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json {{"))
            .mount(&server)
            .await;

        let outcome = gateway_for(&server.uri())
            .classify("Subject", "Body")
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Degraded { .. }));
    }

    #[tokio::test]
    async fn empty_subject_and_body_is_invalid_input() {
        let err = gateway_for("http://127.0.0.1:9")
            .classify("  ", "\n\t")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
