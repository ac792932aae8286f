//! Configuration types for helpdesk-core.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens any ports. Invalid configs are rejected with a clear error
//! rather than silently falling back to defaults. The two values that vary
//! per deployment: database URL and classifier URL; can also be overridden
//! through `HDC_DATABASE_URL` / `HDC_CLASSIFIER_URL`.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//!
//! [database]
//! url = "sqlite://helpdesk.db?mode=rwc"
//!
//! [classifier]
//! url = "http://localhost:8000"
//! timeout_ms = 10000
//!
//! [autoreply]
//! responses_path = "responses.json"
//! cache_dir = ".cache/response-index"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub autoreply: AutoReplyConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub sla: SlaConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with env overrides applied: used when no config
    /// file exists at the default location.
    pub fn from_defaults() -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HDC_DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(url) = std::env::var("HDC_CLASSIFIER_URL") {
            if !url.is_empty() {
                self.classifier.url = url;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.port != 0, "server.port must be nonzero");
        anyhow::ensure!(
            !self.database.url.is_empty(),
            "database.url must not be empty"
        );
        anyhow::ensure!(
            self.classifier.timeout_ms > 0,
            "classifier.timeout_ms must be positive"
        );

        for (name, value) in [
            ("autoreply.threshold_ru", self.autoreply.threshold_ru),
            ("autoreply.threshold_kk", self.autoreply.threshold_kk),
            ("autoreply.verbatim_threshold", self.autoreply.verbatim_threshold),
            (
                "routing.auto_resolve_confidence",
                self.routing.auto_resolve_confidence,
            ),
            (
                "routing.clarification_confidence",
                self.routing.clarification_confidence,
            ),
        ] {
            anyhow::ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be within [0, 1], got {value}"
            );
        }

        anyhow::ensure!(
            self.sla.sweep_interval_secs > 0,
            "sla.sweep_interval_secs must be positive"
        );
        anyhow::ensure!(
            self.sla.escalation_window_hours > 0,
            "sla.escalation_window_hours must be positive"
        );

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port for the public API (default: 8080).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Allow any origin on CORS. The dashboard frontend is served from a
    /// different origin in every deployment we have seen so far.
    #[serde(default = "defaults::yes")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: defaults::port(), cors_allow_any: true }
    }
}

/// Ticket store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLx connection URL. `HDC_DATABASE_URL` overrides.
    #[serde(default = "defaults::database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: defaults::database_url() }
    }
}

/// Upstream classifier RPC settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Base URL of the ML service exposing `POST /predict`.
    /// `HDC_CLASSIFIER_URL` overrides.
    #[serde(default = "defaults::classifier_url")]
    pub url: String,

    /// Wall-clock timeout per RPC in milliseconds (default: 10 000).
    /// A timeout downgrades the request to the fallback classification;
    /// it never fails the ticket.
    #[serde(default = "defaults::rpc_timeout_ms")]
    pub timeout_ms: u64,

    /// Identifier stamped onto every stored prediction row.
    #[serde(default = "defaults::model_id")]
    pub model_id: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: defaults::classifier_url(),
            timeout_ms: defaults::rpc_timeout_ms(),
            model_id: defaults::model_id(),
        }
    }
}

/// Response bank + auto-reply engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutoReplyConfig {
    /// Path to the bilingual canned-response JSON file. If the file is
    /// missing or empty, auto-reply is disabled for the process lifetime.
    #[serde(default = "defaults::responses_path")]
    pub responses_path: String,

    /// Directory for the on-disk index cache, keyed by the source file hash.
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: String,

    /// Minimum similarity for a Russian-language auto-reply.
    #[serde(default = "defaults::threshold_ru")]
    pub threshold_ru: f64,

    /// Minimum similarity for a Kazakh-language auto-reply. Kazakh embeddings
    /// are noisier; the lower threshold preserves recall without hurting
    /// precision on the corpus.
    #[serde(default = "defaults::threshold_kk")]
    pub threshold_kk: f64,

    /// Above this similarity the template is returned verbatim, without the
    /// greeting prefix.
    #[serde(default = "defaults::verbatim_threshold")]
    pub verbatim_threshold: f64,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            responses_path: defaults::responses_path(),
            cache_dir: defaults::cache_dir(),
            threshold_ru: defaults::threshold_ru(),
            threshold_kk: defaults::threshold_kk(),
            verbatim_threshold: defaults::verbatim_threshold(),
        }
    }
}

/// Confidence gates for the routing policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Problem-type confidence required before the Automated queue is even
    /// considered (default: 0.75).
    #[serde(default = "defaults::auto_resolve_confidence")]
    pub auto_resolve_confidence: f64,

    /// Per-axis confidence below which a ticket needs human clarification
    /// and goes to ManualReview (default: 0.70).
    #[serde(default = "defaults::clarification_confidence")]
    pub clarification_confidence: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            auto_resolve_confidence: defaults::auto_resolve_confidence(),
            clarification_confidence: defaults::clarification_confidence(),
        }
    }
}

/// SLA sweep settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlaConfig {
    /// Seconds between escalation sweeps (default: 60).
    #[serde(default = "defaults::sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// A ticket is escalated when its deadline is within this many hours
    /// (default: 12).
    #[serde(default = "defaults::escalation_window_hours")]
    pub escalation_window_hours: u64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: defaults::sweep_interval_secs(),
            escalation_window_hours: defaults::escalation_window_hours(),
        }
    }
}

/// Dashboard metric constants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Assumed first-response time in seconds, used by the CSAT speed bonus.
    /// Measured end-to-end response time would belong here once the
    /// ingestion path records it.
    #[serde(default = "defaults::assumed_response_time_secs")]
    pub assumed_response_time_secs: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { assumed_response_time_secs: defaults::assumed_response_time_secs() }
    }
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn yes() -> bool { true }
    pub fn database_url() -> String { "sqlite://helpdesk.db?mode=rwc".into() }
    pub fn classifier_url() -> String { "http://localhost:8000".into() }
    pub fn rpc_timeout_ms() -> u64 { 10_000 }
    pub fn model_id() -> String { "helpdesk-classifier-v1".into() }
    pub fn responses_path() -> String { "responses.json".into() }
    pub fn cache_dir() -> String { ".cache/response-index".into() }
    pub fn threshold_ru() -> f64 { 0.65 }
    pub fn threshold_kk() -> f64 { 0.50 }
    pub fn verbatim_threshold() -> f64 { 0.80 }
    pub fn auto_resolve_confidence() -> f64 { 0.75 }
    pub fn clarification_confidence() -> f64 { 0.70 }
    pub fn sweep_interval_secs() -> u64 { 60 }
    pub fn escalation_window_hours() -> u64 { 12 }
    pub fn assumed_response_time_secs() -> f64 { 0.8 }
}
