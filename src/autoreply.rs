//! Auto-reply engine: drafts a canned answer for typical tickets.
//!
//! The engine is language-aware: Kazakh is detected by its distinctive
//! letters, and Kazakh matches clear a lower similarity bar than Russian
//! ones (the Kazakh half of the corpus embeds noisier; the lower threshold
//! preserves recall without hurting precision). A draft is only marked
//! auto-sendable for typical issues whose best match clears the bar; every
//! other case still returns usable text for an operator, with a reason the
//! caller can log.
//!
//! Outgoing text passes a forbidden-intent filter before it can leave the
//! process: a template asking to change the database or hand out a password
//! is replaced by the neutral fallback.

use std::sync::Arc;

use regex::RegexBuilder;

use crate::bank::ResponseBank;
use crate::config::AutoReplyConfig;
use crate::domain::{IssueType, Language};

/// Letters that occur in Kazakh but not in Russian text.
const KK_LETTERS: [char; 9] = ['ә', 'ғ', 'қ', 'ң', 'ө', 'ұ', 'ү', 'һ', 'і'];

const GREETING_RU: &str = "Спасибо за обращение! ";
const GREETING_KK: &str = "Хабарласқаныңызға рахмет! ";

const DEFAULT_RU: &str = "Спасибо за обращение. Ваш запрос принят в работу. \
                          Наш специалист свяжется с вами в ближайшее время.";
const DEFAULT_KK: &str = "Хабарласқаныңызға рахмет. Сіздің сұрағыңыз жұмысқа алынды. \
                          Біздің маман жақын арада сізбен байланысады.";

const FORBIDDEN_RU: [&str; 3] = [
    r"изменить.*базу данных",
    r"удалить.*данные",
    r"предоставить.*пароль",
];
const FORBIDDEN_KK: [&str; 3] = [
    r"деректер базасын.*өзгерту",
    r"деректерді.*жою",
    r"құпия сөзді.*беру",
];

/// Maximum reply length in code points.
const MAX_REPLY_CHARS: usize = 1000;

/// A drafted reply plus the auto-send verdict.
#[derive(Debug, Clone)]
pub struct DraftReply {
    pub can_auto_reply: bool,
    pub text: String,
    pub matched_id: Option<String>,
    /// Adjusted similarity of the best candidate; 0.0 when nothing matched.
    pub similarity: f32,
    /// Why the draft cannot be auto-sent; `None` when it can.
    pub reason: Option<String>,
    pub language: Language,
}

pub struct AutoReplyEngine {
    bank: Arc<ResponseBank>,
    cfg: AutoReplyConfig,
    forbidden_ru: Vec<regex::Regex>,
    forbidden_kk: Vec<regex::Regex>,
}

impl AutoReplyEngine {
    pub fn new(bank: Arc<ResponseBank>, cfg: AutoReplyConfig) -> Self {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .expect("static safety pattern must compile")
                })
                .collect()
        };
        Self {
            bank,
            cfg,
            forbidden_ru: compile(&FORBIDDEN_RU),
            forbidden_kk: compile(&FORBIDDEN_KK),
        }
    }

    /// Detect the query language by scanning for Kazakh-specific letters.
    /// Everything else (including English) is treated as Russian, which is
    /// the language the bulk of the bank is written in.
    pub fn detect_language(text: &str) -> Language {
        let lower = text.to_lowercase();
        if lower.chars().any(|c| KK_LETTERS.contains(&c)) {
            Language::Kk
        } else {
            Language::Ru
        }
    }

    /// Draft a reply for `query`.
    ///
    /// `language` overrides detection when the caller already knows it.
    pub fn generate_draft(
        &self,
        query: &str,
        category: Option<&str>,
        issue_type: Option<IssueType>,
        language: Option<Language>,
    ) -> DraftReply {
        let language = language.unwrap_or_else(|| Self::detect_language(query));
        // English tickets match against the Russian half of the bank.
        let bank_language = match language {
            Language::Kk => Language::Kk,
            _ => Language::Ru,
        };
        let threshold = match bank_language {
            Language::Kk => self.cfg.threshold_kk,
            _ => self.cfg.threshold_ru,
        } as f32;

        let candidates = self.bank.search(query, Some(bank_language), category, 3);
        let Some(best) = candidates.first() else {
            return DraftReply {
                can_auto_reply: false,
                text: default_text(bank_language).to_string(),
                matched_id: None,
                similarity: 0.0,
                reason: Some("no-match".into()),
                language,
            };
        };

        let mut text = if best.similarity >= self.cfg.verbatim_threshold as f32 {
            best.text.clone()
        } else {
            let greeting = greeting(bank_language);
            if best.text.starts_with(greeting) {
                best.text.clone()
            } else {
                format!("{greeting}{}", best.text)
            }
        };

        let mut can_auto_reply = issue_type == Some(IssueType::Typical)
            && best.similarity >= threshold;
        let mut reason = if can_auto_reply {
            None
        } else if issue_type != Some(IssueType::Typical) {
            Some("complex-issue".to_string())
        } else {
            Some("low-similarity".to_string())
        };

        if self.violates_safety(&text, bank_language) {
            text = default_text(bank_language).to_string();
            can_auto_reply = false;
            reason = Some("unsafe-template".into());
        }

        DraftReply {
            can_auto_reply,
            text: truncate_chars(text, MAX_REPLY_CHARS),
            matched_id: Some(best.response_id.clone()),
            similarity: best.similarity,
            reason,
            language,
        }
    }

    fn violates_safety(&self, text: &str, language: Language) -> bool {
        let patterns = match language {
            Language::Kk => &self.forbidden_kk,
            _ => &self.forbidden_ru,
        };
        patterns.iter().any(|p| p.is_match(text))
    }
}

fn greeting(language: Language) -> &'static str {
    match language {
        Language::Kk => GREETING_KK,
        _ => GREETING_RU,
    }
}

fn default_text(language: Language) -> &'static str {
    match language {
        Language::Kk => DEFAULT_KK,
        _ => DEFAULT_RU,
    }
}

fn truncate_chars(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        text
    } else {
        text.chars().take(max).collect()
    }
}
