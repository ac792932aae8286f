//! Bilingual response bank with semantic lookup.
//!
//! The bank loads the curated RU/KK canned-response file once at startup,
//! embeds every language variant, and serves nearest-neighbor lookups over a
//! flat cosine index. Raw similarity is adjusted by two corpus-tuned signals
//! before ranking:
//!
//! - keyword hits in the query boost a candidate by +0.05 each, capped at +0.15;
//! - a category mismatch costs −0.10 for Russian rows and −0.05 for Kazakh
//!   rows (the Kazakh half of the corpus has sparser category labels).
//!
//! The embedded index is cached on disk keyed by the SHA-256 of the source
//! file, so restarts skip the embedding pass unless the file changed.
//! A missing or empty source file fails construction: the caller is expected
//! to run with auto-reply disabled in that case.

pub mod cache;
pub mod embedding;
pub mod index;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Language;
use embedding::Embedder;
use index::FlatIndex;

const KEYWORD_BOOST: f32 = 0.05;
const KEYWORD_BOOST_CAP: f32 = 0.15;
const CATEGORY_PENALTY_RU: f32 = 0.10;
const CATEGORY_PENALTY_KK: f32 = 0.05;
/// Over-retrieve factor: language filtering happens after the vector search,
/// so we pull k·5 raw candidates to keep k survivors likely.
const OVERFETCH: usize = 5;

/// Metadata carried alongside each index row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub response_id: String,
    pub category: String,
    pub language: Language,
    pub keywords: Vec<String>,
    pub text: String,
}

/// One ranked lookup result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub response_id: String,
    pub text: String,
    pub category: String,
    pub language: Language,
    pub keywords: Vec<String>,
    pub similarity: f32,
}

#[derive(Debug, Deserialize)]
struct SourceFile {
    #[serde(default)]
    responses: Vec<SourceResponse>,
}

/// A row of the content file: one logical response with per-language texts.
#[derive(Debug, Deserialize)]
struct SourceResponse {
    id: IdRepr,
    #[serde(default)]
    category: String,
    #[serde(default)]
    keywords: Vec<String>,
    ru: Option<String>,
    kz: Option<String>,
}

/// The content file mixes numeric and string ids across revisions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Num(i64),
    Str(String),
}

impl std::fmt::Display for IdRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdRepr::Num(n) => write!(f, "{n}"),
            IdRepr::Str(s) => f.write_str(s),
        }
    }
}

/// Immutable after construction; share via `Arc` and search from any thread.
pub struct ResponseBank {
    embedder: Box<dyn Embedder>,
    index: FlatIndex,
    meta: Vec<EntryMeta>,
}

impl ResponseBank {
    /// Load the content file, reusing the disk cache when the file hash
    /// matches, otherwise embedding from scratch and refreshing the cache.
    pub fn load(
        path: &Path,
        cache_dir: &Path,
        embedder: Box<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading response bank {}", path.display()))?;
        let source: SourceFile =
            serde_json::from_slice(&bytes).context("parsing response bank JSON")?;
        let entries = flatten(source);
        anyhow::ensure!(!entries.is_empty(), "response bank contains no responses");

        let hash = cache::content_hash(&bytes);
        if let Some((index, meta)) = cache::load(cache_dir, &hash) {
            if index.dims() == embedder.dimensions() && meta.len() == entries.len() {
                info!(rows = index.len(), "response index loaded from cache");
                return Ok(Self { embedder, index, meta });
            }
        }

        let bank = Self::from_entries(entries, embedder)?;
        if let Err(e) = cache::store(cache_dir, &hash, &bank.index, &bank.meta) {
            warn!(error = %e, "failed to write response index cache — continuing without it");
        }
        info!(rows = bank.index.len(), "response index built");
        Ok(bank)
    }

    /// Build directly from entries (no file, no cache). Used by the loader
    /// and by tests.
    pub fn from_entries(
        entries: Vec<EntryMeta>,
        embedder: Box<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!entries.is_empty(), "response bank contains no responses");
        let mut index = FlatIndex::new(embedder.dimensions());
        for entry in &entries {
            index.push(embedder.embed(&entry.text));
        }
        Ok(Self { embedder, index, meta: entries })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Ranked top-k lookup.
    ///
    /// `language` drops rows in other languages; `category` only reorders
    /// (mismatching candidates are penalized, never excluded).
    pub fn search(
        &self,
        query: &str,
        language: Option<Language>,
        category: Option<&str>,
        k: usize,
    ) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }
        let query_vec = self.embedder.embed(query);
        let fetch = (k * OVERFETCH).min(self.index.len());
        let query_lower = query.to_lowercase();

        let mut hits: Vec<SearchHit> = self
            .index
            .search(&query_vec, fetch)
            .into_iter()
            .filter_map(|(row, similarity)| {
                let meta = &self.meta[row];
                if let Some(lang) = language {
                    if meta.language != lang {
                        return None;
                    }
                }
                Some(SearchHit {
                    response_id: meta.response_id.clone(),
                    text: meta.text.clone(),
                    category: meta.category.clone(),
                    language: meta.language,
                    keywords: meta.keywords.clone(),
                    similarity: adjust(similarity, meta, &query_lower, category),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

fn adjust(similarity: f32, meta: &EntryMeta, query_lower: &str, category: Option<&str>) -> f32 {
    let mut adjusted = similarity;

    let matches = meta
        .keywords
        .iter()
        .filter(|kw| !kw.is_empty() && query_lower.contains(&kw.to_lowercase()))
        .count();
    if matches > 0 {
        adjusted += (matches as f32 * KEYWORD_BOOST).min(KEYWORD_BOOST_CAP);
    }

    if let Some(cat) = category {
        if !cat.is_empty() && meta.category != cat {
            adjusted -= match meta.language {
                Language::Kk => CATEGORY_PENALTY_KK,
                _ => CATEGORY_PENALTY_RU,
            };
        }
    }

    adjusted
}

fn flatten(source: SourceFile) -> Vec<EntryMeta> {
    let mut entries = Vec::new();
    for resp in source.responses {
        let id = resp.id.to_string();
        if let Some(text) = resp.ru.filter(|t| !t.trim().is_empty()) {
            entries.push(EntryMeta {
                response_id: id.clone(),
                category: resp.category.clone(),
                language: Language::Ru,
                keywords: resp.keywords.clone(),
                text,
            });
        }
        if let Some(text) = resp.kz.filter(|t| !t.trim().is_empty()) {
            entries.push(EntryMeta {
                response_id: id.clone(),
                category: resp.category.clone(),
                language: Language::Kk,
                keywords: resp.keywords.clone(),
                text,
            });
        }
    }
    entries
}
