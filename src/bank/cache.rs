//! On-disk cache for the response-bank index.
//!
//! Two files per cache directory: `index.bin` (raw vectors) and
//! `metadata.json` (entry metadata plus the SHA-256 of the source file the
//! index was built from). On startup the cache is used only when the stored
//! hash matches the current source file; anything else triggers a rebuild.
//! Writes go through a temp file and a rename, so a crashed process can
//! never leave a half-written cache that would pass the hash check.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::index::FlatIndex;
use super::EntryMeta;

const INDEX_FILE: &str = "index.bin";
const META_FILE: &str = "metadata.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    source_hash: String,
    dims: usize,
    entries: Vec<EntryMeta>,
}

/// SHA-256 hex digest of a byte buffer (the response-bank source file).
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Load a cached index if one exists and was built from `expected_hash`.
///
/// Any corruption or mismatch is treated as a miss: the caller rebuilds.
pub fn load(dir: &Path, expected_hash: &str) -> Option<(FlatIndex, Vec<EntryMeta>)> {
    let meta_bytes = fs::read(dir.join(META_FILE)).ok()?;
    let meta: CacheMeta = serde_json::from_slice(&meta_bytes).ok()?;
    if meta.source_hash != expected_hash {
        return None;
    }

    let index_bytes = fs::read(dir.join(INDEX_FILE)).ok()?;
    let rows = decode_rows(&index_bytes, meta.dims)?;
    if rows.len() != meta.entries.len() {
        return None;
    }

    let index = FlatIndex::from_rows(meta.dims, rows).ok()?;
    Some((index, meta.entries))
}

/// Persist the index atomically: temp file + rename per artifact.
pub fn store(
    dir: &Path,
    source_hash: &str,
    index: &FlatIndex,
    entries: &[EntryMeta],
) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let meta = CacheMeta {
        source_hash: source_hash.to_string(),
        dims: index.dims(),
        entries: entries.to_vec(),
    };
    write_atomic(&dir.join(META_FILE), &serde_json::to_vec(&meta)?)?;
    write_atomic(&dir.join(INDEX_FILE), &encode_rows(index.rows()))?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

fn encode_rows(rows: &[Vec<f32>]) -> Vec<u8> {
    let per_row = rows.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(8 + rows.len() * per_row * 4);
    out.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    out.extend_from_slice(&(per_row as u32).to_le_bytes());
    for row in rows {
        for value in row {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

fn decode_rows(bytes: &[u8], expected_dims: usize) -> Option<Vec<Vec<f32>>> {
    if bytes.len() < 8 {
        return None;
    }
    let rows = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
    let dims = u32::from_le_bytes(bytes[4..8].try_into().ok()?) as usize;
    if rows > 0 && dims != expected_dims {
        return None;
    }
    let payload = &bytes[8..];
    if payload.len() != rows * dims * 4 {
        return None;
    }

    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(dims);
        for d in 0..dims {
            let off = (r * dims + d) * 4;
            row.push(f32::from_le_bytes(payload[off..off + 4].try_into().ok()?));
        }
        out.push(row);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;

    fn sample_entries() -> Vec<EntryMeta> {
        vec![
            EntryMeta {
                response_id: "1".into(),
                category: "Billing".into(),
                language: Language::Ru,
                keywords: vec!["оплата".into()],
                text: "Оплатить можно в личном кабинете.".into(),
            },
            EntryMeta {
                response_id: "1".into(),
                category: "Billing".into(),
                language: Language::Kk,
                keywords: vec!["төлем".into()],
                text: "Жеке кабинетте төлеуге болады.".into(),
            },
        ]
    }

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(4);
        index.push(vec![1.0, 0.0, 0.0, 0.0]);
        index.push(vec![0.0, 1.0, 0.0, 0.0]);
        index
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        let entries = sample_entries();

        store(dir.path(), "abc123", &index, &entries).unwrap();
        let (loaded, loaded_entries) = load(dir.path(), "abc123").expect("cache should hit");

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dims(), 4);
        assert_eq!(loaded.rows(), index.rows());
        assert_eq!(loaded_entries.len(), entries.len());
        assert_eq!(loaded_entries[1].language, Language::Kk);
    }

    #[test]
    fn load_misses_on_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path(), "old-hash", &sample_index(), &sample_entries()).unwrap();
        assert!(load(dir.path(), "new-hash").is_none());
    }

    #[test]
    fn load_misses_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path(), "whatever").is_none());
    }

    #[test]
    fn load_misses_on_truncated_index_file() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path(), "h", &sample_index(), &sample_entries()).unwrap();
        // Chop the index file: the row count no longer matches the payload.
        let path = dir.path().join(INDEX_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(load(dir.path(), "h").is_none());
    }

    #[test]
    fn content_hash_is_stable_and_input_sensitive() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }
}
