//! Object store surface and evidence-key parsing
//!
//! The storage collaborator is reached only through the [`ObjectStore`]
//! trait; the service owns a filesystem-backed implementation rooted at the
//! data directory, injected into the orchestrator and merger rather than
//! accessed as global state.

use async_trait::async_trait;
use rangecoach_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::ViewLabel;

/// Abstract bucket-shaped object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List object keys under a prefix, e.g. `"<subject>/<session>/"`
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Read one object fully into memory
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Write (or overwrite) one object
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Download an object to a scratch file, preserving the key's extension so
/// downstream media sniffing still works. The caller removes the file.
pub async fn fetch_to_temp(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<PathBuf> {
    let bytes = store.fetch(bucket, key).await?;
    let extension = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let path = std::env::temp_dir().join(format!(
        "rangecoach_evidence_{}.{}",
        uuid::Uuid::new_v4(),
        extension
    ));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Filesystem-backed object store; buckets are subdirectories of the root
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.object_path(bucket, prefix.trim_end_matches('/'));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Storage(format!("list {}: {}", dir.display(), e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("list {}: {}", dir.display(), e)))?
        {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                let name = entry.file_name().to_string_lossy().into_owned();
                keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("fetch {}/{}: {}", bucket, key, e)))
    }

    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("put {}/{}: {}", bucket, key, e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Storage(format!("put {}/{}: {}", bucket, key, e)))
    }
}

/// Parsed evidence object key:
/// `"<subject>/<session>/<model>_<view>.<ext>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceKey {
    pub subject_id: String,
    pub session_id: String,
    pub model_id: String,
    pub view: ViewLabel,
    pub extension: String,
}

/// Parse a storage object key; malformed keys yield `None` and are ignored
/// before any core processing happens.
pub fn parse_evidence_key(key: &str) -> Option<EvidenceKey> {
    let decoded = percent_decode(key);
    let mut parts = decoded.split('/');
    let (subject, session, filename) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    if subject.is_empty() || session.is_empty() {
        return None;
    }

    let (stem, extension) = filename.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    let (model, view_name) = stem.split_once('_')?;
    if model.is_empty() {
        return None;
    }
    let view = ViewLabel::from_str(view_name).ok()?;

    Some(EvidenceKey {
        subject_id: subject.to_string(),
        session_id: session.to_string(),
        model_id: model.to_string(),
        view,
        extension: extension.to_string(),
    })
}

/// Key of the persisted per-view result document
pub fn result_document_key(subject_id: &str, session_id: &str, view: ViewLabel) -> String {
    format!("{}/{}/detailed_{}.json", subject_id, session_id, view)
}

/// Decode a storage-notification object key into the form objects are
/// actually addressed by
pub fn decode_object_key(key: &str) -> String {
    percent_decode(key)
}

/// Decode `%XX` escapes and `+` in storage notification keys. Invalid
/// escapes pass through untouched so a malformed key fails key parsing
/// instead of panicking here.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &input[i + 1..i + 3];
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_evidence_keys() {
        let key = parse_evidence_key("42/session-9/cx_left.mp4").unwrap();
        assert_eq!(key.subject_id, "42");
        assert_eq!(key.session_id, "session-9");
        assert_eq!(key.model_id, "cx");
        assert_eq!(key.view, ViewLabel::Left);
        assert_eq!(key.extension, "mp4");
    }

    #[test]
    fn decodes_url_escaped_keys() {
        let key = parse_evidence_key("42/session%209/cx_front.jpg").unwrap();
        assert_eq!(key.session_id, "session 9");
        assert_eq!(key.view, ViewLabel::Front);
    }

    #[test]
    fn rejects_malformed_keys() {
        // Missing view separator
        assert_eq!(parse_evidence_key("42/s-9/cxleft.mp4"), None);
        // Unknown view label
        assert_eq!(parse_evidence_key("42/s-9/cx_overhead.mp4"), None);
        // Missing extension
        assert_eq!(parse_evidence_key("42/s-9/cx_left"), None);
        // Too few path segments
        assert_eq!(parse_evidence_key("s-9/cx_left.mp4"), None);
        // Too many path segments
        assert_eq!(parse_evidence_key("a/b/c/cx_left.mp4"), None);
        // Empty model
        assert_eq!(parse_evidence_key("42/s-9/_left.mp4"), None);
    }

    #[test]
    fn result_document_key_uses_detected_view() {
        assert_eq!(
            result_document_key("42", "s-9", ViewLabel::Back),
            "42/s-9/detailed_back.json"
        );
    }

    #[tokio::test]
    async fn fs_store_round_trips_and_lists_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());

        store.put("videos", "42/s-9/cx_left.mp4", b"left").await.unwrap();
        store.put("videos", "42/s-9/cx_front.jpg", b"front").await.unwrap();
        store.put("videos", "42/other/cx_back.mp4", b"other").await.unwrap();

        let keys = store.list("videos", "42/s-9/").await.unwrap();
        assert_eq!(keys, vec!["42/s-9/cx_front.jpg", "42/s-9/cx_left.mp4"]);

        let bytes = store.fetch("videos", "42/s-9/cx_left.mp4").await.unwrap();
        assert_eq!(bytes, b"left");

        // Missing prefix lists empty, missing object errors
        assert!(store.list("videos", "42/absent/").await.unwrap().is_empty());
        assert!(store.fetch("videos", "42/s-9/missing.mp4").await.is_err());
    }
}
