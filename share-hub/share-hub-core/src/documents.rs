//! Uploaded file storage: metadata rows in the store, bytes on disk
//! under the upload directory named by a fresh UUID plus the original
//! extension, so user-supplied names never touch the filesystem.

use crate::store::{FsStore, StoredDocument};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 255;

/// Rendering category for a mime type, used to pick the download
/// disposition (inline vs attachment).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Pdf,
    Text,
    Binary,
}

pub fn file_category(mime_type: &str) -> FileCategory {
    if mime_type.starts_with("image/") {
        FileCategory::Image
    } else if mime_type == "application/pdf" {
        FileCategory::Pdf
    } else if mime_type.starts_with("text/")
        || mime_type == "application/json"
        || mime_type == "application/xml"
    {
        FileCategory::Text
    } else {
        FileCategory::Binary
    }
}

/// Sanitize a user-supplied filename: drop path separators, control
/// characters and shell metacharacters, collapse dot runs, trim
/// leading dots, clamp the length.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => out.push('_'),
            c if (c as u32) < 0x20 => out.push('_'),
            c => out.push(c),
        }
    }
    let mut collapsed = String::with_capacity(out.len());
    let mut prev_dot = false;
    for c in out.chars() {
        if c == '.' {
            if !prev_dot {
                collapsed.push('.');
            }
            prev_dot = true;
        } else {
            collapsed.push(c);
            prev_dot = false;
        }
    }
    let trimmed = collapsed.trim_start_matches('.').trim();
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

pub struct DocumentService {
    store: Arc<FsStore>,
    upload_dir: PathBuf,
}

impl DocumentService {
    pub fn new(store: Arc<FsStore>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            upload_dir: upload_dir.into(),
        }
    }

    fn file_path(&self, storage_name: &str) -> PathBuf {
        self.upload_dir.join(storage_name)
    }

    /// Store uploaded bytes and record the document's metadata.
    pub async fn upload(
        &self,
        workspace_id: Uuid,
        original_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<StoredDocument> {
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .context("creating upload directory")?;
        let sanitized = sanitize_filename(original_name);
        let ext = Path::new(&sanitized)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let storage_name = format!("{}{ext}", Uuid::new_v4());
        tokio::fs::write(self.file_path(&storage_name), bytes)
            .await
            .context("writing uploaded file")?;

        let doc = StoredDocument {
            id: Uuid::new_v4(),
            workspace_id,
            original_name: sanitized,
            storage_name,
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            created_at: Utc::now(),
        };
        self.store.insert_document(doc.clone()).await?;
        info!(id = %doc.id, %workspace_id, "document uploaded");
        Ok(doc)
    }

    pub async fn list(&self, workspace_id: Uuid) -> Vec<StoredDocument> {
        self.store.list_documents(workspace_id).await
    }

    pub async fn find(&self, id: Uuid) -> Option<StoredDocument> {
        self.store.find_document(id).await
    }

    pub async fn read_bytes(&self, doc: &StoredDocument) -> Result<Vec<u8>> {
        tokio::fs::read(self.file_path(&doc.storage_name))
            .await
            .with_context(|| format!("reading stored file for document {}", doc.id))
    }

    pub async fn rename(&self, id: Uuid, new_name: &str) -> Result<Option<StoredDocument>> {
        let sanitized = sanitize_filename(new_name);
        let renamed = self.store.rename_document(id, sanitized).await?;
        if let Some(doc) = &renamed {
            info!(id = %doc.id, name = %doc.original_name, "document renamed");
        }
        Ok(renamed)
    }

    /// Delete a document record and its stored file. `false` when the
    /// document does not exist.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some(doc) = self.store.delete_document(id).await? else {
            return Ok(false);
        };
        let path = self.file_path(&doc.storage_name);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("removing stored file for document {id}"))?;
        }
        info!(%id, "document deleted");
        Ok(true)
    }

    /// Remove every document of a workspace, files included. Used by
    /// the workspace cascade.
    pub async fn delete_for_workspace(&self, workspace_id: Uuid) -> Result<usize> {
        let removed = self
            .store
            .delete_documents_for_workspace(workspace_id)
            .await?;
        for doc in &removed {
            let path = self.file_path(&doc.storage_name);
            if path.exists() {
                tokio::fs::remove_file(&path)
                    .await
                    .with_context(|| format!("removing stored file for document {}", doc.id))?;
            }
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> DocumentService {
        let store = Arc::new(FsStore::open(dir.path().join("data")).unwrap());
        DocumentService::new(store, dir.path().join("uploads"))
    }

    #[test]
    fn sanitize_strips_traversal_and_control_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_filename("..hidden"), "hidden");
        assert_eq!(sanitize_filename("a<b>c:d.txt"), "a_b_c_d.txt");
        assert_eq!(sanitize_filename("normal-name.pdf"), "normal-name.pdf");
        assert_eq!(sanitize_filename("null\u{0}byte.txt"), "null_byte.txt");
        assert!(sanitize_filename(&"x".repeat(400)).len() <= MAX_NAME_LEN);
    }

    #[test]
    fn categories_pick_inline_or_attachment() {
        assert_eq!(file_category("image/png"), FileCategory::Image);
        assert_eq!(file_category("application/pdf"), FileCategory::Pdf);
        assert_eq!(file_category("text/plain"), FileCategory::Text);
        assert_eq!(file_category("application/json"), FileCategory::Text);
        assert_eq!(file_category("application/zip"), FileCategory::Binary);
    }

    #[tokio::test]
    async fn upload_and_read_back() {
        let dir = TempDir::new().unwrap();
        let docs = service(&dir);
        let ws = Uuid::new_v4();

        let doc = docs
            .upload(ws, "rapport final.pdf", "application/pdf", b"%PDF-1.4")
            .await
            .unwrap();
        assert_eq!(doc.original_name, "rapport final.pdf");
        assert!(doc.storage_name.ends_with(".pdf"));
        assert_ne!(doc.storage_name, doc.original_name);
        assert_eq!(doc.size, 8);

        let bytes = docs.read_bytes(&doc).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let listed = docs.list(ws).await;
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_file_and_record() {
        let dir = TempDir::new().unwrap();
        let docs = service(&dir);
        let ws = Uuid::new_v4();

        let doc = docs.upload(ws, "tmp.txt", "text/plain", b"x").await.unwrap();
        let path = dir.path().join("uploads").join(&doc.storage_name);
        assert!(path.exists());

        assert!(docs.delete(doc.id).await.unwrap());
        assert!(!path.exists());
        assert!(docs.find(doc.id).await.is_none());
        assert!(!docs.delete(doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn rename_sanitizes_the_new_name() {
        let dir = TempDir::new().unwrap();
        let docs = service(&dir);
        let ws = Uuid::new_v4();

        let doc = docs.upload(ws, "old.txt", "text/plain", b"x").await.unwrap();
        let renamed = docs
            .rename(doc.id, "../sneaky/name.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.original_name, "_sneaky_name.txt");
        assert!(docs.rename(Uuid::new_v4(), "x").await.unwrap().is_none());
    }
}
