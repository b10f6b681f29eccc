//! Persistent store for workspaces, share capabilities, documents and
//! activity. Records are kept in memory and mirrored to disk, one JSON
//! file per record under the data directory, loaded at startup.
//!
//! The access engine and share lifecycle consume the [`CapabilityStore`]
//! and [`DocumentResolver`] traits rather than the concrete store, so
//! tests can substitute their own implementations.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use uuid::Uuid;


const WORKSPACES_DIR: &str = "workspaces";
const SHARES_DIR: &str = "shares";
const DOCUMENTS_DIR: &str = "documents";
const ACTIVITY_DIR: &str = "activity";

/// A shared file workspace. The owner capability lives here as a hash
/// only; the plaintext is shown to the creator exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner_secret_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Target a share capability authorizes: a whole workspace or a single
/// document inside it. Scope matching is exact, except that a
/// `Workspace` scope covers every document the workspace contains.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "scope_type",
    content = "scope_id",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum ShareScope {
    Workspace(Uuid),
    Document(Uuid),
}

impl ShareScope {
    pub fn target(&self) -> Uuid {
        match self {
            ShareScope::Workspace(id) | ShareScope::Document(id) => *id,
        }
    }
}

/// A revocable, regenerable bearer capability scoped to a workspace or
/// one of its documents. A non-null `revoked_at` is terminal: the row
/// never satisfies a verification again.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShareCapability {
    pub id: Uuid,
    pub workspace_id: Uuid,
    #[serde(flatten)]
    pub scope: ShareScope,
    pub secret_hash: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ShareCapability {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Metadata for an uploaded file. Bytes live on disk under the upload
/// directory as `storage_name`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub original_name: String,
    pub storage_name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    WorkspaceAccess,
    FileView,
    FileDownload,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Owner,
    Share,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub kind: ActivityKind,
    pub actor: ActorKind,
    pub document_id: Option<Uuid>,
    pub document_name: Option<String>,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Capability persistence as consumed by the access engine and the
/// share lifecycle. Read methods answering "is this usable" only ever
/// return non-revoked rows; `list_shares` keeps revoked rows for the
/// owner's listing, tagged by `revoked_at`.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    async fn list_owner_hashes(&self) -> Result<Vec<(Uuid, String)>>;
    async fn find_owner_hash(&self, workspace_id: Uuid) -> Result<Option<String>>;
    async fn list_active_shares(&self, workspace_id: Option<Uuid>)
        -> Result<Vec<ShareCapability>>;
    async fn list_shares(&self, workspace_id: Uuid) -> Result<Vec<ShareCapability>>;
    async fn find_share(&self, id: Uuid) -> Result<Option<ShareCapability>>;
    async fn create_share(
        &self,
        workspace_id: Uuid,
        scope: ShareScope,
        secret_hash: String,
        label: Option<String>,
    ) -> Result<ShareCapability>;
    /// Set the revocation timestamp. `false` when the share is missing
    /// or already revoked; the write is durable before this returns.
    async fn mark_revoked(&self, id: Uuid) -> Result<bool>;
    async fn delete_share(&self, id: Uuid) -> Result<bool>;
    async fn delete_shares_for_workspace(&self, workspace_id: Uuid) -> Result<()>;
}

/// Resolves whether a document belongs to a workspace. Used only for
/// scope validation when creating a share.
#[async_trait]
pub trait DocumentResolver: Send + Sync {
    async fn document_in_workspace(&self, document_id: Uuid, workspace_id: Uuid) -> Result<bool>;
}

#[derive(Default)]
struct Collections {
    workspaces: HashMap<Uuid, Workspace>,
    shares: HashMap<Uuid, ShareCapability>,
    documents: HashMap<Uuid, StoredDocument>,
    activity: HashMap<Uuid, ActivityEntry>,
}

/// File-backed store: in-memory maps behind a `RwLock`, one JSON file
/// per record. Listings clone rows out of the lock, so callers never
/// hold it across expensive hash comparisons.
pub struct FsStore {
    base: PathBuf,
    inner: RwLock<Collections>,
}

impl FsStore {
    /// Open (or initialize) a store rooted at `base`, loading every
    /// persisted record into memory.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        for dir in [WORKSPACES_DIR, SHARES_DIR, DOCUMENTS_DIR, ACTIVITY_DIR] {
            std::fs::create_dir_all(base.join(dir))
                .with_context(|| format!("creating store directory {dir}"))?;
        }
        let mut cols = Collections::default();
        for ws in load_dir::<Workspace>(&base.join(WORKSPACES_DIR))? {
            cols.workspaces.insert(ws.id, ws);
        }
        for share in load_dir::<ShareCapability>(&base.join(SHARES_DIR))? {
            cols.shares.insert(share.id, share);
        }
        for doc in load_dir::<StoredDocument>(&base.join(DOCUMENTS_DIR))? {
            cols.documents.insert(doc.id, doc);
        }
        for entry in load_dir::<ActivityEntry>(&base.join(ACTIVITY_DIR))? {
            cols.activity.insert(entry.id, entry);
        }
        Ok(Self {
            base,
            inner: RwLock::new(cols),
        })
    }

    fn record_path(&self, dir: &str, id: Uuid) -> PathBuf {
        self.base.join(dir).join(format!("{id}.json"))
    }

    /// Write a record via a temp file and rename, so a crash mid-write
    /// leaves either the old record or the new one, never a torn file.
    fn persist<T: Serialize>(&self, dir: &str, id: Uuid, record: &T) -> Result<()> {
        let path = self.record_path(dir, id);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(record)?;
        std::fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("persisting {}", path.display()))?;
        Ok(())
    }

    fn remove_file(&self, dir: &str, id: Uuid) -> Result<()> {
        let path = self.record_path(dir, id);
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    // Workspaces

    pub async fn insert_workspace(&self, workspace: Workspace) -> Result<()> {
        self.persist(WORKSPACES_DIR, workspace.id, &workspace)?;
        self.inner
            .write()
            .await
            .workspaces
            .insert(workspace.id, workspace);
        Ok(())
    }

    pub async fn find_workspace(&self, id: Uuid) -> Option<Workspace> {
        self.inner.read().await.workspaces.get(&id).cloned()
    }

    pub async fn delete_workspace(&self, id: Uuid) -> Result<bool> {
        let removed = self.inner.write().await.workspaces.remove(&id).is_some();
        if removed {
            self.remove_file(WORKSPACES_DIR, id)?;
        }
        Ok(removed)
    }

    // Documents

    pub async fn insert_document(&self, doc: StoredDocument) -> Result<()> {
        self.persist(DOCUMENTS_DIR, doc.id, &doc)?;
        self.inner.write().await.documents.insert(doc.id, doc);
        Ok(())
    }

    pub async fn find_document(&self, id: Uuid) -> Option<StoredDocument> {
        self.inner.read().await.documents.get(&id).cloned()
    }

    pub async fn list_documents(&self, workspace_id: Uuid) -> Vec<StoredDocument> {
        let inner = self.inner.read().await;
        let mut docs: Vec<_> = inner
            .documents
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }

    pub async fn rename_document(&self, id: Uuid, name: String) -> Result<Option<StoredDocument>> {
        let mut inner = self.inner.write().await;
        let Some(doc) = inner.documents.get_mut(&id) else {
            return Ok(None);
        };
        doc.original_name = name;
        let updated = doc.clone();
        drop(inner);
        self.persist(DOCUMENTS_DIR, id, &updated)?;
        Ok(Some(updated))
    }

    /// Remove a document record, returning it so the caller can unlink
    /// the stored file.
    pub async fn delete_document(&self, id: Uuid) -> Result<Option<StoredDocument>> {
        let removed = self.inner.write().await.documents.remove(&id);
        if removed.is_some() {
            self.remove_file(DOCUMENTS_DIR, id)?;
        }
        Ok(removed)
    }

    pub async fn delete_documents_for_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<StoredDocument>> {
        let mut inner = self.inner.write().await;
        let ids: Vec<Uuid> = inner
            .documents
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .map(|d| d.id)
            .collect();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = inner.documents.remove(&id) {
                removed.push(doc);
            }
        }
        drop(inner);
        for doc in &removed {
            self.remove_file(DOCUMENTS_DIR, doc.id)?;
        }
        Ok(removed)
    }

    // Activity

    pub async fn append_activity(&self, entry: ActivityEntry) -> Result<()> {
        self.persist(ACTIVITY_DIR, entry.id, &entry)?;
        self.inner.write().await.activity.insert(entry.id, entry);
        Ok(())
    }

    pub async fn list_activity(&self, workspace_id: Uuid, limit: usize) -> Vec<ActivityEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<_> = inner
            .activity
            .values()
            .filter(|e| e.workspace_id == workspace_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        entries
    }

    pub async fn delete_activity_for_workspace(&self, workspace_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let ids: Vec<Uuid> = inner
            .activity
            .values()
            .filter(|e| e.workspace_id == workspace_id)
            .map(|e| e.id)
            .collect();
        for id in &ids {
            inner.activity.remove(id);
        }
        drop(inner);
        for id in ids {
            self.remove_file(ACTIVITY_DIR, id)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityStore for FsStore {
    async fn list_owner_hashes(&self) -> Result<Vec<(Uuid, String)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .workspaces
            .values()
            .map(|w| (w.id, w.owner_secret_hash.clone()))
            .collect())
    }

    async fn find_owner_hash(&self, workspace_id: Uuid) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .workspaces
            .get(&workspace_id)
            .map(|w| w.owner_secret_hash.clone()))
    }

    async fn list_active_shares(
        &self,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<ShareCapability>> {
        let inner = self.inner.read().await;
        Ok(inner
            .shares
            .values()
            .filter(|s| s.is_active())
            .filter(|s| workspace_id.map_or(true, |id| s.workspace_id == id))
            .cloned()
            .collect())
    }

    async fn list_shares(&self, workspace_id: Uuid) -> Result<Vec<ShareCapability>> {
        let inner = self.inner.read().await;
        let mut shares: Vec<_> = inner
            .shares
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect();
        shares.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shares)
    }

    async fn find_share(&self, id: Uuid) -> Result<Option<ShareCapability>> {
        Ok(self.inner.read().await.shares.get(&id).cloned())
    }

    async fn create_share(
        &self,
        workspace_id: Uuid,
        scope: ShareScope,
        secret_hash: String,
        label: Option<String>,
    ) -> Result<ShareCapability> {
        let share = ShareCapability {
            id: Uuid::new_v4(),
            workspace_id,
            scope,
            secret_hash,
            label,
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.persist(SHARES_DIR, share.id, &share)?;
        self.inner.write().await.shares.insert(share.id, share.clone());
        Ok(share)
    }

    async fn mark_revoked(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(share) = inner.shares.get_mut(&id) else {
            return Ok(false);
        };
        if share.revoked_at.is_some() {
            return Ok(false);
        }
        share.revoked_at = Some(Utc::now());
        let updated = share.clone();
        drop(inner);
        self.persist(SHARES_DIR, id, &updated)?;
        Ok(true)
    }

    async fn delete_share(&self, id: Uuid) -> Result<bool> {
        let removed = self.inner.write().await.shares.remove(&id).is_some();
        if removed {
            self.remove_file(SHARES_DIR, id)?;
        }
        Ok(removed)
    }

    async fn delete_shares_for_workspace(&self, workspace_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let ids: Vec<Uuid> = inner
            .shares
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            inner.shares.remove(id);
        }
        drop(inner);
        for id in ids {
            self.remove_file(SHARES_DIR, id)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentResolver for FsStore {
    async fn document_in_workspace(&self, document_id: Uuid, workspace_id: Uuid) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(&document_id)
            .map_or(false, |d| d.workspace_id == workspace_id))
    }
}

fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let data = std::fs::read(&path)?;
        let record = serde_json::from_slice(&data)
            .map_err(|e| anyhow!("corrupt record {}: {e}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}
