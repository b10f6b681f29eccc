//! Workspace creation and deletion.
//!
//! The owner capability is minted once, at creation, and is immutable:
//! it cannot be revoked or regenerated, and only the hash is kept.

use crate::documents::DocumentService;
use crate::secret::SecretCodec;
use crate::store::{CapabilityStore, FsStore, Workspace};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct WorkspaceService {
    store: Arc<FsStore>,
    codec: Arc<SecretCodec>,
    documents: Arc<DocumentService>,
}

impl WorkspaceService {
    pub fn new(store: Arc<FsStore>, codec: Arc<SecretCodec>, documents: Arc<DocumentService>) -> Self {
        Self {
            store,
            codec,
            documents,
        }
    }

    /// Create a workspace, returning it with the one-time owner
    /// secret. The plaintext is never stored and never shown again.
    pub async fn create(&self, name: &str) -> Result<(Workspace, String)> {
        let secret = self.codec.generate();
        let codec = self.codec.clone();
        let plaintext = secret.clone();
        let hash = tokio::task::spawn_blocking(move || codec.hash(&plaintext)).await??;

        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_secret_hash: hash,
            created_at: Utc::now(),
        };
        self.store.insert_workspace(workspace.clone()).await?;
        info!(id = %workspace.id, "workspace created");
        Ok((workspace, secret))
    }

    pub async fn find(&self, id: Uuid) -> Option<Workspace> {
        self.store.find_workspace(id).await
    }

    /// Delete a workspace and everything it owns: share capabilities,
    /// documents (including their on-disk files) and activity entries.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        if self.store.find_workspace(id).await.is_none() {
            return Ok(false);
        }
        self.store.delete_shares_for_workspace(id).await?;
        self.documents.delete_for_workspace(id).await?;
        self.store.delete_activity_for_workspace(id).await?;
        let removed = self.store.delete_workspace(id).await?;
        if removed {
            info!(%id, "workspace deleted");
        }
        Ok(removed)
    }
}
