//! Share capability lifecycle: create, list, revoke, regenerate,
//! delete.
//!
//! Regeneration is revoke-old then create-new with the identical
//! scope. The ordering is the correctness guarantee in a store without
//! multi-record transactions: if the second write never happens, the
//! old capability is already inert, which is the safe failure state.

use crate::events::{AccessEvent, EventBus};
use crate::secret::SecretCodec;
use crate::store::{CapabilityStore, DocumentResolver, ShareCapability, ShareScope};
use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct ShareLifecycle {
    store: Arc<dyn CapabilityStore>,
    resolver: Arc<dyn DocumentResolver>,
    codec: Arc<SecretCodec>,
    events: EventBus,
}

impl ShareLifecycle {
    pub fn new(
        store: Arc<dyn CapabilityStore>,
        resolver: Arc<dyn DocumentResolver>,
        codec: Arc<SecretCodec>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            resolver,
            codec,
            events,
        }
    }

    async fn mint_hash(&self) -> Result<(String, String)> {
        let secret = self.codec.generate();
        let codec = self.codec.clone();
        let plaintext = secret.clone();
        let hash = tokio::task::spawn_blocking(move || codec.hash(&plaintext)).await??;
        Ok((secret, hash))
    }

    /// Create a share capability for `scope` inside `workspace_id`.
    ///
    /// The scope is validated here even when the caller already did: a
    /// `Workspace` scope must name this workspace and a `Document`
    /// scope must name a document that belongs to it. Returns the
    /// stored record together with the one-time plaintext secret,
    /// which is never retrievable again.
    pub async fn create(
        &self,
        workspace_id: Uuid,
        scope: ShareScope,
        label: Option<String>,
    ) -> Result<(ShareCapability, String)> {
        match scope {
            ShareScope::Workspace(id) if id != workspace_id => {
                bail!("workspace scope does not match the owning workspace")
            }
            ShareScope::Document(document_id) => {
                if !self
                    .resolver
                    .document_in_workspace(document_id, workspace_id)
                    .await?
                {
                    bail!("scoped document does not belong to the workspace")
                }
            }
            ShareScope::Workspace(_) => {}
        }

        let (secret, hash) = self.mint_hash().await?;
        let share = self
            .store
            .create_share(workspace_id, scope, hash, label)
            .await?;
        info!(id = %share.id, scope = ?share.scope, "share created");
        self.events.send(AccessEvent::ShareCreated {
            id: share.id,
            workspace_id,
        });
        Ok((share, secret))
    }

    /// All shares for a workspace, newest first, revoked ones tagged.
    pub async fn list(&self, workspace_id: Uuid) -> Result<Vec<ShareCapability>> {
        self.store.list_shares(workspace_id).await
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<ShareCapability>> {
        self.store.find_share(id).await
    }

    /// Permanently deactivate a share. `false` when it is missing or
    /// already revoked; a store failure is a hard error, never a
    /// silent no-op.
    pub async fn revoke(&self, id: Uuid) -> Result<bool> {
        let revoked = self.store.mark_revoked(id).await?;
        if revoked {
            info!(%id, "share revoked");
            self.events.send(AccessEvent::ShareRevoked { id });
        }
        Ok(revoked)
    }

    /// Replace a share with a fresh capability of identical scope and
    /// label. The old secret is durably revoked before the new
    /// plaintext is handed back, so no verify call that starts after
    /// this returns can succeed with the old secret. `None` when the
    /// share does not exist.
    pub async fn regenerate(&self, id: Uuid) -> Result<Option<(ShareCapability, String)>> {
        let Some(old) = self.store.find_share(id).await? else {
            return Ok(None);
        };

        // Revoke first; a regenerated-from-revoked share still yields
        // a fresh active capability, matching the owner's intent.
        self.store.mark_revoked(id).await?;

        let (secret, hash) = self.mint_hash().await?;
        let share = self
            .store
            .create_share(old.workspace_id, old.scope, hash, old.label.clone())
            .await?;
        info!(old_id = %id, new_id = %share.id, "share regenerated");
        self.events.send(AccessEvent::ShareRegenerated {
            old_id: id,
            new_id: share.id,
        });
        Ok(Some((share, secret)))
    }

    /// Hard-delete a share row.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.store.delete_share(id).await
    }
}
