//! The authorization decision procedure.
//!
//! A presented secret is matched against stored hashes by a linear
//! scan with one expensive Argon2 comparison per candidate. That scan
//! is intentional: secrets are never stored in plaintext or under a
//! fast hash, so there is no lookup key to index by, and adding one
//! would hand attackers a timing or offline-cracking side channel.
//!
//! Every path fails closed. A store failure, malformed id, or missing
//! record is indistinguishable from a wrong secret.

use crate::events::{AccessEvent, EventBus};
use crate::secret::SecretCodec;
use crate::store::{CapabilityStore, ShareScope};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Shortest secret worth hashing. A cheap filter against junk input,
/// not a security boundary.
const MIN_SECRET_LEN: usize = 10;

/// The grant a verified secret confers. Computed per call, never
/// persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Owner { workspace_id: Uuid },
    Share { workspace_id: Uuid, scope: ShareScope },
}

impl AccessDecision {
    pub fn workspace_id(&self) -> Uuid {
        match self {
            AccessDecision::Owner { workspace_id }
            | AccessDecision::Share { workspace_id, .. } => *workspace_id,
        }
    }
}

pub struct AccessEngine {
    store: Arc<dyn CapabilityStore>,
    codec: Arc<SecretCodec>,
    events: EventBus,
}

impl AccessEngine {
    pub fn new(store: Arc<dyn CapabilityStore>, codec: Arc<SecretCodec>, events: EventBus) -> Self {
        Self {
            store,
            codec,
            events,
        }
    }

    /// Run one Argon2 comparison on the blocking pool. Hashing is
    /// CPU-bound and must not stall the request path or be shortcut.
    async fn check(&self, secret: &str, hash: String) -> bool {
        let codec = self.codec.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || codec.verify(&secret, &hash))
            .await
            .unwrap_or(false)
    }

    /// Match a secret against every live capability in the system.
    ///
    /// Owner hashes are tried first, then active shares; the first
    /// match wins. `None` carries no cause: unknown, revoked and
    /// malformed secrets all deny identically.
    pub async fn verify_global(&self, secret: &str) -> Option<AccessDecision> {
        if secret.len() < MIN_SECRET_LEN {
            warn!("rejected secret below minimum plausible length");
            return None;
        }

        let owners = self.store.list_owner_hashes().await.ok()?;
        for (workspace_id, hash) in owners {
            if self.check(secret, hash).await {
                info!(%workspace_id, "owner access granted");
                self.events.send(AccessEvent::OwnerGranted { workspace_id });
                return Some(AccessDecision::Owner { workspace_id });
            }
        }

        let shares = self.store.list_active_shares(None).await.ok()?;
        for share in shares {
            if self.check(secret, share.secret_hash.clone()).await {
                info!(workspace_id = %share.workspace_id, scope = ?share.scope, "share access granted");
                self.events.send(AccessEvent::ShareGranted {
                    workspace_id: share.workspace_id,
                    scope: share.scope,
                });
                return Some(AccessDecision::Share {
                    workspace_id: share.workspace_id,
                    scope: share.scope,
                });
            }
        }

        warn!("secret matched no live capability");
        self.events.send(AccessEvent::Denied);
        None
    }

    /// Fast path: verify a secret against one workspace's owner hash
    /// only. Any lookup failure is `false`.
    pub async fn verify_owner(&self, secret: &str, workspace_id: Uuid) -> bool {
        let hash = match self.store.find_owner_hash(workspace_id).await {
            Ok(Some(hash)) => hash,
            _ => return false,
        };
        self.check(secret, hash).await
    }

    /// Does this secret grant access to `document_id` inside
    /// `workspace_id`?
    ///
    /// The owner secret always does. A share secret does when it
    /// carries either a scope for the whole workspace or a scope for
    /// exactly this document. A `Document` scope for any other
    /// document denies, same workspace or not.
    pub async fn verify_scoped_access(
        &self,
        secret: &str,
        document_id: Uuid,
        workspace_id: Uuid,
    ) -> bool {
        if self.verify_owner(secret, workspace_id).await {
            return true;
        }

        let shares = match self.store.list_active_shares(Some(workspace_id)).await {
            Ok(shares) => shares,
            Err(_) => return false,
        };
        for share in shares {
            let in_scope = match share.scope {
                ShareScope::Workspace(id) => id == workspace_id,
                ShareScope::Document(id) => id == document_id,
            };
            if in_scope && self.check(secret, share.secret_hash.clone()).await {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::ShareLifecycle;
    use crate::store::FsStore;
    use chrono::Utc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<FsStore>,
        engine: AccessEngine,
        shares: ShareLifecycle,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsStore::open(dir.path()).unwrap());
        let codec = Arc::new(SecretCodec::new());
        let events = EventBus::new();
        let engine = AccessEngine::new(store.clone(), codec.clone(), events.clone());
        let shares = ShareLifecycle::new(store.clone(), store.clone(), codec, events);
        Fixture {
            _dir: dir,
            store,
            engine,
            shares,
        }
    }

    async fn seed_workspace(fx: &Fixture, name: &str) -> (Uuid, String) {
        let codec = SecretCodec::new();
        let secret = codec.generate();
        let ws = crate::store::Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_secret_hash: codec.hash(&secret).unwrap(),
            created_at: Utc::now(),
        };
        fx.store.insert_workspace(ws.clone()).await.unwrap();
        (ws.id, secret)
    }

    async fn seed_document(fx: &Fixture, workspace_id: Uuid) -> Uuid {
        let doc = crate::store::StoredDocument {
            id: Uuid::new_v4(),
            workspace_id,
            original_name: "file.txt".into(),
            storage_name: format!("{}.txt", Uuid::new_v4()),
            mime_type: "text/plain".into(),
            size: 4,
            created_at: Utc::now(),
        };
        fx.store.insert_document(doc.clone()).await.unwrap();
        doc.id
    }

    #[tokio::test]
    async fn owner_secret_resolves_globally() {
        let fx = fixture();
        let (ws, secret) = seed_workspace(&fx, "mine").await;

        let decision = fx.engine.verify_global(&secret).await.unwrap();
        assert_eq!(decision, AccessDecision::Owner { workspace_id: ws });
        assert!(fx.engine.verify_owner(&secret, ws).await);
    }

    #[tokio::test]
    async fn short_or_unknown_secrets_deny() {
        let fx = fixture();
        let (ws, _) = seed_workspace(&fx, "mine").await;

        assert!(fx.engine.verify_global("").await.is_none());
        assert!(fx.engine.verify_global("short").await.is_none());
        assert!(fx
            .engine
            .verify_global("plausible-length-but-wrong-secret")
            .await
            .is_none());
        assert!(!fx.engine.verify_owner("wrong-secret", ws).await);
        assert!(!fx.engine.verify_owner("wrong-secret", Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn share_secret_resolves_to_its_scope() {
        let fx = fixture();
        let (ws, _) = seed_workspace(&fx, "mine").await;
        let doc = seed_document(&fx, ws).await;

        let (share, secret) = fx
            .shares
            .create(ws, ShareScope::Document(doc), None)
            .await
            .unwrap();

        let decision = fx.engine.verify_global(&secret).await.unwrap();
        assert_eq!(
            decision,
            AccessDecision::Share {
                workspace_id: ws,
                scope: ShareScope::Document(doc),
            }
        );
        assert_eq!(share.scope, ShareScope::Document(doc));
    }

    #[tokio::test]
    async fn document_scope_is_exact_match() {
        let fx = fixture();
        let (ws, _) = seed_workspace(&fx, "mine").await;
        let doc_a = seed_document(&fx, ws).await;
        let doc_b = seed_document(&fx, ws).await;

        let (_, secret) = fx
            .shares
            .create(ws, ShareScope::Document(doc_a), None)
            .await
            .unwrap();

        assert!(fx.engine.verify_scoped_access(&secret, doc_a, ws).await);
        // A sibling document in the same workspace is out of scope.
        assert!(!fx.engine.verify_scoped_access(&secret, doc_b, ws).await);
    }

    #[tokio::test]
    async fn workspace_scope_covers_every_document() {
        let fx = fixture();
        let (ws, _) = seed_workspace(&fx, "mine").await;
        let doc_a = seed_document(&fx, ws).await;
        let doc_b = seed_document(&fx, ws).await;

        let (_, secret) = fx
            .shares
            .create(ws, ShareScope::Workspace(ws), None)
            .await
            .unwrap();

        assert!(fx.engine.verify_scoped_access(&secret, doc_a, ws).await);
        assert!(fx.engine.verify_scoped_access(&secret, doc_b, ws).await);
    }

    #[tokio::test]
    async fn owner_secret_passes_scoped_access() {
        let fx = fixture();
        let (ws, owner_secret) = seed_workspace(&fx, "mine").await;
        let doc = seed_document(&fx, ws).await;

        assert!(fx.engine.verify_scoped_access(&owner_secret, doc, ws).await);
    }

    #[tokio::test]
    async fn foreign_workspace_share_does_not_leak_across() {
        let fx = fixture();
        let (ws_a, _) = seed_workspace(&fx, "a").await;
        let (ws_b, _) = seed_workspace(&fx, "b").await;
        let doc_b = seed_document(&fx, ws_b).await;

        let (_, secret) = fx
            .shares
            .create(ws_a, ShareScope::Workspace(ws_a), None)
            .await
            .unwrap();

        assert!(!fx.engine.verify_scoped_access(&secret, doc_b, ws_b).await);
    }

    #[tokio::test]
    async fn revoked_share_denies_everywhere() {
        let fx = fixture();
        let (ws, _) = seed_workspace(&fx, "mine").await;
        let doc = seed_document(&fx, ws).await;

        let (share, secret) = fx
            .shares
            .create(ws, ShareScope::Document(doc), None)
            .await
            .unwrap();
        assert!(fx.engine.verify_scoped_access(&secret, doc, ws).await);

        assert!(fx.shares.revoke(share.id).await.unwrap());
        assert!(fx.engine.verify_global(&secret).await.is_none());
        assert!(!fx.engine.verify_scoped_access(&secret, doc, ws).await);
    }
}
