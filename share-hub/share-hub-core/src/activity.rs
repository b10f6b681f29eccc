//! Workspace activity log: who (owner or share bearer) accessed what,
//! from where. Recording never blocks or fails the operation it
//! describes; persistence errors are logged and swallowed.

use crate::store::{ActivityEntry, ActivityKind, ActorKind, FsStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 500;
const MAX_LIMIT: usize = 5000;
const MAX_IP_LEN: usize = 120;
const MAX_USER_AGENT_LEN: usize = 1024;
const MAX_DOCUMENT_NAME_LEN: usize = 1024;

/// Request metadata attached to every entry, clamped so a hostile
/// client cannot bloat the log.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: String,
}

impl RequestMeta {
    /// Build from the forwarded-for chain (first hop wins) or the peer
    /// address, and the user-agent header.
    pub fn new(forwarded_for: Option<&str>, peer_ip: Option<&str>, user_agent: Option<&str>) -> Self {
        let raw_ip = forwarded_for
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(peer_ip)
            .unwrap_or("unknown");
        let ip = raw_ip.strip_prefix("::ffff:").unwrap_or(raw_ip);
        Self {
            ip: ip.chars().take(MAX_IP_LEN).collect(),
            user_agent: user_agent
                .unwrap_or("unknown")
                .chars()
                .take(MAX_USER_AGENT_LEN)
                .collect(),
        }
    }
}

pub struct ActivityService {
    store: Arc<FsStore>,
}

impl ActivityService {
    pub fn new(store: Arc<FsStore>) -> Self {
        Self { store }
    }

    pub async fn log_workspace_access(&self, workspace_id: Uuid, actor: ActorKind, meta: &RequestMeta) {
        self.record(workspace_id, ActivityKind::WorkspaceAccess, actor, None, None, meta)
            .await;
    }

    pub async fn log_file_view(
        &self,
        workspace_id: Uuid,
        document_id: Uuid,
        document_name: &str,
        actor: ActorKind,
        meta: &RequestMeta,
    ) {
        self.record(
            workspace_id,
            ActivityKind::FileView,
            actor,
            Some(document_id),
            Some(document_name),
            meta,
        )
        .await;
    }

    pub async fn log_file_download(
        &self,
        workspace_id: Uuid,
        document_id: Uuid,
        document_name: &str,
        actor: ActorKind,
        meta: &RequestMeta,
    ) {
        self.record(
            workspace_id,
            ActivityKind::FileDownload,
            actor,
            Some(document_id),
            Some(document_name),
            meta,
        )
        .await;
    }

    pub async fn list(&self, workspace_id: Uuid, limit: Option<usize>) -> Vec<ActivityEntry> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        self.store.list_activity(workspace_id, limit).await
    }

    async fn record(
        &self,
        workspace_id: Uuid,
        kind: ActivityKind,
        actor: ActorKind,
        document_id: Option<Uuid>,
        document_name: Option<&str>,
        meta: &RequestMeta,
    ) {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            workspace_id,
            kind,
            actor,
            document_id,
            document_name: document_name
                .map(|n| n.chars().take(MAX_DOCUMENT_NAME_LEN).collect()),
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.append_activity(entry).await {
            warn!(%workspace_id, ?kind, "failed to persist activity entry: {err:#}");
        }
    }
}
