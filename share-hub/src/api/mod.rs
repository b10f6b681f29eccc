//! HTTP API layer over the authorization engine and workspace
//! services.
//!
//! Every denial renders identically — `403 {"error":"Access denied."}`
//! — whether the secret is missing, wrong, revoked, or the target id
//! is malformed or unknown. No handler hands out a reason.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, Response, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use share_hub_core::{
    access::{AccessDecision, AccessEngine},
    activity::{ActivityService, RequestMeta},
    documents::{file_category, DocumentService, FileCategory},
    share::ShareLifecycle,
    store::{ActorKind, ShareCapability, ShareScope, StoredDocument},
    workspace::WorkspaceService,
};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AccessEngine>,
    pub shares: Arc<ShareLifecycle>,
    pub workspaces: Arc<WorkspaceService>,
    pub documents: Arc<DocumentService>,
    pub activity: Arc<ActivityService>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn denied() -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            error: "Access denied.".to_string(),
        }),
    )
}

fn bad_request(msg: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
}

fn not_found(msg: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
}

fn internal() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "Internal error.".to_string(),
        }),
    )
}

/// Malformed ids deny exactly like wrong secrets.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| denied())
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    RequestMeta::new(
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok()),
        None,
        headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()),
    )
}

/// Secret presented with a download-style GET: query parameter,
/// `X-Share-Secret` header, or bearer token.
fn secret_from_request(query: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(secret) = query.filter(|s| !s.is_empty()) {
        return Some(secret.to_string());
    }
    if let Some(secret) = headers.get("x-share-secret").and_then(|v| v.to_str().ok()) {
        return Some(secret.to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

fn parse_scope(scope_type: &str, scope_id: Uuid) -> Option<ShareScope> {
    match scope_type {
        "WORKSPACE" => Some(ShareScope::Workspace(scope_id)),
        "DOCUMENT" => Some(ShareScope::Document(scope_id)),
        _ => None,
    }
}

#[derive(Deserialize)]
struct CreateWorkspaceRequest {
    name: String,
}

#[derive(Serialize)]
struct CreateWorkspaceResponse {
    workspace_id: Uuid,
    owner_secret: String,
    message: String,
}

#[derive(Deserialize)]
struct SecretRequest {
    secret: String,
}

#[derive(Serialize)]
struct AccessResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    workspace_id: Uuid,
    #[serde(flatten)]
    scope: Option<ShareScope>,
}

#[derive(Deserialize)]
struct CreateShareRequest {
    secret: String,
    workspace_id: Uuid,
    scope_type: String,
    scope_id: Uuid,
    label: Option<String>,
}

#[derive(Serialize)]
struct CreateShareResponse {
    share_id: Uuid,
    secret: String,
    #[serde(flatten)]
    scope: ShareScope,
    message: String,
}

#[derive(Deserialize)]
struct ListSharesParams {
    workspace_id: Uuid,
    secret: String,
}

#[derive(Deserialize)]
struct ShareActionRequest {
    secret: String,
    workspace_id: Uuid,
}

/// Share row as exposed to the owner. The secret hash never leaves the
/// store.
#[derive(Serialize)]
struct ShareView {
    id: Uuid,
    workspace_id: Uuid,
    #[serde(flatten)]
    scope: ShareScope,
    label: Option<String>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<ShareCapability> for ShareView {
    fn from(share: ShareCapability) -> Self {
        Self {
            id: share.id,
            workspace_id: share.workspace_id,
            scope: share.scope,
            label: share.label,
            created_at: share.created_at,
            revoked_at: share.revoked_at,
        }
    }
}

#[derive(Serialize)]
struct DocumentView {
    id: Uuid,
    workspace_id: Uuid,
    original_name: String,
    mime_type: String,
    size: u64,
    created_at: DateTime<Utc>,
}

impl From<StoredDocument> for DocumentView {
    fn from(doc: StoredDocument) -> Self {
        Self {
            id: doc.id,
            workspace_id: doc.workspace_id,
            original_name: doc.original_name,
            mime_type: doc.mime_type,
            size: doc.size,
            created_at: doc.created_at,
        }
    }
}

#[derive(Deserialize)]
struct SecretQuery {
    secret: Option<String>,
}

#[derive(Deserialize)]
struct RenameRequest {
    secret: String,
    name: String,
}

#[derive(Deserialize)]
struct ActivityParams {
    secret: String,
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/workspaces", post(create_workspace))
        .route("/api/workspaces/{id}", delete(delete_workspace))
        .route("/api/access", post(verify_access))
        .route("/api/shares", post(create_share).get(list_shares))
        .route("/api/shares/{id}/regenerate", post(regenerate_share))
        .route("/api/shares/{id}", delete(revoke_share))
        .route(
            "/api/workspaces/{id}/documents",
            post(upload_documents)
                .get(list_documents)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/documents/{id}", get(download_document).delete(delete_document))
        .route("/api/documents/{id}/info", get(document_info))
        .route("/api/documents/{id}/rename", put(rename_document))
        .route("/api/workspaces/{id}/activity", get(list_activity))
        .with_state(state)
}

async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<CreateWorkspaceResponse>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(bad_request("Workspace name is required."));
    }
    let (workspace, owner_secret) = state
        .workspaces
        .create(name)
        .await
        .map_err(|_| internal())?;
    Ok((
        StatusCode::CREATED,
        Json(CreateWorkspaceResponse {
            workspace_id: workspace.id,
            owner_secret,
            message: "Workspace created. Copy your owner secret now; it cannot be shown again."
                .to_string(),
        }),
    ))
}

async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SecretRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    if !state.engine.verify_owner(&req.secret, id).await {
        return Err(denied());
    }
    let deleted = state.workspaces.delete(id).await.map_err(|_| internal())?;
    if !deleted {
        return Err(not_found("Workspace not found."));
    }
    Ok(Json(serde_json::json!({ "message": "Workspace deleted." })))
}

async fn verify_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SecretRequest>,
) -> Result<Json<AccessResponse>, ApiError> {
    let Some(decision) = state.engine.verify_global(&req.secret).await else {
        return Err(denied());
    };
    let meta = request_meta(&headers);
    let (response, actor) = match decision {
        AccessDecision::Owner { workspace_id } => (
            AccessResponse {
                kind: "owner",
                workspace_id,
                scope: None,
            },
            ActorKind::Owner,
        ),
        AccessDecision::Share {
            workspace_id,
            scope,
        } => (
            AccessResponse {
                kind: "share",
                workspace_id,
                scope: Some(scope),
            },
            ActorKind::Share,
        ),
    };
    state
        .activity
        .log_workspace_access(decision.workspace_id(), actor, &meta)
        .await;
    Ok(Json(response))
}

async fn create_share(
    State(state): State<AppState>,
    Json(req): Json<CreateShareRequest>,
) -> Result<(StatusCode, Json<CreateShareResponse>), ApiError> {
    if !state
        .engine
        .verify_owner(&req.secret, req.workspace_id)
        .await
    {
        return Err(denied());
    }
    let Some(scope) = parse_scope(&req.scope_type, req.scope_id) else {
        return Err(bad_request("Invalid scope type."));
    };
    if let ShareScope::Document(document_id) = scope {
        let belongs = state
            .documents
            .find(document_id)
            .await
            .map_or(false, |d| d.workspace_id == req.workspace_id);
        if !belongs {
            return Err(bad_request("Document does not belong to this workspace."));
        }
    }
    if let ShareScope::Workspace(id) = scope {
        if id != req.workspace_id {
            return Err(bad_request("Scope does not match this workspace."));
        }
    }
    let (share, secret) = state
        .shares
        .create(req.workspace_id, scope, req.label)
        .await
        .map_err(|_| internal())?;
    Ok((
        StatusCode::CREATED,
        Json(CreateShareResponse {
            share_id: share.id,
            secret,
            scope: share.scope,
            message: "Share secret created. Copy it now.".to_string(),
        }),
    ))
}

async fn list_shares(
    State(state): State<AppState>,
    Query(params): Query<ListSharesParams>,
) -> Result<Json<Vec<ShareView>>, ApiError> {
    if !state
        .engine
        .verify_owner(&params.secret, params.workspace_id)
        .await
    {
        return Err(denied());
    }
    let shares = state
        .shares
        .list(params.workspace_id)
        .await
        .map_err(|_| internal())?;
    Ok(Json(shares.into_iter().map(ShareView::from).collect()))
}

async fn regenerate_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ShareActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    if !state
        .engine
        .verify_owner(&req.secret, req.workspace_id)
        .await
    {
        return Err(denied());
    }
    let Some((share, secret)) = state.shares.regenerate(id).await.map_err(|_| internal())? else {
        return Err(not_found("Share not found."));
    };
    Ok(Json(serde_json::json!({
        "share_id": share.id,
        "secret": secret,
        "message": "New secret generated. The old one is invalidated.",
    })))
}

async fn revoke_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ShareActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    if !state
        .engine
        .verify_owner(&req.secret, req.workspace_id)
        .await
    {
        return Err(denied());
    }
    let revoked = state.shares.revoke(id).await.map_err(|_| internal())?;
    if !revoked {
        return Err(not_found("Share not found."));
    }
    Ok(Json(serde_json::json!({ "message": "Share secret revoked." })))
}

async fn upload_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SecretQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<DocumentView>>), ApiError> {
    let workspace_id = parse_id(&id)?;
    let Some(secret) = query.secret else {
        return Err(denied());
    };
    if !state.engine.verify_owner(&secret, workspace_id).await {
        return Err(denied());
    }

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("Malformed upload."))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "unnamed".to_string());
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|_| bad_request("Malformed upload."))?;
        let doc = state
            .documents
            .upload(workspace_id, &original_name, &mime_type, &bytes)
            .await
            .map_err(|_| internal())?;
        uploaded.push(DocumentView::from(doc));
    }
    if uploaded.is_empty() {
        return Err(bad_request("No file provided."));
    }
    Ok((StatusCode::CREATED, Json(uploaded)))
}

async fn list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Json<Vec<DocumentView>>, ApiError> {
    let workspace_id = parse_id(&id)?;
    let Some(secret) = secret_from_request(query.secret.as_deref(), &headers) else {
        return Err(denied());
    };
    if !has_workspace_access(&state, &secret, workspace_id).await {
        return Err(denied());
    }
    let docs = state.documents.list(workspace_id).await;
    Ok(Json(docs.into_iter().map(DocumentView::from).collect()))
}

/// Owner access or any share whose workspace matches. A document-scoped
/// share can still list its workspace: reaching a shared document
/// starts from the workspace listing.
async fn has_workspace_access(state: &AppState, secret: &str, workspace_id: Uuid) -> bool {
    if state.engine.verify_owner(secret, workspace_id).await {
        return true;
    }
    matches!(
        state.engine.verify_global(secret).await,
        Some(decision) if decision.workspace_id() == workspace_id
    )
}

async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Response<Body>, ApiError> {
    let id = parse_id(&id)?;
    let Some(secret) = secret_from_request(query.secret.as_deref(), &headers) else {
        return Err(denied());
    };
    let Some(doc) = state.documents.find(id).await else {
        return Err(denied());
    };
    let is_owner = state.engine.verify_owner(&secret, doc.workspace_id).await;
    if !is_owner
        && !state
            .engine
            .verify_scoped_access(&secret, id, doc.workspace_id)
            .await
    {
        return Err(denied());
    }

    let bytes = state
        .documents
        .read_bytes(&doc)
        .await
        .map_err(|_| not_found("Stored file not found."))?;

    let actor = if is_owner {
        ActorKind::Owner
    } else {
        ActorKind::Share
    };
    let meta = request_meta(&headers);
    state
        .activity
        .log_file_download(doc.workspace_id, doc.id, &doc.original_name, actor, &meta)
        .await;

    let disposition = match file_category(&doc.mime_type) {
        FileCategory::Binary => "attachment",
        _ => "inline",
    };
    Response::builder()
        .header(
            header::CONTENT_DISPOSITION,
            format!("{disposition}; filename=\"{}\"", doc.original_name),
        )
        .header(header::CONTENT_TYPE, doc.mime_type)
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|_| internal())
}

async fn document_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Json<DocumentView>, ApiError> {
    let id = parse_id(&id)?;
    let Some(secret) = secret_from_request(query.secret.as_deref(), &headers) else {
        return Err(denied());
    };
    let Some(doc) = state.documents.find(id).await else {
        return Err(denied());
    };
    let is_owner = state.engine.verify_owner(&secret, doc.workspace_id).await;
    if !is_owner
        && !state
            .engine
            .verify_scoped_access(&secret, id, doc.workspace_id)
            .await
    {
        return Err(denied());
    }
    let actor = if is_owner {
        ActorKind::Owner
    } else {
        ActorKind::Share
    };
    let meta = request_meta(&headers);
    state
        .activity
        .log_file_view(doc.workspace_id, doc.id, &doc.original_name, actor, &meta)
        .await;
    Ok(Json(DocumentView::from(doc)))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SecretRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    let Some(doc) = state.documents.find(id).await else {
        return Err(denied());
    };
    if !state
        .engine
        .verify_owner(&req.secret, doc.workspace_id)
        .await
    {
        return Err(denied());
    }
    state.documents.delete(id).await.map_err(|_| internal())?;
    Ok(Json(serde_json::json!({ "message": "Document deleted." })))
}

async fn rename_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<DocumentView>, ApiError> {
    let id = parse_id(&id)?;
    if req.name.trim().is_empty() {
        return Err(bad_request("Invalid name."));
    }
    let Some(doc) = state.documents.find(id).await else {
        return Err(denied());
    };
    if !state
        .engine
        .verify_owner(&req.secret, doc.workspace_id)
        .await
    {
        return Err(denied());
    }
    let renamed = state
        .documents
        .rename(id, req.name.trim())
        .await
        .map_err(|_| internal())?
        .ok_or_else(|| not_found("Document not found."))?;
    Ok(Json(DocumentView::from(renamed)))
}

async fn list_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<Vec<share_hub_core::store::ActivityEntry>>, ApiError> {
    let workspace_id = parse_id(&id)?;
    if !state
        .engine
        .verify_owner(&params.secret, workspace_id)
        .await
    {
        return Err(denied());
    }
    Ok(Json(state.activity.list(workspace_id, params.limit).await))
}
