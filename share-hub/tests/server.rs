use axum::{routing::get, Router};
use share_hub::api::{self, AppState};
use share_hub_core::{
    access::AccessEngine, activity::ActivityService, documents::DocumentService, events::EventBus,
    secret::SecretCodec, share::ShareLifecycle, store::FsStore, workspace::WorkspaceService,
};
use std::future::IntoFuture;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::util::ServiceExt;

fn build_app(dir: &TempDir) -> Router {
    let store = Arc::new(FsStore::open(dir.path().join("data")).unwrap());
    let codec = Arc::new(SecretCodec::new());
    let events = EventBus::new();
    let engine = Arc::new(AccessEngine::new(
        store.clone(),
        codec.clone(),
        events.clone(),
    ));
    let documents = Arc::new(DocumentService::new(
        store.clone(),
        dir.path().join("uploads"),
    ));
    let workspaces = Arc::new(WorkspaceService::new(
        store.clone(),
        codec.clone(),
        documents.clone(),
    ));
    let shares = Arc::new(ShareLifecycle::new(
        store.clone(),
        store.clone(),
        codec,
        events,
    ));
    let activity = Arc::new(ActivityService::new(store));
    let state = AppState {
        engine,
        shares,
        workspaces,
        documents,
        activity,
    };
    Router::new()
        .merge(api::router(state))
        .route("/health", get(|| async { "OK" }))
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let app = build_app(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service())
                .into_future()
                .await;
        });
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn create_workspace(&self, name: &str) -> (String, String) {
        let resp = self
            .client
            .post(self.url("/api/workspaces"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = resp.json().await.unwrap();
        (
            body["workspace_id"].as_str().unwrap().to_string(),
            body["owner_secret"].as_str().unwrap().to_string(),
        )
    }

    async fn upload(&self, workspace_id: &str, secret: &str, name: &str, bytes: &[u8]) -> String {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(name.to_string())
            .mime_str("text/plain")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(self.url(&format!(
                "/api/workspaces/{workspace_id}/documents?secret={secret}"
            )))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = resp.json().await.unwrap();
        body[0]["id"].as_str().unwrap().to_string()
    }

    async fn create_share(
        &self,
        workspace_id: &str,
        owner_secret: &str,
        scope_type: &str,
        scope_id: &str,
    ) -> (String, String) {
        let resp = self
            .client
            .post(self.url("/api/shares"))
            .json(&serde_json::json!({
                "secret": owner_secret,
                "workspace_id": workspace_id,
                "scope_type": scope_type,
                "scope_id": scope_id,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: serde_json::Value = resp.json().await.unwrap();
        (
            body["share_id"].as_str().unwrap().to_string(),
            body["secret"].as_str().unwrap().to_string(),
        )
    }

    async fn download_status(&self, document_id: &str, secret: &str) -> reqwest::StatusCode {
        self.client
            .get(self.url(&format!("/api/documents/{document_id}?secret={secret}")))
            .send()
            .await
            .unwrap()
            .status()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_endpoint_responds() {
    let server = TestServer::start().await;
    let resp = reqwest::get(server.url("/health")).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn owner_secret_grants_and_wrong_secret_denies() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("projet alpha").await;

    let resp = server
        .client
        .post(server.url("/api/access"))
        .json(&serde_json::json!({ "secret": owner_secret }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "owner");
    assert_eq!(body["workspace_id"].as_str().unwrap(), ws);

    let resp = server
        .client
        .post(server.url("/api/access"))
        .json(&serde_json::json!({ "secret": "definitely-not-the-owner-secret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn document_share_scenario_end_to_end() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("dossier").await;
    let doc = server.upload(&ws, &owner_secret, "one.txt", b"first").await;
    let other_doc = server.upload(&ws, &owner_secret, "two.txt", b"second").await;

    // Document-scoped share: exact-match only.
    let (share_id, s1) = server.create_share(&ws, &owner_secret, "DOCUMENT", &doc).await;
    assert_eq!(
        server.download_status(&doc, &s1).await,
        reqwest::StatusCode::OK
    );
    assert_eq!(
        server.download_status(&other_doc, &s1).await,
        reqwest::StatusCode::FORBIDDEN
    );

    // Regenerate: new secret works, old one is dead, identity changed.
    let resp = server
        .client
        .post(server.url(&format!("/api/shares/{share_id}/regenerate")))
        .json(&serde_json::json!({ "secret": owner_secret, "workspace_id": ws }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    let new_share_id = body["share_id"].as_str().unwrap().to_string();
    let s2 = body["secret"].as_str().unwrap().to_string();
    assert_ne!(new_share_id, share_id);
    assert_ne!(s2, s1);
    assert_eq!(
        server.download_status(&doc, &s2).await,
        reqwest::StatusCode::OK
    );
    assert_eq!(
        server.download_status(&doc, &s1).await,
        reqwest::StatusCode::FORBIDDEN
    );

    // Revoke the regenerated share: nothing verifies any more.
    let resp = server
        .client
        .delete(server.url(&format!("/api/shares/{new_share_id}")))
        .json(&serde_json::json!({ "secret": owner_secret, "workspace_id": ws }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        server.download_status(&doc, &s1).await,
        reqwest::StatusCode::FORBIDDEN
    );
    assert_eq!(
        server.download_status(&doc, &s2).await,
        reqwest::StatusCode::FORBIDDEN
    );

    // The owner always keeps access.
    assert_eq!(
        server.download_status(&doc, &owner_secret).await,
        reqwest::StatusCode::OK
    );
}

#[tokio::test]
async fn workspace_share_covers_every_document() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("equipe").await;
    let a = server.upload(&ws, &owner_secret, "a.txt", b"a").await;
    let b = server.upload(&ws, &owner_secret, "b.txt", b"b").await;

    let (_, secret) = server.create_share(&ws, &owner_secret, "WORKSPACE", &ws).await;
    assert_eq!(
        server.download_status(&a, &secret).await,
        reqwest::StatusCode::OK
    );
    assert_eq!(
        server.download_status(&b, &secret).await,
        reqwest::StatusCode::OK
    );

    // The share grants access but not ownership: it cannot mint shares.
    let resp = server
        .client
        .post(server.url("/api/shares"))
        .json(&serde_json::json!({
            "secret": secret,
            "workspace_id": ws,
            "scope_type": "WORKSPACE",
            "scope_id": ws,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_scope_type_is_a_bad_request() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("ws").await;
    let resp = server
        .client
        .post(server.url("/api/shares"))
        .json(&serde_json::json!({
            "secret": owner_secret,
            "workspace_id": ws,
            "scope_type": "EVERYTHING",
            "scope_id": ws,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn share_listing_never_exposes_hashes() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("ws").await;
    let (share_id, _) = server.create_share(&ws, &owner_secret, "WORKSPACE", &ws).await;

    let resp = server
        .client
        .get(server.url(&format!(
            "/api/shares?workspace_id={ws}&secret={owner_secret}"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let text = resp.text().await.unwrap();
    assert!(text.contains(&share_id));
    assert!(!text.contains("secret_hash"));
    assert!(!text.contains("$argon2"));
}

#[tokio::test]
async fn workspace_delete_cascades() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("doomed").await;
    let doc = server.upload(&ws, &owner_secret, "f.txt", b"x").await;
    let (_, share_secret) = server.create_share(&ws, &owner_secret, "WORKSPACE", &ws).await;

    let resp = server
        .client
        .delete(server.url(&format!("/api/workspaces/{ws}")))
        .json(&serde_json::json!({ "secret": owner_secret }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    assert_eq!(
        server.download_status(&doc, &share_secret).await,
        reqwest::StatusCode::FORBIDDEN
    );
    assert_eq!(
        server.download_status(&doc, &owner_secret).await,
        reqwest::StatusCode::FORBIDDEN
    );
    let resp = server
        .client
        .post(server.url("/api/access"))
        .json(&serde_json::json!({ "secret": owner_secret }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn every_denial_renders_identically() {
    let dir = TempDir::new().unwrap();
    let app = build_app(&dir);

    let mut bodies = Vec::new();
    for payload in [
        serde_json::json!({ "secret": "" }),
        serde_json::json!({ "secret": "short" }),
        serde_json::json!({ "secret": "a-long-but-completely-unknown-secret-value" }),
    ] {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/api/access")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(payload.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        bodies.push(String::from_utf8(bytes.to_vec()).unwrap());
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    assert!(bodies[0].contains("Access denied."));
}

#[tokio::test]
async fn activity_log_is_owner_only_and_records_events() {
    let server = TestServer::start().await;
    let (ws, owner_secret) = server.create_workspace("journal").await;
    let doc = server.upload(&ws, &owner_secret, "f.txt", b"x").await;
    let (_, share_secret) = server.create_share(&ws, &owner_secret, "WORKSPACE", &ws).await;

    // A share-holder download and an access check both leave entries.
    assert_eq!(
        server.download_status(&doc, &share_secret).await,
        reqwest::StatusCode::OK
    );
    server
        .client
        .post(server.url("/api/access"))
        .json(&serde_json::json!({ "secret": share_secret }))
        .send()
        .await
        .unwrap();

    let resp = server
        .client
        .get(server.url(&format!(
            "/api/workspaces/{ws}/activity?secret={owner_secret}"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let entries: serde_json::Value = resp.json().await.unwrap();
    let entries = entries.as_array().unwrap();
    assert!(entries.iter().any(|e| e["kind"] == "FILE_DOWNLOAD"));
    assert!(entries.iter().any(|e| e["kind"] == "WORKSPACE_ACCESS"));

    // The share secret cannot read the log.
    let resp = server
        .client
        .get(server.url(&format!(
            "/api/workspaces/{ws}/activity?secret={share_secret}"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}
