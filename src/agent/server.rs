use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{self, AppState};
use super::llm::{HttpModelClient, ModelClient};
use super::sandbox::{HttpSandboxClient, SandboxClient, SandboxConfig as SandboxSettings};
use super::store::{AgentDb, StoreHandle};
use super::workflow::RunWorkflow;
use crate::config::Config;

/// Configuration for the agent server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// Skip sandbox provisioning even when a vendor URL is configured.
    pub no_sandbox: bool,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("codefab.db"),
            data_dir: PathBuf::from("generated"),
            no_sandbox: false,
            dev_mode: false,
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().with_state(state)
}

/// Start the agent server.
pub async fn start_server(config: ServerConfig, env: Config) -> Result<()> {
    // Ensure parent directory exists for DB
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;

    let db = AgentDb::new(&config.db_path).context("Failed to initialize agent database")?;
    let store = StoreHandle::new(db);

    let model: Arc<dyn ModelClient> = Arc::new(HttpModelClient::new(&env)?);
    let sandbox: Option<Arc<dyn SandboxClient>> = if config.no_sandbox {
        None
    } else {
        match &env.sandbox_api_url {
            Some(url) => {
                let settings = SandboxSettings::load(std::path::Path::new("."))?;
                Some(Arc::new(HttpSandboxClient::new(url.clone(), settings)?))
            }
            None => None,
        }
    };
    if sandbox.is_none() {
        info!("sandbox disabled, runs will skip sandbox steps");
    }

    let workflow = Arc::new(RunWorkflow::new(
        store.clone(),
        model,
        sandbox,
        config.data_dir.clone(),
    ));

    let state = Arc::new(AppState { store, workflow });
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!("codefab running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::models::RunRequest;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct EchoModel;

    #[async_trait::async_trait]
    impl ModelClient for EchoModel {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(r#"{"name": "t", "description": "d", "files": []}"#.to_string())
        }
    }

    fn test_router(data_dir: &std::path::Path) -> (Router, StoreHandle) {
        let store = StoreHandle::new(AgentDb::new_in_memory().unwrap());
        let workflow = Arc::new(RunWorkflow::new(
            store.clone(),
            Arc::new(EchoModel),
            None,
            data_dir.to_path_buf(),
        ));
        let state = Arc::new(AppState {
            store: store.clone(),
            workflow,
        });
        (build_router(state), store)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = test_router(tmp.path());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_projects_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = test_router(tmp.path());
        let req = Request::builder()
            .uri("/api/projects")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["projects"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_unknown_project_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = test_router(tmp.path());
        let req = Request::builder()
            .uri("/api/projects/no-such-id")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_invoke_returns_receipt() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = test_router(tmp.path());
        let req = Request::builder()
            .method("POST")
            .uri("/api/invoke")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"text": "build something"}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert!(body["event_id"].as_str().is_some());
        assert!(body["timestamp"].as_str().is_some());
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains(crate::agent::models::RUN_EVENT)
        );
    }

    #[tokio::test]
    async fn test_get_project_detail_includes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, store) = test_router(tmp.path());

        let project = store.call(|db| db.create_project("detail test")).await.unwrap();
        {
            let id = project.id.clone();
            store
                .call(move |db| {
                    db.create_files(
                        &id,
                        &[crate::agent::models::GeneratedFile {
                            path: "index.html".to_string(),
                            content: "<p>hi</p>".to_string(),
                            language: Some("html".to_string()),
                        }],
                    )
                })
                .await
                .unwrap();
        }

        let req = Request::builder()
            .uri(format!("/api/projects/{}", project.id))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["id"], project.id.as_str());
        assert_eq!(body["status"], "generating");
        assert_eq!(body["files"].as_array().unwrap().len(), 1);
        assert_eq!(body["files"][0]["path"], "index.html");
    }

    #[tokio::test]
    async fn test_workflow_reachable_from_state() {
        // The invoke handler spawns the run in the background; exercise the
        // same path directly so completion is observable.
        let tmp = tempfile::tempdir().unwrap();
        let store = StoreHandle::new(AgentDb::new_in_memory().unwrap());
        let workflow = RunWorkflow::new(
            store.clone(),
            Arc::new(EchoModel),
            None,
            tmp.path().to_path_buf(),
        );
        let project = workflow
            .run(RunRequest {
                value: "x".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(project.name, "t");
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("codefab.db"));
        assert_eq!(config.data_dir, PathBuf::from("generated"));
        assert!(!config.no_sandbox);
        assert!(!config.dev_mode);
    }
}
