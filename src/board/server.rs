use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use super::api::{self, AppState};
use super::db::{BoardDb, DbHandle};
use super::ws;
use crate::agent::ClaudeRunner;
use crate::approval::GhCliExecutor;
use crate::clock::SystemClock;
use crate::config::OverseerConfig;

/// Build the full application router: REST API plus the `/ws` endpoint.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let app = api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Open the database and assemble the production collaborators.
pub fn build_state(config: &OverseerConfig, data_dir: &Path) -> Result<AppState> {
    let db_path = config.db_path(data_dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = BoardDb::new(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    Ok(AppState::new(
        DbHandle::new(db),
        Arc::new(GhCliExecutor::default()),
        ClaudeRunner::new(config.agent.clone()),
        Arc::new(SystemClock),
        config.approval.default_timeout_minutes,
    ))
}

/// Start the HTTP/WebSocket server and run until Ctrl+C.
pub async fn start_server(config: &OverseerConfig, data_dir: &Path) -> Result<()> {
    let state = Arc::new(build_state(config, data_dir)?);
    let app = build_router(state, config.server.dev_mode);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, dev_mode = config.server.dev_mode, "overseer listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(dev_mode: bool) -> Router {
        let state = AppState::new(
            DbHandle::in_memory().unwrap(),
            Arc::new(GhCliExecutor::default()),
            ClaudeRunner::new(Default::default()),
            Arc::new(SystemClock),
            60,
        );
        build_router(Arc::new(state), dev_mode)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_create_project_via_full_router() {
        let app = test_router(false);
        let req = Request::builder()
            .method("POST")
            .uri("/api/projects")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"name": "server-test", "path": "/tmp/server-test"}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let project: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(project["name"], "server-test");
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let app = test_router(false);
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_dev_mode_enables_cors() {
        let app = test_router(true);
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn test_build_state_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = OverseerConfig::default();
        build_state(&config, dir.path()).unwrap();
        assert!(config.db_path(dir.path()).exists());
    }
}
