use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::cache::InMemoryTaskCache;
use super::db::DbHandle;
use super::models::{
    ActionStatus, DependencyOutcome, DependencyType, MANUAL_TASK_ID, NewTask, ProposedAction,
    Task, TaskUpdate,
};
use super::repository::TaskRepository;
use super::ws::{WsMessage, broadcast_message};
use crate::agent::{AgentStep, ClaudeRunner, StepSink};
use crate::approval::{ActionExecutor, ApprovalQueue, MAX_TIMEOUT_MINUTES};
use crate::clock::SharedClock;
use crate::plan::{PlanAnalysis, analyze_plan};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub repo: TaskRepository,
    pub approvals: Arc<ApprovalQueue>,
    pub runner: ClaudeRunner,
    pub ws_tx: broadcast::Sender<String>,
    pub default_timeout_minutes: i64,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the repository, approval queue and runner around one database
    /// handle and one broadcast channel.
    pub fn new(
        db: DbHandle,
        executor: Arc<dyn ActionExecutor>,
        runner: ClaudeRunner,
        clock: SharedClock,
        default_timeout_minutes: i64,
    ) -> Self {
        let (ws_tx, _rx) = broadcast::channel::<String>(256);
        let repo = TaskRepository::new(db, Arc::new(InMemoryTaskCache::new()), ws_tx.clone());
        let approvals = Arc::new(ApprovalQueue::new(
            repo.clone(),
            executor,
            ws_tx.clone(),
            clock,
        ));
        Self {
            repo,
            approvals,
            runner,
            ws_tx,
            default_timeout_minutes,
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub path: String,
}

#[derive(Deserialize)]
pub struct AddDependencyRequest {
    pub depends_on_task_id: String,
    #[serde(default, rename = "type")]
    pub dependency_type: DependencyType,
}

#[derive(Deserialize)]
pub struct ListApprovalsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateApprovalRequest {
    pub action: ProposedAction,
    pub task_id: Option<String>,
    pub timeout_minutes: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct TelegramMessageRequest {
    pub message_id: i64,
}

#[derive(Deserialize)]
pub struct AgentRunRequest {
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct AnalyzePlanRequest {
    pub markdown: String,
    pub project_id: Option<i64>,
    #[serde(default)]
    pub create_tasks: bool,
}

#[derive(Serialize)]
pub struct AnalyzePlanResponse {
    pub analysis: PlanAnalysis,
    pub created_tasks: Vec<Task>,
}

#[derive(Serialize)]
pub struct TaskDependenciesResponse {
    pub dependencies: Vec<Task>,
    pub dependents: Vec<Task>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project))
        .route(
            "/api/projects/{id}/tasks",
            get(list_project_tasks).post(create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route(
            "/api/tasks/{id}/dependencies",
            get(get_task_dependencies).post(add_dependency),
        )
        .route(
            "/api/tasks/{id}/dependencies/met",
            get(check_dependencies_met),
        )
        .route(
            "/api/tasks/{id}/dependencies/{dep_id}",
            delete(remove_dependency),
        )
        .route("/api/approvals", get(list_approvals).post(create_approval))
        .route("/api/approvals/{id}", get(get_approval))
        .route("/api/approvals/{id}/approve", post(approve_action))
        .route("/api/approvals/{id}/reject", post(reject_action))
        .route(
            "/api/approvals/{id}/telegram-message",
            put(set_telegram_message),
        )
        .route("/api/agent/run", post(run_agent))
        .route("/api/plans/analyze", post(analyze_plan_handler))
        .route("/health", get(health_check))
}

// ── Handlers: projects and tasks ──────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_projects(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let projects = state.repo.list_projects().await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Project name must not be empty".into()));
    }
    let project = state.repo.create_project(req.name.trim(), &req.path).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.repo.get_project(id).await? {
        Some(project) => Ok(Json(project)),
        None => Err(ApiError::NotFound(format!("Project {} not found", id))),
    }
}

async fn list_project_tasks(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.repo.get_project(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Project {} not found", id)));
    }
    let tasks = state.repo.list_tasks_with_dependencies(id).await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    Json(req): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Task title must not be empty".into()));
    }
    match state.repo.create_task(project_id, req).await? {
        Some(task) => Ok((StatusCode::CREATED, Json(task))),
        None => Err(ApiError::NotFound(format!("Project {} not found", project_id))),
    }
}

async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.repo.get_task(&id).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError::NotFound(format!("Task {} not found", id))),
    }
}

async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<TaskUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Task title must not be empty".into()));
    }
    match state.repo.update_task(&id, req).await? {
        Some(task) => Ok(Json(task)),
        None => Err(ApiError::NotFound(format!("Task {} not found", id))),
    }
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.repo.delete_task(&id).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Task {} not found", id))),
    }
}

// ── Handlers: dependencies ────────────────────────────────────────────

async fn get_task_dependencies(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.repo.get_task(&id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Task {} not found", id)));
    }
    let dependencies = state.repo.get_dependencies(&id).await?;
    let dependents = state.repo.get_dependents(&id).await?;
    Ok(Json(TaskDependenciesResponse {
        dependencies,
        dependents,
    }))
}

async fn add_dependency(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<AddDependencyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .repo
        .add_dependency(&id, &req.depends_on_task_id, req.dependency_type)
        .await?;
    let status = if outcome.success {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

async fn remove_dependency(
    State(state): State<SharedState>,
    Path((id, dep_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = if state.repo.remove_dependency(&id, &dep_id).await? {
        DependencyOutcome::ok()
    } else {
        DependencyOutcome::failed("Dependency not found")
    };
    Ok(Json(outcome))
}

async fn check_dependencies_met(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let met = state.repo.are_dependencies_met(&id).await?;
    Ok(Json(serde_json::json!({"task_id": id, "met": met})))
}

// ── Handlers: approvals ───────────────────────────────────────────────

async fn list_approvals(
    State(state): State<SharedState>,
    Query(query): Query<ListApprovalsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ActionStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let actions = state.approvals.list(status).await?;
    Ok(Json(actions))
}

async fn create_approval(
    State(state): State<SharedState>,
    Json(req): Json<CreateApprovalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let timeout = req.timeout_minutes.unwrap_or(state.default_timeout_minutes);
    if !(0..=MAX_TIMEOUT_MINUTES).contains(&timeout) {
        return Err(ApiError::BadRequest(format!(
            "timeout_minutes must be between 0 and {}",
            MAX_TIMEOUT_MINUTES
        )));
    }
    if let Some(task_id) = req.task_id.as_deref()
        && task_id != MANUAL_TASK_ID
        && state.repo.get_task(task_id).await?.is_none()
    {
        return Err(ApiError::NotFound(format!("Task {} not found", task_id)));
    }

    let id = state
        .approvals
        .add_action(req.action, req.task_id.as_deref(), Some(timeout))
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

async fn get_approval(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.approvals.get_action(&id).await? {
        Some(action) => Ok(Json(action)),
        None => Err(ApiError::NotFound(format!("Action {} not found", id))),
    }
}

async fn approve_action(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.approvals.approve(&id).await?;
    Ok(Json(outcome))
}

/// The body is optional; `{"reason": "..."}` when present.
async fn reject_action(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: RejectRequest = if body.is_empty() {
        RejectRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid reject body: {}", e)))?
    };
    let outcome = state.approvals.reject(&id, req.reason).await?;
    Ok(Json(outcome))
}

async fn set_telegram_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<TelegramMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state
        .approvals
        .set_telegram_message_id(&id, req.message_id)
        .await?
    {
        Ok(Json(serde_json::json!({"success": true})))
    } else {
        Err(ApiError::NotFound(format!("Action {} not found", id)))
    }
}

// ── Handlers: agent and plans ─────────────────────────────────────────

/// Start a streaming run in the background. Progress arrives over the
/// WebSocket as `AgentStep` messages followed by one `AgentCompleted`.
async fn run_agent(
    State(state): State<SharedState>,
    Json(req): Json<AgentRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("Prompt must not be empty".into()));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let runner = state.runner.clone();
    let ws_tx = state.ws_tx.clone();
    let sid = session_id.clone();

    tokio::spawn(async move {
        let step_tx = ws_tx.clone();
        let step_sid = sid.clone();
        let sink: StepSink = Arc::new(move |step: AgentStep| {
            broadcast_message(
                &step_tx,
                &WsMessage::AgentStep {
                    session_id: step_sid.clone(),
                    step,
                },
            );
        });
        let result = runner.run_prompt_streaming(&req.prompt, sink).await;
        tracing::info!(session_id = %sid, success = result.success, "agent run finished");
        broadcast_message(
            &ws_tx,
            &WsMessage::AgentCompleted {
                session_id: sid,
                result,
            },
        );
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"session_id": session_id})),
    ))
}

async fn analyze_plan_handler(
    State(state): State<SharedState>,
    Json(req): Json<AnalyzePlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let analysis = analyze_plan(&req.markdown);

    let mut created_tasks = Vec::new();
    if req.create_tasks {
        let project_id = req.project_id.ok_or_else(|| {
            ApiError::BadRequest("project_id is required when create_tasks is set".into())
        })?;
        if state.repo.get_project(project_id).await?.is_none() {
            return Err(ApiError::NotFound(format!("Project {} not found", project_id)));
        }
        for suggested in &analysis.suggested_tasks {
            if let Some(task) = state
                .repo
                .create_task(project_id, suggested.to_new_task())
                .await?
            {
                created_tasks.push(task);
            }
        }
        tracing::info!(project_id, created = created_tasks.len(), "tasks created from plan");
    }

    Ok(Json(AnalyzePlanResponse {
        analysis,
        created_tasks,
    }))
}
