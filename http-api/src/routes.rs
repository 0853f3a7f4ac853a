use airyra_core::models::{
    Dependency, NewSpec, NewTask, Page, Paged, Spec, Task, TaskFilter, TaskStatus, UpdateSpec,
    UpdateTask,
};
use airyra_core::AuditEntry;
use airyra_store::{ProjectStore, StoreManager};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::CoordinationEngine;
use crate::error::ApiResult;
use crate::extract::{Agent, ApiJson, ApiQuery};

/// Shared router state: the process-wide store manager.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StoreManager>,
}

impl AppState {
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self { manager }
    }
}

/// Build the `/v1` router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/projects", get(list_projects))
        .route("/v1/projects/:project/tasks", post(create_task).get(list_tasks))
        .route("/v1/projects/:project/tasks/ready", get(ready_tasks))
        .route(
            "/v1/projects/:project/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/v1/projects/:project/tasks/:id/claim", post(claim_task))
        .route("/v1/projects/:project/tasks/:id/done", post(complete_task))
        .route("/v1/projects/:project/tasks/:id/release", post(release_task))
        .route("/v1/projects/:project/tasks/:id/block", post(block_task))
        .route("/v1/projects/:project/tasks/:id/unblock", post(unblock_task))
        .route(
            "/v1/projects/:project/tasks/:id/deps",
            post(add_dependency).get(list_dependencies),
        )
        .route(
            "/v1/projects/:project/tasks/:child/deps/:parent",
            delete(remove_dependency),
        )
        .route("/v1/projects/:project/tasks/:id/history", get(task_history))
        .route("/v1/projects/:project/specs", post(create_spec).get(list_specs))
        .route("/v1/projects/:project/specs/ready", get(ready_specs))
        .route(
            "/v1/projects/:project/specs/:id",
            get(get_spec).patch(update_spec).delete(delete_spec),
        )
        .route("/v1/projects/:project/specs/:id/cancel", post(cancel_spec))
        .route("/v1/projects/:project/specs/:id/reopen", post(reopen_spec))
        .route(
            "/v1/projects/:project/specs/:id/deps",
            post(add_spec_dependency).get(list_spec_dependencies),
        )
        .route(
            "/v1/projects/:project/specs/:child/deps/:parent",
            delete(remove_spec_dependency),
        )
        .route("/v1/projects/:project/specs/:id/tasks", get(tasks_in_spec))
        .with_state(state)
}

async fn engine_for(
    state: &AppState,
    project: &str,
) -> ApiResult<CoordinationEngine<ProjectStore>> {
    let store = state.manager.store_for(project).await?;
    Ok(CoordinationEngine::new(store))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

impl PageQuery {
    fn clamped(&self) -> Page {
        Page::clamped(self.page, self.per_page)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListTasksQuery {
    status: Option<TaskStatus>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ReleaseQuery {
    force: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct AddDependencyBody {
    parent_id: String,
}

// ----- service -----

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Paged<String>>> {
    let projects = state.manager.list_projects().await?;
    let total = projects.len() as u64;
    Ok(Json(Paged::new(projects, Page::default(), total)))
}

// ----- tasks -----

#[axum::debug_handler]
async fn create_task(
    State(state): State<AppState>,
    Path(project): Path<String>,
    agent: Agent,
    ApiJson(body): ApiJson<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let engine = engine_for(&state, &project).await?;
    let task = engine.create_task(body, &agent.0).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(
    State(state): State<AppState>,
    Path(project): Path<String>,
    ApiQuery(query): ApiQuery<ListTasksQuery>,
) -> ApiResult<Json<Paged<Task>>> {
    let engine = engine_for(&state, &project).await?;
    let filter = TaskFilter {
        status: query.status,
        spec_id: None,
    };
    let page = Page::clamped(query.page, query.per_page);
    let (tasks, total) = engine.list_tasks(filter, page).await?;
    Ok(Json(Paged::new(tasks, page, total)))
}

async fn ready_tasks(
    State(state): State<AppState>,
    Path(project): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<Task>>> {
    let engine = engine_for(&state, &project).await?;
    let page = query.clamped();
    let (tasks, total) = engine.ready_tasks(page).await?;
    Ok(Json(Paged::new(tasks, page, total)))
}

async fn get_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.get_task(&task_id).await?))
}

async fn update_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
    ApiJson(body): ApiJson<UpdateTask>,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.update_task(&task_id, body, &agent.0).await?))
}

async fn delete_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
) -> ApiResult<StatusCode> {
    let engine = engine_for(&state, &project).await?;
    engine.delete_task(&task_id, &agent.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn claim_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.claim_task(&task_id, &agent.0).await?))
}

async fn complete_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.complete_task(&task_id, &agent.0).await?))
}

async fn release_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
    ApiQuery(query): ApiQuery<ReleaseQuery>,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    let force = query.force.unwrap_or(false);
    Ok(Json(engine.release_task(&task_id, &agent.0, force).await?))
}

async fn block_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.block_task(&task_id, &agent.0).await?))
}

async fn unblock_task(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
) -> ApiResult<Json<Task>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.unblock_task(&task_id, &agent.0).await?))
}

// ----- task dependencies -----

async fn add_dependency(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    agent: Agent,
    ApiJson(body): ApiJson<AddDependencyBody>,
) -> ApiResult<(StatusCode, Json<Dependency>)> {
    let engine = engine_for(&state, &project).await?;
    let edge = engine
        .add_dependency(&task_id, &body.parent_id, &agent.0)
        .await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn remove_dependency(
    State(state): State<AppState>,
    Path((project, child_id, parent_id)): Path<(String, String, String)>,
    agent: Agent,
) -> ApiResult<StatusCode> {
    let engine = engine_for(&state, &project).await?;
    engine
        .remove_dependency(&child_id, &parent_id, &agent.0)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_dependencies(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<Dependency>>> {
    let engine = engine_for(&state, &project).await?;
    let edges = engine.list_dependencies(&task_id).await?;
    Ok(Json(paged_window(edges, query.clamped())))
}

async fn task_history(
    State(state): State<AppState>,
    Path((project, task_id)): Path<(String, String)>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<AuditEntry>>> {
    let engine = engine_for(&state, &project).await?;
    let entries = engine.task_history(&task_id).await?;
    Ok(Json(paged_window(entries, query.clamped())))
}

// ----- specs -----

async fn create_spec(
    State(state): State<AppState>,
    Path(project): Path<String>,
    _agent: Agent,
    ApiJson(body): ApiJson<NewSpec>,
) -> ApiResult<(StatusCode, Json<Spec>)> {
    let engine = engine_for(&state, &project).await?;
    let spec = engine.create_spec(body).await?;
    Ok((StatusCode::CREATED, Json(spec)))
}

async fn list_specs(
    State(state): State<AppState>,
    Path(project): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<Spec>>> {
    let engine = engine_for(&state, &project).await?;
    let page = query.clamped();
    let (specs, total) = engine.list_specs(page).await?;
    Ok(Json(Paged::new(specs, page, total)))
}

async fn ready_specs(
    State(state): State<AppState>,
    Path(project): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<Spec>>> {
    let engine = engine_for(&state, &project).await?;
    let page = query.clamped();
    let (specs, total) = engine.ready_specs(page).await?;
    Ok(Json(Paged::new(specs, page, total)))
}

async fn get_spec(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
) -> ApiResult<Json<Spec>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.get_spec(&spec_id).await?))
}

async fn update_spec(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    _agent: Agent,
    ApiJson(body): ApiJson<UpdateSpec>,
) -> ApiResult<Json<Spec>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.update_spec(&spec_id, body).await?))
}

async fn delete_spec(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    _agent: Agent,
) -> ApiResult<StatusCode> {
    let engine = engine_for(&state, &project).await?;
    engine.delete_spec(&spec_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_spec(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    _agent: Agent,
) -> ApiResult<Json<Spec>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.cancel_spec(&spec_id).await?))
}

async fn reopen_spec(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    _agent: Agent,
) -> ApiResult<Json<Spec>> {
    let engine = engine_for(&state, &project).await?;
    Ok(Json(engine.reopen_spec(&spec_id).await?))
}

async fn tasks_in_spec(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<Task>>> {
    let engine = engine_for(&state, &project).await?;
    let page = query.clamped();
    let (tasks, total) = engine.tasks_in_spec(&spec_id, page).await?;
    Ok(Json(Paged::new(tasks, page, total)))
}

// ----- spec dependencies -----

async fn add_spec_dependency(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    _agent: Agent,
    ApiJson(body): ApiJson<AddDependencyBody>,
) -> ApiResult<(StatusCode, Json<Dependency>)> {
    let engine = engine_for(&state, &project).await?;
    let edge = engine
        .add_spec_dependency(&spec_id, &body.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn remove_spec_dependency(
    State(state): State<AppState>,
    Path((project, child_id, parent_id)): Path<(String, String, String)>,
    _agent: Agent,
) -> ApiResult<StatusCode> {
    let engine = engine_for(&state, &project).await?;
    engine.remove_spec_dependency(&child_id, &parent_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_spec_dependencies(
    State(state): State<AppState>,
    Path((project, spec_id)): Path<(String, String)>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Paged<Dependency>>> {
    let engine = engine_for(&state, &project).await?;
    let edges = engine.list_spec_dependencies(&spec_id).await?;
    Ok(Json(paged_window(edges, query.clamped())))
}

/// Envelope an in-memory list, applying the window locally. Used for the
/// small per-task collections (edges, history).
fn paged_window<T>(items: Vec<T>, page: Page) -> Paged<T> {
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.limit() as usize).min(items.len());
    let data = items
        .into_iter()
        .skip(start)
        .take(end - start)
        .collect();
    Paged::new(data, page, total)
}
