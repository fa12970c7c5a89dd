use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use utoipa::IntoParams;

use crate::config::Config;
use crate::errors::AppError;
use crate::lead_service::LeadService;
use crate::lightfusion::{MeshFiles, ProjectStatus};
use crate::models::{
    CreateLeadRequest, CreateLeadResponse, Lead, LeadFilter, LeadPage, LeadPatch, ListLeadsQuery,
};
use crate::quote::{calculate_quote, QuoteInput, QuoteResult};

/// Header set by the authentication middleware in front of the service.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub leads: Arc<LeadService>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// Vendor house id; defaults to the lead's vendor project id.
    pub house_id: Option<i64>,
}

fn caller_id(headers: &HeaderMap, body_user_id: Option<i64>) -> Result<i64, AppError> {
    let from_header = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    from_header
        .or(body_user_id)
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Unauthorized("User ID missing from context".to_string()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e.body_text())))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy")),
    tag = "health"
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "sunready-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/leads
///
/// Creates the vendor 3D project and persists the Lead with its House.
/// An `Idempotency-Key` header makes retries return the original ids.
#[utoipa::path(
    post,
    path = "/api/leads",
    request_body = CreateLeadRequest,
    responses(
        (status = 201, description = "Lead created", body = CreateLeadResponse),
        (status = 400, description = "Missing project or invalid input"),
        (status = 401, description = "Missing caller identity"),
        (status = 404, description = "Unknown project or user"),
        (status = 500, description = "Vendor or persistence failure")
    ),
    tag = "leads"
)]
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateLeadResponse>), AppError> {
    let request = json_body(body)?;
    let user_id = caller_id(&headers, request.user_id)?;
    let project_id = request
        .project_id
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest("project_id is required".to_string()))?;
    let client_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    tracing::info!(user_id, project_id, "POST /api/leads");

    let response = state
        .leads
        .create_lead(request, user_id, project_id, client_key.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/leads",
    params(ListLeadsQuery),
    responses((status = 200, description = "Page of leads", body = LeadPage)),
    tag = "leads"
)]
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<LeadPage>, AppError> {
    let page = state.leads.list_leads(LeadFilter::from(query)).await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/leads/{id}",
    params(("id" = i64, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Lead", body = Lead),
        (status = 404, description = "Lead not found")
    ),
    tag = "leads"
)]
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Lead>, AppError> {
    Ok(Json(state.leads.get_lead(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/leads/{id}",
    params(("id" = i64, Path, description = "Lead id")),
    request_body = LeadPatch,
    responses(
        (status = 200, description = "Updated lead", body = Lead),
        (status = 400, description = "Empty patch or invalid coordinates"),
        (status = 404, description = "Lead not found")
    ),
    tag = "leads"
)]
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<LeadPatch>, JsonRejection>,
) -> Result<Json<Lead>, AppError> {
    let patch = json_body(body)?;
    Ok(Json(state.leads.update_lead(id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/api/leads/{id}",
    params(("id" = i64, Path, description = "Lead id")),
    responses(
        (status = 204, description = "Lead deleted"),
        (status = 404, description = "Lead not found")
    ),
    tag = "leads"
)]
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.leads.delete_lead(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/leads/{id}/mesh-files
///
/// Downloads are cancelled if the client goes away before they finish.
#[utoipa::path(
    get,
    path = "/api/leads/{id}/mesh-files",
    params(("id" = i64, Path, description = "Lead id")),
    responses(
        (status = 200, description = "Mesh file bundle", body = MeshFiles),
        (status = 404, description = "Lead or vendor project not found"),
        (status = 500, description = "No mesh file could be retrieved")
    ),
    tag = "leads"
)]
pub async fn get_mesh_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MeshFiles>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let files = state.leads.mesh_files_for_lead(id, cancel).await?;
    Ok(Json(files))
}

#[utoipa::path(
    get,
    path = "/api/leads/{id}/status",
    params(("id" = i64, Path, description = "Lead id"), StatusQuery),
    responses(
        (status = 200, description = "Vendor project status", body = ProjectStatus),
        (status = 404, description = "Lead or vendor project not found")
    ),
    tag = "leads"
)]
pub async fn get_project_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ProjectStatus>, AppError> {
    let status = state
        .leads
        .project_status_for_lead(id, query.house_id)
        .await?;
    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/api/quote",
    request_body = QuoteInput,
    responses(
        (status = 200, description = "Quote", body = QuoteResult),
        (status = 400, description = "Invalid quote input")
    ),
    tag = "quote"
)]
pub async fn create_quote(
    body: Result<Json<QuoteInput>, JsonRejection>,
) -> Result<Json<QuoteResult>, AppError> {
    let input = json_body(body)?;
    Ok(Json(calculate_quote(&input)?))
}
