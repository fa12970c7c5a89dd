use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{self, AppState};
use crate::openapi::ApiDoc;

/// Maximum accepted request body.
pub const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// Builds the application router.
///
/// With `rate_limit` set, API routes are limited to 10 req/s per client IP
/// (burst 20); `/health` is never limited.
pub fn build_router(state: Arc<AppState>, rate_limit: bool) -> anyhow::Result<Router> {
    let media_dir = state.config.media_dir.clone();

    let api_routes = Router::new()
        .route("/api/leads", post(handlers::create_lead).get(handlers::list_leads))
        .route(
            "/api/leads/:id",
            get(handlers::get_lead)
                .put(handlers::update_lead)
                .delete(handlers::delete_lead),
        )
        .route("/api/leads/:id/mesh-files", get(handlers::get_mesh_files))
        .route("/api/leads/:id/status", get(handlers::get_project_status))
        .route("/api/quote", post(handlers::create_quote))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    let api_routes = if rate_limit {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
        );
        api_routes.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }))
    } else {
        api_routes
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/media", ServeDir::new(media_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
