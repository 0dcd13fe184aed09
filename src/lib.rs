pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::session_store::SessionStore;
use crate::services::storage::ObjectStore;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload::init_upload,
        api::handlers::upload::upload_part,
        api::handlers::upload::complete_upload,
        api::handlers::upload::abort_upload,
        api::handlers::upload::get_upload,
        api::handlers::upload::list_uploads,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::upload::InitUploadResponse,
            api::handlers::upload::CompletedPartRequest,
            api::handlers::upload::CompleteUploadResponse,
            api::handlers::upload::UploadedPartView,
            api::handlers::upload::UploadSessionResponse,
            models::PartReceipt,
            models::SessionStatus,
        )
    ),
    tags(
        (name = "uploads", description = "Multipart upload sessions"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub upload_service: Arc<UploadService>,
    pub sessions: Arc<dyn SessionStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        storage: Arc<dyn ObjectStore>,
        config: UploadConfig,
    ) -> Self {
        let upload_service = Arc::new(UploadService::new(
            sessions.clone(),
            storage.clone(),
            config.clone(),
        ));
        Self {
            upload_service,
            sessions,
            storage,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/files/upload/init",
            post(api::handlers::upload::init_upload),
        )
        .route(
            "/api/files/upload/part",
            post(api::handlers::upload::upload_part)
                .layer(DefaultBodyLimit::max(state.config.part_body_limit())),
        )
        .route(
            "/api/files/upload/complete",
            post(api::handlers::upload::complete_upload),
        )
        .route(
            "/api/files/upload/sessions",
            get(api::handlers::upload::list_uploads),
        )
        .route(
            "/api/files/upload/:upload_id",
            get(api::handlers::upload::get_upload).delete(api::handlers::upload::abort_upload),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}
