use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::CurrentUser, state::AppState};

pub mod auth;
pub mod documents;
pub mod health;
pub mod insurance;
pub mod maintenance;
pub mod projects;
pub mod properties;
pub mod reports;
pub mod tasks;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).put(auth::update_me));

    let properties_routes = Router::new()
        .route(
            "/",
            get(properties::list_properties).post(properties::create_property),
        )
        .route(
            "/:id",
            get(properties::get_property)
                .put(properties::update_property)
                .delete(properties::delete_property),
        )
        .route(
            "/:id/permissions",
            get(properties::list_permissions).post(properties::grant_permission),
        )
        .route(
            "/:id/permissions/:user_id",
            delete(properties::revoke_permission),
        );

    let projects_routes = Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/:id/assign", post(projects::assign_user))
        .route("/:id/assign/:user_id", delete(projects::unassign_user))
        .route("/:id/assignments", get(projects::list_assignments))
        .route("/:id/tasks", get(projects::list_tasks).post(projects::create_task));

    let tasks_routes = Router::new()
        .route("/bulk-update", put(tasks::bulk_update))
        .route("/bulk-delete", delete(tasks::bulk_delete))
        .route(
            "/:id",
            get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/:id/status", put(tasks::update_status))
        .route("/:id/dependencies", post(tasks::add_dependency))
        .route("/:id/comments", get(tasks::list_comments).post(tasks::add_comment))
        .route("/:id/time-tracking", get(tasks::time_tracking_summary))
        .route("/:id/time-tracking/start", post(tasks::start_time_tracking))
        .route("/:id/time-tracking/stop", post(tasks::stop_time_tracking));

    let maintenance_routes = Router::new()
        .route(
            "/",
            get(maintenance::list_schedules).post(maintenance::create_schedule),
        )
        .route("/due", get(maintenance::list_due))
        .route(
            "/:id",
            get(maintenance::get_schedule)
                .put(maintenance::update_schedule)
                .delete(maintenance::delete_schedule),
        )
        .route("/:id/complete", post(maintenance::complete_schedule))
        .route("/:id/history", get(maintenance::list_history));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::create_document),
        )
        .route("/upload", post(documents::upload_document))
        .route(
            "/:id",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        )
        .route("/:id/download", get(documents::download_document));

    let insurance_routes = Router::new()
        .route(
            "/items",
            get(insurance::list_items).post(insurance::create_item),
        )
        .route(
            "/items/:id",
            get(insurance::get_item)
                .put(insurance::update_item)
                .delete(insurance::delete_item),
        )
        .route("/items/:id/photos", post(insurance::upload_photo))
        .route(
            "/items/:id/photos/:photo_id",
            delete(insurance::delete_photo),
        )
        .route("/items/:id/documents", post(insurance::link_document))
        .route(
            "/items/:id/documents/:document_id",
            delete(insurance::unlink_document),
        )
        .route("/summary", get(insurance::summary))
        .route(
            "/export/claim-report/:property_id",
            get(insurance::claim_report),
        );

    let reports_routes = Router::new()
        .route("/dashboard", get(reports::dashboard))
        .route("/properties/:id/details", get(reports::property_details));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/properties", properties_routes)
        .nest("/projects", projects_routes)
        .nest("/tasks", tasks_routes)
        .nest("/maintenance-schedules", maintenance_routes)
        .nest("/documents", documents_routes)
        .nest("/insurance", insurance_routes)
        .nest("/reports", reports_routes)
        .layer(middleware::from_extractor_with_state::<CurrentUser, _>(protected_state));

    let api = Router::new()
        .merge(protected_routes)
        .nest("/auth", auth_routes)
        .route("/health", get(health::health_check));

    let base_path = state.config.api_base_path.clone();
    Router::new()
        .nest(&base_path, api)
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
