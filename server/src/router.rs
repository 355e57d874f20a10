// Router configuration

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    handlers::{auth_handlers::*, doc_handlers::*, health_handlers::*},
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let (socket_layer, socket_io) = crate::socket::build_socket_layer(state.clone());
    let _ = state.socket_io.set(socket_io);

    let allow_origin = match state.config.client_url.as_deref() {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(err) => {
                warn!(%origin, error = %err, "invalid client url; mirroring request origin");
                AllowOrigin::mirror_request()
            }
        },
        None => AllowOrigin::mirror_request(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        // Authentication
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/me", get(current_user_handler))
        // Documents
        .route(
            "/api/documents",
            get(list_documents_handler).post(create_document_handler),
        )
        .route(
            "/api/documents/{id}",
            get(get_document_handler).delete(delete_document_handler),
        )
        .route("/api/documents/{id}/share", put(share_document_handler))
        .route(
            "/api/documents/{id}/share/{user_id}",
            delete(revoke_share_handler),
        )
        .route("/api/documents/{id}/history", get(document_history_handler))
        .route("/api/documents/{id}/restore", post(restore_document_handler))
        .layer(socket_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
