//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router binds the REST mirror, the websocket upgrade, and the
//! static client under a single listener. The permissive CORS layer matches
//! the cooperative trust model: the API carries no credentials.

pub mod api;
pub mod ws;

use std::path::PathBuf;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Resolve the directory holding the static client bundle.
fn static_dir() -> PathBuf {
    std::env::var("STATIC_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./static"))
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_service = ServeDir::new(static_dir()).append_index_html_on_directories(true);

    Router::new()
        .route("/api/items", get(api::list_items).post(api::create_item))
        .route("/api/items/{id}", delete(api::delete_item))
        .route("/api/clear", post(api::clear_board))
        .route("/api/participants", get(api::list_participants))
        .route("/api/health", get(api::health))
        .route("/api/ws", get(ws::handle_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .fallback_service(static_service)
}
