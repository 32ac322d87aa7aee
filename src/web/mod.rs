pub mod compress;
pub mod handlers;
pub mod html;

use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.paths.static_dir.clone();

    let router = Router::new()
        .route("/status", get(handlers::status_handler))
        .route("/browse/{*query}", get(handlers::browse_handler))
        .route("/play/{*path}", get(handlers::play_handler))
        .route("/pause", get(handlers::pause_handler))
        .route("/show/{*path}", get(handlers::show_handler));

    let router = match static_dir {
        Some(dir) => router
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
