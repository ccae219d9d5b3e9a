pub mod auth;
pub mod external;
pub mod posts;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Base64 inflates a 5MB image by 4/3 plus JSON overhead, so the request
/// body ceiling sits well above the image ceiling.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// The full application router with ambient layers applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(external::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
