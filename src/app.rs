use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    extract::Request,
    http::{
        HeaderValue,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
        },
    },
    middleware::{self, Next},
    response::Response,
    routing::get,
};

pub fn router(state: AppState) -> Router {
    let tracking = Router::new()
        .route(
            "/api/track",
            get(handlers::track_pixel)
                .post(handlers::track)
                .options(handlers::preflight),
        )
        .layer(middleware::from_fn(open_cors));

    Router::new()
        .route("/tracker.js", get(handlers::tracker_script))
        .route("/api/summary", get(handlers::get_summary))
        .route("/health", get(handlers::health))
        .merge(tracking)
        .with_state(state)
}

/// The collection endpoint is called from arbitrary client origins.
// Not tower-http's CorsLayer: it answers preflights itself with 200, and the
// tracking contract wants 204 from `handlers::preflight`.
async fn open_cors(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}
