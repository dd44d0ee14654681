use crate::aggregate::summarize_at;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    ScriptQuery, SkipReason, SummaryQuery, SummaryResponse, TrackResponse, TrackingEvent,
};
use crate::script::{ScriptOptions, build_script};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{
        HeaderMap, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, HOST},
    },
    response::IntoResponse,
};
use chrono::{TimeDelta, Utc};
use tracing::{debug, info, warn};

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const MAX_PERIOD_DAYS: u32 = 366;

/// 1×1 transparent GIF answered by the pixel endpoint.
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Accepts JSON regardless of content type: beacons arrive as `text/plain`.
pub async fn track(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TrackResponse>, AppError> {
    let event: TrackingEvent = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request(format!("invalid tracking payload: {err}")))?;
    let response = record_event(&state, event).await?;
    Ok(Json(response))
}

/// Pixel fallback. Always answers with the GIF so the image load succeeds.
pub async fn track_pixel(
    State(state): State<AppState>,
    query: Option<Query<TrackingEvent>>,
) -> impl IntoResponse {
    match query {
        Some(Query(event)) => {
            if let Err(err) = record_event(&state, event).await {
                warn!("pixel event rejected: {}", err.message);
            }
        }
        None => debug!("pixel request without a readable payload"),
    }
    (
        [(CONTENT_TYPE, "image/gif"), (CACHE_CONTROL, NO_CACHE)],
        PIXEL_GIF,
    )
}

pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn tracker_script(
    State(state): State<AppState>,
    Query(query): Query<ScriptQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let endpoint = reporting_endpoint(&headers, &state.config);
    if query.site_id.is_none() {
        debug!("tracker.js requested without siteId");
    }
    let script = build_script(
        query.site_id.as_deref(),
        &endpoint,
        &ScriptOptions::from(state.config.as_ref()),
    );
    (
        [
            (CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (CACHE_CONTROL, NO_CACHE),
        ],
        script,
    )
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    let site_id = query.site_id.trim();
    if site_id.is_empty() {
        return Err(AppError::bad_request("siteId is required"));
    }
    if query.period_days == 0 || query.period_days > MAX_PERIOD_DAYS {
        return Err(AppError::bad_request(format!(
            "periodDays must be between 1 and {MAX_PERIOD_DAYS}"
        )));
    }

    let now = Utc::now();
    let since = now - TimeDelta::days(i64::from(query.period_days));
    let events = state.store.query(site_id, since, now).await;
    let summary = summarize_at(now, &events, query.period_days);

    Ok(Json(SummaryResponse {
        success: true,
        data: Some(summary),
        error: None,
    }))
}

pub async fn health() -> &'static str {
    "ok"
}

async fn record_event(state: &AppState, event: TrackingEvent) -> Result<TrackResponse, AppError> {
    if event.site_id.trim().is_empty() {
        return Err(AppError::bad_request("siteId is required"));
    }
    if event.url.trim().is_empty() {
        return Err(AppError::bad_request("url is required"));
    }

    if state.classifier.is_dashboard_url(&event.url) {
        debug!(url = %event.url, "skipping dashboard event");
        return Ok(TrackResponse::skipped(SkipReason::Dashboard));
    }

    let key = format!("{}|{}|{}", event.site_id, event.user_agent, event.url);
    let is_ping = event.is_session_ping();
    // Held across the write so a key is only marked once its event is on disk.
    let mut suppressor = state.suppressor.lock().await;
    let received_at = Utc::now();
    if !is_ping && suppressor.is_duplicate(&key, received_at) {
        debug!(url = %event.url, "skipping duplicate event");
        return Ok(TrackResponse::skipped(SkipReason::Duplicate));
    }

    info!(site = %event.site_id, url = %event.url, kind = ?event.event_type, "event recorded");
    state.store.append(event).await?;
    if !is_ping {
        suppressor.mark_processed(&key, received_at);
    }
    Ok(TrackResponse::stored())
}

fn reporting_endpoint(headers: &HeaderMap, config: &Config) -> String {
    let host = headers.get(HOST).and_then(|value| value.to_str().ok());
    match host {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("http");
            format!("{scheme}://{host}")
        }
        None => config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", config.port)),
    }
}
