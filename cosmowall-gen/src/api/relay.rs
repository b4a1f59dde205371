//! Image relay: pass upstream image bytes through to the browser
//!
//! Single attempt, no retry; the caller can simply request again.

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::http_fetch::check_status;
use crate::services::image_pool::is_valid_image_url;
use crate::AppState;

/// Content type when upstream sends none
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// 24 hours
pub const RELAY_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub url: Option<String>,
}

/// GET /api/image-proxy?url=...
pub async fn relay_image(State(state): State<AppState>, Query(query): Query<RelayQuery>) -> ApiResult<Response> {
    let url = query
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing required query parameter: url".to_string()))?;

    if !is_valid_image_url(&url) {
        return Err(ApiError::BadRequest(format!("not an http(s) URL: {}", url)));
    }

    let upstream = state
        .relay_fetcher
        .get(&url)
        .await
        .and_then(|response| check_status(response, &url))
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Relay fetch failed");
            ApiError::Upstream(format!("failed to fetch image: {}", e))
        })?;

    let content_type = upstream
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    tracing::debug!(url = %url, bytes = upstream.body.len(), content_type = %content_type, "Relayed image");

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, RELAY_CACHE_CONTROL.to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
        ],
        upstream.body,
    )
        .into_response())
}

/// Build relay routes
pub fn relay_routes() -> Router<AppState> {
    Router::new().route("/api/image-proxy", get(relay_image))
}
