//! Image-pool endpoint
//!
//! Always answers 200; failures are reported in the body.

use axum::{extract::State, routing::get, Json, Router};
use cosmowall_common::api::ImagePoolResponse;

use crate::AppState;

/// GET /api/images
pub async fn get_image_pool(State(state): State<AppState>) -> Json<ImagePoolResponse> {
    let response = state.pool_service.image_pool().await;

    if let Some(error) = &response.error {
        state.record_error(format!("image pool: {}", error)).await;
    }

    Json(response)
}

/// Build image-pool routes
pub fn image_routes() -> Router<AppState> {
    Router::new().route("/api/images", get(get_image_pool))
}
