//! Generation and artifact download endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cosmowall_common::api::{GenerateResponse, SlotSummary};
use cosmowall_common::time::now_millis;
use cosmowall_common::OutputFormat;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::{artifact_file_name, Encoding, GenerationPass};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    pub format: Option<String>,
}

/// Per-slot summary of a pass
pub fn summarize(pass: &GenerationPass, product_name: &str) -> GenerateResponse {
    let slots = pass
        .slots
        .iter()
        .map(|slot| SlotSummary {
            index: slot.index,
            source_url: slot.source.as_ref().map(|s| s.url().to_string()),
            used_fallback: slot.used_fallback(),
            has_error: slot.has_error,
            file_name: artifact_file_name(product_name, pass.format, slot.index),
        })
        .collect();

    GenerateResponse {
        success: pass.successful_slots() > 0,
        format: pass.format,
        slots,
        timestamp: now_millis(),
    }
}

/// POST /api/generate?format=desktop|phone
pub async fn generate(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
) -> ApiResult<Json<GenerateResponse>> {
    let format = match query.format.as_deref() {
        Some(raw) => raw.parse::<OutputFormat>()?,
        None => OutputFormat::default(),
    };

    let pass = state.generate_pass(format).await;

    let response = summarize(&pass, &state.product_name);
    if !response.success {
        state.record_error(format!("generation pass for {} produced no images", format)).await;
    }

    Ok(Json(response))
}

/// GET /api/generated/:slot/:variant
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((slot_index, variant)): Path<(usize, String)>,
) -> ApiResult<Response> {
    let pass = state
        .generations
        .latest()
        .await
        .ok_or_else(|| ApiError::NotFound("no generation pass yet".to_string()))?;

    let slot = pass
        .slots
        .iter()
        .find(|s| s.index == slot_index)
        .ok_or_else(|| ApiError::NotFound(format!("slot {} not found", slot_index)))?;

    if slot.has_error {
        return Err(ApiError::NotFound(format!("slot {} failed to render", slot_index)));
    }

    let missing = || ApiError::NotFound(format!("slot {} has no {} artifact", slot_index, variant));
    let response = match variant.as_str() {
        "preview" => {
            let bytes = slot.preview_artifact.clone().ok_or_else(missing)?;
            ([(header::CONTENT_TYPE, Encoding::preview().mime_type().to_string())], bytes).into_response()
        }
        "full" => {
            let bytes = slot.full_res_artifact.clone().ok_or_else(missing)?;
            let file_name = artifact_file_name(&state.product_name, pass.format, slot.index);
            (
                [
                    (header::CONTENT_TYPE, Encoding::full_resolution().mime_type().to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
                ],
                bytes,
            )
                .into_response()
        }
        other => return Err(ApiError::NotFound(format!("unknown artifact variant: {}", other))),
    };

    Ok(response)
}

/// Build generation routes
pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/generated/:slot/:variant", get(download_artifact))
}
