//! Preset catalogue route handler.

use axum::Json;

use rf_pipeline::{presets, Preset};

/// GET /api/presets
#[utoipa::path(
    get,
    path = "/api/presets",
    responses(
        (status = 200, description = "Named transcoding presets", body = Vec<Preset>)
    )
)]
pub async fn list_presets() -> Json<Vec<Preset>> {
    Json(presets::all())
}
