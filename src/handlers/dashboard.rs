// src/handlers/dashboard.rs

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::params::DisplayParams,
    services::{chart, pipeline},
    state::AppState,
};

fn validated(params: DisplayParams) -> Result<DisplayParams, AppError> {
    if let Err(validation_errors) = params.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    Ok(params)
}

/// Lists question numbers (highest first) with their most common posting date.
pub async fn list_questions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let current = state.current_dataset().await?;
    let options = current
        .dataset
        .question_options(state.config.display_offset());

    Ok(Json(options))
}

/// Returns the histogram panels for the given display parameters.
///
/// * `nrow`/`ncol` are echoed back with `nrow` recomputed from the panel count.
/// * `warning` is set when the data could not be refreshed.
pub async fn get_panels(
    State(state): State<AppState>,
    Query(params): Query<DisplayParams>,
) -> Result<impl IntoResponse, AppError> {
    let params = validated(params)?;
    let current = state.current_dataset().await?;

    let panels = pipeline::build_panels(&current.dataset, &params)?;
    let figure = chart::render(&panels, params.ncol);

    Ok(Json(serde_json::json!({
        "nrow": figure.nrow,
        "ncol": figure.ncol,
        "panels": panels,
        "warning": current.warning,
    })))
}

/// Renders the histogram grid as an SVG document.
pub async fn get_figure(
    State(state): State<AppState>,
    Query(params): Query<DisplayParams>,
) -> Result<impl IntoResponse, AppError> {
    let params = validated(params)?;
    let current = state.current_dataset().await?;

    let panels = pipeline::build_panels(&current.dataset, &params)?;
    let svg = chart::render(&panels, params.ncol).to_svg()?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}
