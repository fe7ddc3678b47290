// src/handlers/dataset.rs

use axum::{Json, extract::State, http::header, response::IntoResponse};

use crate::{error::AppError, models::panel::DatasetMeta, state::AppState};

pub const EXPORT_FILE_NAME: &str = "mondoquiz-app.csv";

/// Row counts and the timestamp of the newest row.
pub async fn get_meta(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let current = state.current_dataset().await?;
    let dataset = &current.dataset;

    Ok(Json(DatasetMeta {
        rows: dataset.len(),
        analysis_rows: dataset.analysis_records().count(),
        data_as_of: dataset.data_as_of(state.config.display_offset()),
    }))
}

/// Downloads the analysis rows (no reference answers, no missing fields) as CSV.
pub async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let current = state.current_dataset().await?;
    let body = current.dataset.export_csv()?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        body,
    ))
}

/// Forces a freshness check against the bucket.
///
/// Unlike page loads, a failure here is returned to the caller.
pub async fn trigger_sync(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let changed = state.sync_and_invalidate().await?;

    Ok(Json(serde_json::json!({
        "changed": changed,
    })))
}
