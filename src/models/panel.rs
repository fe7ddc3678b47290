// src/models/panel.rs

use serde::Serialize;

/// Per-question view feeding one histogram subplot.
/// Built fresh for every render request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramPanel {
    pub qnumber: i64,

    /// Most common scoremax among the question's rows.
    pub max_score: i64,

    pub mean: Option<f64>,
    pub median: Option<f64>,

    /// Filtered scores, in dataset order.
    pub scores: Vec<f64>,

    pub highlight: Option<Highlight>,
}

/// A single user's position within a question's distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub username: String,
    pub score: f64,
    /// Share of rows scoring at least as much as this user, in [0, 1].
    pub percentile: f64,
}

/// Entry of the question-number cutoff selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionOption {
    pub qnumber: i64,
    /// Most frequent posting day, `YYYY/MM/DD`.
    pub date: String,
}

/// Returned by `GET /api/dataset/meta`.
#[derive(Debug, Serialize)]
pub struct DatasetMeta {
    pub rows: usize,
    pub analysis_rows: usize,
    pub data_as_of: Option<String>,
}
