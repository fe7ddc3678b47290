// src/services/pipeline.rs

//! Turns the raw dataset and a set of display options into per-question
//! histogram panels. Every step returns a new working view.

use std::collections::BTreeSet;

use crate::{
    error::AppError,
    models::{
        panel::{HistogramPanel, Highlight},
        params::DisplayParams,
        record::Dataset,
    },
    utils::stats,
};

/// A dataset row after required-field filtering and integer coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub username: Option<String>,
    pub qnumber: i64,
    pub score: f64,
    pub scoremax: i64,
    pub trycount: i64,
}

/// Builds the panels to display, highest question number first, at most
/// `nrow * ncol` of them.
pub fn build_panels(
    dataset: &Dataset,
    params: &DisplayParams,
) -> Result<Vec<HistogramPanel>, AppError> {
    tracing::info!("Making histograms");
    let mut rows = coerce(dataset);
    tracing::debug!("Rows with required fields: {}", rows.len());

    if params.show_percent {
        rows = to_percent(rows)?;
    }
    if let Some(trial) = params.trial {
        rows.retain(|r| r.trycount == trial);
        tracing::debug!("Filtered to trial = {}: {} rows", trial, rows.len());
    }
    if let Some(maxq) = params.maxq {
        rows.retain(|r| r.qnumber <= maxq);
        tracing::debug!("Filtered to question {} or before: {} rows", maxq, rows.len());
    }
    if !params.include_maxscore {
        rows.retain(|r| r.score < r.scoremax as f64);
        tracing::debug!("Dropped max scores: {} rows", rows.len());
    }

    let selected = select_questions(&rows, params.capacity());
    tracing::info!("Will plot {} histograms: {:?}", selected.len(), selected);

    Ok(selected
        .into_iter()
        .map(|q| make_panel(q, &rows, params.highlighted_user()))
        .collect())
}

/// Drops reference and incomplete rows, then truncates the numeric columns
/// to integers.
pub fn coerce(dataset: &Dataset) -> Vec<ScoredRow> {
    dataset
        .analysis_records()
        .filter_map(|r| {
            Some(ScoredRow {
                username: r.username.clone(),
                qnumber: r.qnumber? as i64,
                score: (r.score? as i64) as f64,
                scoremax: r.scoremax? as i64,
                trycount: r.trycount? as i64,
            })
        })
        .collect()
}

/// Rescales every score to a 0-100 basis. A zero `scoremax` is a data error.
pub fn to_percent(rows: Vec<ScoredRow>) -> Result<Vec<ScoredRow>, AppError> {
    rows.into_iter()
        .map(|r| {
            if r.scoremax == 0 {
                return Err(AppError::DataIntegrity(format!(
                    "question {} has scoremax 0 (user {:?}); cannot compute percent",
                    r.qnumber,
                    r.username.as_deref().unwrap_or("")
                )));
            }
            Ok(ScoredRow {
                score: 100.0 * r.score / r.scoremax as f64,
                scoremax: 100,
                ..r
            })
        })
        .collect()
}

/// Distinct question numbers, descending, truncated to `capacity`.
pub fn select_questions(rows: &[ScoredRow], capacity: usize) -> Vec<i64> {
    let distinct: BTreeSet<i64> = rows.iter().map(|r| r.qnumber).collect();
    distinct.into_iter().rev().take(capacity).collect()
}

fn make_panel(qnumber: i64, rows: &[ScoredRow], username: Option<&str>) -> HistogramPanel {
    let subset: Vec<&ScoredRow> = rows.iter().filter(|r| r.qnumber == qnumber).collect();
    let scores: Vec<f64> = subset.iter().map(|r| r.score).collect();
    let max_score = stats::mode(subset.iter().map(|r| r.scoremax)).unwrap_or_default();
    tracing::debug!("Max score for question {}: {}", qnumber, max_score);

    let highlight = username.and_then(|name| highlight_user(qnumber, &subset, &scores, name));

    HistogramPanel {
        qnumber,
        max_score,
        mean: stats::mean(&scores),
        median: stats::median(&scores),
        scores,
        highlight,
    }
}

/// Locates `username` in one question's rows. Duplicate rows for the same
/// user resolve to their lowest score.
fn highlight_user(
    qnumber: i64,
    subset: &[&ScoredRow],
    scores: &[f64],
    username: &str,
) -> Option<Highlight> {
    let matches: Vec<f64> = subset
        .iter()
        .filter(|r| r.username.as_deref() == Some(username))
        .map(|r| r.score)
        .collect();

    let score = match matches.as_slice() {
        [] => {
            tracing::info!("User '{}' not found in qnumber {}", username, qnumber);
            return None;
        }
        [only] => *only,
        several => {
            tracing::warn!(
                "Multiple rows of the same user '{}' in qnumber {}: {:?}",
                username,
                qnumber,
                several
            );
            several.iter().copied().fold(f64::INFINITY, f64::min)
        }
    };

    let percentile = stats::fraction_at_least(scores, score)?;
    tracing::info!(
        "Score of user '{}' in qnumber {}: {}, top {}",
        username,
        qnumber,
        score,
        percentile
    );
    Some(Highlight {
        username: username.to_string(),
        score,
        percentile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::QuizRecord;

    fn record(user: &str, q: f64, score: f64, max: f64, tries: f64) -> QuizRecord {
        QuizRecord {
            username: Some(user.to_string()),
            qnumber: Some(q),
            score: Some(score),
            scoremax: Some(max),
            trycount: Some(tries),
            hasreference: false,
            datetime: None,
        }
    }

    fn params() -> DisplayParams {
        DisplayParams {
            include_maxscore: true,
            ..DisplayParams::default()
        }
    }

    #[test]
    fn end_to_end_two_questions() {
        let mut reference = record("zed", 2.0, 9.0, 10.0, 1.0);
        reference.hasreference = true;
        let dataset = Dataset::new(vec![
            record("a", 1.0, 5.0, 10.0, 1.0),
            record("b", 1.0, 10.0, 10.0, 1.0),
            record("c", 1.0, 10.0, 10.0, 1.0),
            record("d", 2.0, 3.0, 10.0, 1.0),
            reference,
        ]);
        let params = DisplayParams {
            nrow: 1,
            ncol: 2,
            ..params()
        };

        let panels = build_panels(&dataset, &params).unwrap();

        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].qnumber, 2);
        assert_eq!(panels[0].scores, vec![3.0]);
        assert_eq!(panels[0].max_score, 10);
        assert_eq!(panels[0].mean, Some(3.0));
        assert_eq!(panels[1].qnumber, 1);
        assert_eq!(panels[1].max_score, 10);
        assert!((panels[1].mean.unwrap() - 8.333).abs() < 1e-3);
        assert_eq!(panels[1].median, Some(10.0));
    }

    #[test]
    fn incomplete_rows_are_dropped_and_values_truncated() {
        let mut missing = record("x", 1.0, 4.0, 10.0, 1.0);
        missing.trycount = None;
        let dataset = Dataset::new(vec![record("a", 3.9, 7.6, 10.2, 1.0), missing]);

        let rows = coerce(&dataset);

        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].qnumber, rows[0].score, rows[0].scoremax), (3, 7.0, 10));
    }

    #[test]
    fn nan_scores_do_not_become_zero() {
        let dataset = Dataset::from_reader(
            "\
username,qnumber,score,scoremax,trycount,hasreference,datetime
alice,1,5,10,1,False,
bob,1,nan,10,1,False,
carol,1,NaN,10,1,False,
"
            .as_bytes(),
        )
        .unwrap();

        assert_eq!(coerce(&dataset).len(), 1);
        let panels = build_panels(&dataset, &params()).unwrap();
        assert_eq!(panels[0].scores, vec![5.0]);
        assert_eq!(panels[0].mean, Some(5.0));
    }

    #[test]
    fn selection_takes_highest_question_numbers() {
        let rows: Vec<ScoredRow> = [5, 3, 9, 1, 9]
            .iter()
            .map(|&q| ScoredRow {
                username: None,
                qnumber: q,
                score: 1.0,
                scoremax: 10,
                trycount: 1,
            })
            .collect();
        assert_eq!(select_questions(&rows, 3), vec![9, 5, 3]);
        assert_eq!(select_questions(&rows, 10), vec![9, 5, 3, 1]);
        assert!(select_questions(&[], 3).is_empty());
    }

    #[test]
    fn grid_capacity_limits_panels() {
        let dataset = Dataset::new(
            (1..=7)
                .map(|q| record("a", q as f64, 1.0, 10.0, 1.0))
                .collect(),
        );
        let params = DisplayParams {
            nrow: 2,
            ncol: 3,
            ..params()
        };
        let qs: Vec<i64> = build_panels(&dataset, &params)
            .unwrap()
            .iter()
            .map(|p| p.qnumber)
            .collect();
        assert_eq!(qs, vec![7, 6, 5, 4, 3, 2]);
    }

    #[test]
    fn max_scores_are_excluded_unless_requested() {
        let dataset = Dataset::new(vec![
            record("a", 1.0, 10.0, 10.0, 1.0),
            record("b", 1.0, 4.0, 10.0, 1.0),
            record("c", 2.0, 12.0, 10.0, 1.0),
        ]);
        let params = DisplayParams::default();

        let panels = build_panels(&dataset, &params).unwrap();

        assert_eq!(panels.len(), 1);
        assert!(panels.iter().all(|p| p.scores.iter().all(|&s| s < p.max_score as f64)));
    }

    #[test]
    fn trial_and_maxq_filters() {
        let dataset = Dataset::new(vec![
            record("a", 1.0, 1.0, 10.0, 1.0),
            record("a", 1.0, 2.0, 10.0, 2.0),
            record("a", 2.0, 3.0, 10.0, 2.0),
            record("a", 3.0, 4.0, 10.0, 2.0),
        ]);
        let params = DisplayParams {
            trial: Some(2),
            maxq: Some(2),
            ..params()
        };

        let panels = build_panels(&dataset, &params).unwrap();

        let summary: Vec<(i64, Vec<f64>)> =
            panels.into_iter().map(|p| (p.qnumber, p.scores)).collect();
        assert_eq!(summary, vec![(2, vec![3.0]), (1, vec![2.0])]);
    }

    #[test]
    fn percent_mode_rescales_to_hundred() {
        let dataset = Dataset::new(vec![
            record("a", 1.0, 5.0, 20.0, 1.0),
            record("b", 1.0, 20.0, 20.0, 1.0),
        ]);
        let params = DisplayParams {
            show_percent: true,
            ..params()
        };

        let panels = build_panels(&dataset, &params).unwrap();

        assert_eq!(panels[0].max_score, 100);
        assert_eq!(panels[0].scores, vec![25.0, 100.0]);
        assert!(panels[0].scores.iter().all(|&s| (0.0..=100.0).contains(&s)));
    }

    #[test]
    fn percent_mode_rejects_zero_scoremax() {
        let dataset = Dataset::new(vec![record("a", 1.0, 0.0, 0.0, 1.0)]);
        let params = DisplayParams {
            show_percent: true,
            ..params()
        };
        assert!(matches!(
            build_panels(&dataset, &params),
            Err(AppError::DataIntegrity(_))
        ));
    }

    #[test]
    fn highlight_percentile_counts_ties() {
        let dataset = Dataset::new(vec![
            record("a", 1.0, 10.0, 50.0, 1.0),
            record("me", 1.0, 20.0, 50.0, 1.0),
            record("b", 1.0, 20.0, 50.0, 1.0),
            record("c", 1.0, 30.0, 50.0, 1.0),
        ]);
        let params = DisplayParams {
            username: "me".to_string(),
            ..params()
        };

        let panels = build_panels(&dataset, &params).unwrap();

        let highlight = panels[0].highlight.as_ref().unwrap();
        assert_eq!(highlight.score, 20.0);
        assert_eq!(highlight.percentile, 0.75);
    }

    #[test]
    fn duplicate_user_rows_use_lowest_score() {
        let dataset = Dataset::new(vec![
            record("me", 1.0, 30.0, 50.0, 1.0),
            record("me", 1.0, 10.0, 50.0, 2.0),
            record("b", 1.0, 20.0, 50.0, 1.0),
        ]);
        let params = DisplayParams {
            username: "me".to_string(),
            ..params()
        };

        let panels = build_panels(&dataset, &params).unwrap();

        let highlight = panels[0].highlight.as_ref().unwrap();
        assert_eq!(highlight.score, 10.0);
        assert_eq!(highlight.percentile, 1.0);
    }

    #[test]
    fn unknown_user_has_no_highlight() {
        let dataset = Dataset::new(vec![record("a", 1.0, 3.0, 10.0, 1.0)]);
        let params = DisplayParams {
            username: "nobody".to_string(),
            ..params()
        };
        assert!(build_panels(&dataset, &params).unwrap()[0].highlight.is_none());
    }

    #[test]
    fn username_match_is_exact() {
        let dataset = Dataset::new(vec![record("a", 1.0, 3.0, 10.0, 1.0)]);
        let padded = DisplayParams {
            username: " a".to_string(),
            ..params()
        };
        assert!(build_panels(&dataset, &padded).unwrap()[0].highlight.is_none());

        let exact = DisplayParams {
            username: "a".to_string(),
            ..params()
        };
        assert!(build_panels(&dataset, &exact).unwrap()[0].highlight.is_some());
    }

    #[test]
    fn max_score_mode_prefers_smaller_on_tie() {
        let dataset = Dataset::new(vec![
            record("a", 1.0, 1.0, 20.0, 1.0),
            record("b", 1.0, 1.0, 10.0, 1.0),
        ]);
        assert_eq!(build_panels(&dataset, &params()).unwrap()[0].max_score, 10);
    }

    #[test]
    fn dataset_is_left_untouched() {
        let dataset = Dataset::new(vec![record("a", 1.0, 5.0, 20.0, 1.0)]);
        let before = dataset.records().to_vec();
        let params = DisplayParams {
            show_percent: true,
            ..params()
        };
        build_panels(&dataset, &params).unwrap();
        assert_eq!(dataset.records(), before.as_slice());
    }
}
