// src/handlers/page.rs

use std::fmt::Write as _;

use axum::{
    extract::{Query, State},
    response::Html,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        panel::QuestionOption,
        params::{DisplayParams, GRID_CHOICES, TRIAL_CHOICES},
    },
    services::{chart, pipeline},
    state::AppState,
    utils::html::escape_text,
};

const PAGE_TITLE: &str = "Mondo quiz score distribution";

/// Values the page needs beyond the controls themselves.
struct PageContext<'a> {
    params: &'a DisplayParams,
    questions: &'a [QuestionOption],
    data_as_of: Option<&'a str>,
    banners: &'a [String],
    figure_svg: &'a str,
}

/// Serves the dashboard: controls, data timestamp, download link and the
/// histogram grid for the submitted parameters.
///
/// Refresh failures and percent-mode data errors are shown as banners rather
/// than failing the whole page.
pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<DisplayParams>,
) -> Result<Html<String>, AppError> {
    if let Err(validation_errors) = params.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let current = state.current_dataset().await?;
    let offset = state.config.display_offset();
    let questions = current.dataset.question_options(offset);
    let data_as_of = current.dataset.data_as_of(offset);

    let mut banners: Vec<String> = current.warning.into_iter().collect();
    let figure_svg = match pipeline::build_panels(&current.dataset, &params) {
        Ok(panels) => chart::render(&panels, params.ncol).to_svg()?,
        Err(AppError::DataIntegrity(msg)) => {
            banners.push(msg);
            chart::render(&[], params.ncol).to_svg()?
        }
        Err(e) => return Err(e),
    };

    Ok(Html(render_page(&PageContext {
        params: &params,
        questions: &questions,
        data_as_of: data_as_of.as_deref(),
        banners: &banners,
        figure_svg: &figure_svg,
    })))
}

fn selected(on: bool) -> &'static str {
    if on { " selected" } else { "" }
}

fn checked(on: bool) -> &'static str {
    if on { " checked" } else { "" }
}

fn trial_label(trial: Option<i64>) -> String {
    match trial {
        None => "All".to_string(),
        Some(t) => format!("Attempt {}", t),
    }
}

fn render_page(ctx: &PageContext<'_>) -> String {
    let params = ctx.params;
    let mut html = String::new();

    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html lang='en'>");
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "  <meta charset='utf-8'>");
    let _ = writeln!(html, "  <title>{}</title>", PAGE_TITLE);
    let _ = writeln!(
        html,
        "  <style>body{{font-family:sans-serif;margin:1.5rem}}form{{display:flex;flex-wrap:wrap;gap:1rem;align-items:end}}label{{display:flex;flex-direction:column;font-size:.9rem}}.banner{{background:#fdecea;border:1px solid #f5c2c7;padding:.5rem 1rem;margin:.5rem 0}}.meta{{display:flex;gap:2rem;margin:1rem 0}}</style>"
    );
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "  <h3>{}</h3>", PAGE_TITLE);
    let _ = writeln!(html, "  <p>Aggregated from results posted by players.</p>");

    for banner in ctx.banners {
        let _ = writeln!(html, "  <div class='banner'>{}</div>", escape_text(banner));
    }

    let _ = writeln!(html, "  <form method='get' action='/'>");
    let _ = writeln!(
        html,
        "    <label>Username<input type='text' name='username' placeholder='username' value='{}'></label>",
        escape_text(&params.username)
    );

    let _ = writeln!(html, "    <label>Question<select name='maxq'>");
    for q in ctx.questions {
        let _ = writeln!(
            html,
            "      <option value='{}'{}>{} ({})</option>",
            q.qnumber,
            selected(params.maxq == Some(q.qnumber)),
            q.qnumber,
            q.date
        );
    }
    let _ = writeln!(html, "    </select></label>");

    let _ = writeln!(html, "    <label>Attempt<select name='trial'>");
    for trial in TRIAL_CHOICES {
        let value = trial.map_or_else(|| "all".to_string(), |t| t.to_string());
        let _ = writeln!(
            html,
            "      <option value='{}'{}>{}</option>",
            value,
            selected(params.trial == trial),
            trial_label(trial)
        );
    }
    let _ = writeln!(html, "    </select></label>");

    let _ = writeln!(
        html,
        "    <label><span><input type='checkbox' name='show_percent'{}> Percent score</span><span><input type='checkbox' name='include_maxscore'{}> Include max score</span></label>",
        checked(params.show_percent),
        checked(params.include_maxscore)
    );

    for (name, label, current) in [("nrow", "Rows", params.nrow), ("ncol", "Columns", params.ncol)] {
        let _ = writeln!(html, "    <label>{}<select name='{}'>", label, name);
        for n in GRID_CHOICES {
            let _ = writeln!(
                html,
                "      <option value='{}'{}>{}</option>",
                n,
                selected(n == current),
                n
            );
        }
        let _ = writeln!(html, "    </select></label>");
    }

    let _ = writeln!(html, "    <button type='submit'>Update</button>");
    let _ = writeln!(html, "  </form>");

    let _ = writeln!(html, "  <div class='meta'>");
    let _ = writeln!(
        html,
        "    <span>Data as of: {}</span>",
        ctx.data_as_of.unwrap_or("unknown")
    );
    let _ = writeln!(
        html,
        "    <a href='/api/dataset/export.csv' download>Download data</a>"
    );
    let _ = writeln!(html, "  </div>");

    let _ = writeln!(html, "  <figure>");
    html.push_str(ctx.figure_svg);
    let _ = writeln!(html, "  </figure>");
    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(params: &DisplayParams, banners: &[String]) -> String {
        let questions = vec![
            QuestionOption { qnumber: 12, date: "2022/05/12".to_string() },
            QuestionOption { qnumber: 11, date: "2022/05/11".to_string() },
        ];
        render_page(&PageContext {
            params,
            questions: &questions,
            data_as_of: Some("2022/05/12 21:00:00"),
            banners,
            figure_svg: "<svg></svg>",
        })
    }

    #[test]
    fn controls_reflect_submitted_parameters() {
        let params = DisplayParams {
            maxq: Some(11),
            trial: Some(2),
            show_percent: true,
            nrow: 4,
            ..DisplayParams::default()
        };
        let html = page(&params, &[]);

        assert!(html.contains("<option value='11' selected>11 (2022/05/11)</option>"));
        assert!(html.contains("<option value='2' selected>Attempt 2</option>"));
        assert!(html.contains("name='show_percent' checked"));
        assert!(html.contains("name='include_maxscore'>"));
        assert!(html.contains("Data as of: 2022/05/12 21:00:00"));
        assert!(html.contains("/api/dataset/export.csv"));
        assert!(html.contains("<svg></svg>"));
    }

    #[test]
    fn banners_and_username_are_escaped() {
        let params = DisplayParams {
            username: "'><script>".to_string(),
            ..DisplayParams::default()
        };
        let html = page(&params, &["<b>bucket down</b>".to_string()]);

        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>bucket"));
        assert!(html.contains("class='banner'"));
    }
}
