// src/services/chart.rs

//! Grid layout of per-question histograms, rendered as SVG.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::Serialize;

use crate::{error::AppError, models::panel::HistogramPanel};

pub const BIN_COUNT: usize = 30;
pub const EMPTY_MESSAGE: &str = "No questions match the current filters";

const CELL_WIDTH: u32 = 450;
const CELL_HEIGHT: u32 = 300;
const EMPTY_HEIGHT: u32 = 60;
const MARKER_DASHES: usize = 24;

const BAR_FILL: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
const BAR_EDGE: RGBColor = RGBColor(0xdd, 0xdd, 0xdd);
const GRID: RGBColor = RGBColor(0xbb, 0xbb, 0xbb);
const MARKER: RGBColor = RGBColor(0xff, 0xa5, 0x00);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Vertical marker and label for the highlighted user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub x: f64,
    pub username: String,
    /// e.g. `7, top 25%`
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subplot {
    pub row: usize,
    pub col: usize,
    pub qnumber: i64,
    pub title: String,
    pub bins: Vec<Bin>,
    pub marker: Option<Marker>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub nrow: usize,
    pub ncol: usize,
    pub subplots: Vec<Subplot>,
}

/// Lays panels out row-major on a grid `ncol` wide, with just enough rows.
pub fn render(panels: &[HistogramPanel], ncol: usize) -> Figure {
    let ncol = ncol.max(1);
    let nrow = panels.len().div_ceil(ncol);
    tracing::debug!("nrow, ncol: {}, {}", nrow, ncol);

    let subplots = panels
        .iter()
        .enumerate()
        .map(|(i, panel)| Subplot {
            row: i / ncol,
            col: i % ncol,
            qnumber: panel.qnumber,
            title: panel_title(panel),
            bins: histogram(&panel.scores, BIN_COUNT),
            marker: panel.highlight.as_ref().map(|h| Marker {
                x: h.score,
                username: h.username.clone(),
                caption: format!(
                    "{}, top {}%",
                    h.score.trunc() as i64,
                    (100.0 * h.percentile).round() as i64
                ),
            }),
        })
        .collect();

    Figure {
        nrow,
        ncol,
        subplots,
    }
}

pub fn panel_title(panel: &HistogramPanel) -> String {
    format!(
        "{} (max: {}) | mean={}, median={}",
        panel.qnumber,
        panel.max_score,
        one_decimal(panel.mean),
        one_decimal(panel.median)
    )
}

fn one_decimal(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}", v))
}

/// Equal-width bins spanning [min, max]; the last bin is closed on the
/// right. A single distinct value gets a unit-wide range around it.
pub fn histogram(values: &[f64], bins: usize) -> Vec<Bin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins { hi } else { lo + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

impl Figure {
    pub fn width(&self) -> u32 {
        CELL_WIDTH * self.ncol as u32
    }

    pub fn height(&self) -> u32 {
        CELL_HEIGHT * self.nrow as u32
    }

    pub fn is_empty(&self) -> bool {
        self.subplots.is_empty()
    }

    /// Draws the figure into an SVG document. An empty figure becomes a
    /// single line of text.
    pub fn to_svg(&self) -> Result<String, AppError> {
        let mut svg = String::new();
        {
            if self.is_empty() {
                let root = SVGBackend::with_string(&mut svg, (CELL_WIDTH, EMPTY_HEIGHT))
                    .into_drawing_area();
                root.fill(&WHITE)?;
                root.draw(&Text::new(
                    EMPTY_MESSAGE,
                    (CELL_WIDTH as i32 / 2, EMPTY_HEIGHT as i32 / 2),
                    centered(("sans-serif", 14).into_font()),
                ))?;
                root.present()?;
            } else {
                let root = SVGBackend::with_string(&mut svg, (self.width(), self.height()))
                    .into_drawing_area();
                root.fill(&WHITE)?;
                let cells = root.split_evenly((self.nrow, self.ncol));
                for subplot in &self.subplots {
                    if let Some(cell) = cells.get(subplot.row * self.ncol + subplot.col) {
                        draw_subplot(cell, subplot)?;
                    }
                }
                root.present()?;
            }
        }
        Ok(svg)
    }
}

fn centered(font: FontDesc<'_>) -> TextStyle<'_> {
    font.color(&BLACK).pos(Pos::new(HPos::Center, VPos::Center))
}

fn draw_subplot(
    cell: &DrawingArea<SVGBackend<'_>, Shift>,
    subplot: &Subplot,
) -> Result<(), AppError> {
    let (Some(first), Some(last)) = (subplot.bins.first(), subplot.bins.last()) else {
        let mut chart = ChartBuilder::on(cell)
            .caption(&subplot.title, ("sans-serif", 12))
            .margin(8)
            .x_label_area_size(24)
            .y_label_area_size(36)
            .build_cartesian_2d(0f64..1f64, 0f64..1f64)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(0)
            .y_labels(0)
            .draw()?;
        chart.draw_series(std::iter::once(Text::new(
            "no data",
            (0.5, 0.5),
            centered(("sans-serif", 12).into_font()),
        )))?;
        return Ok(());
    };

    let (lo, hi) = (first.lower, last.upper);
    let max_count = subplot.bins.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    let top = max_count as f64 * 1.1;

    let mut chart = ChartBuilder::on(cell)
        .caption(&subplot.title, ("sans-serif", 12))
        .margin(8)
        .x_label_area_size(24)
        .y_label_area_size(36)
        .build_cartesian_2d(lo..hi, 0f64..top)?;
    chart
        .configure_mesh()
        .light_line_style(TRANSPARENT.stroke_width(1))
        .bold_line_style(GRID.mix(0.6).stroke_width(1))
        .x_labels(5)
        .y_labels(5)
        .draw()?;

    let filled: Vec<&Bin> = subplot.bins.iter().filter(|b| b.count > 0).collect();
    chart.draw_series(filled.iter().map(|b| {
        Rectangle::new([(b.lower, 0.0), (b.upper, b.count as f64)], BAR_FILL.filled())
    }))?;
    chart.draw_series(filled.iter().map(|b| {
        Rectangle::new(
            [(b.lower, 0.0), (b.upper, b.count as f64)],
            BAR_EDGE.stroke_width(1),
        )
    }))?;

    if let Some(marker) = &subplot.marker {
        let dash = top / MARKER_DASHES as f64;
        chart.draw_series((0..MARKER_DASHES).step_by(2).map(|i| {
            PathElement::new(
                vec![(marker.x, dash * i as f64), (marker.x, dash * (i + 1) as f64)],
                MARKER.stroke_width(2),
            )
        }))?;

        let chars = marker.username.chars().count().max(marker.caption.chars().count());
        let box_width = (chars as i32 * 7 + 12).min(CELL_WIDTH as i32 * 8 / 10);
        chart.draw_series(std::iter::once(
            EmptyElement::at((lo + (hi - lo) * 0.05, top * 0.9))
                + Rectangle::new([(0, 0), (box_width, 36)], MARKER.mix(0.5).filled())
                + Text::new(marker.username.clone(), (6, 4), ("sans-serif", 12).into_font())
                + Text::new(marker.caption.clone(), (6, 19), ("sans-serif", 12).into_font()),
        ))?;
    }
    Ok(())
}
