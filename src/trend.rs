//! SVG trend charts for the report.
//!
//! Renders one [`Panel`] as a standalone SVG document: one polyline per node,
//! a light grid, axis labels and a legend.

use crate::chart::Panel;
use chrono::{Duration, NaiveDateTime};
use std::fmt::{self, Write};

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 150.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 5;

const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#17becf",
];

/// Axis bounds with a non-zero span.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !min.is_finite() || !max.is_finite() {
            return None;
        }
        if (max - min).abs() < f64::EPSILON {
            Some(Self {
                min: min - 1.0,
                max: max + 1.0,
            })
        } else {
            Some(Self { min, max })
        }
    }

    fn padded(self, fraction: f64) -> Self {
        let pad = (self.max - self.min) * fraction;
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    fn scale(self, value: f64, from: f64, to: f64) -> f64 {
        from + (value - self.min) / (self.max - self.min) * (to - from)
    }

    fn tick(self, i: usize) -> f64 {
        self.min + (self.max - self.min) * i as f64 / TICKS as f64
    }
}

/// Render `panel` with the given title. `origin` labels the time axis.
pub fn render_svg(
    title: &str,
    panel: &Panel,
    origin: Option<NaiveDateTime>,
) -> Result<String, fmt::Error> {
    let plot_left = MARGIN_LEFT;
    let plot_right = WIDTH - MARGIN_RIGHT;
    let plot_top = MARGIN_TOP;
    let plot_bottom = HEIGHT - MARGIN_BOTTOM;

    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="{}" y="24" text-anchor="middle" font-size="16" font-weight="bold">{}</text>"#,
        WIDTH / 2.0,
        escape(title)
    )?;

    let points = panel.series.values().flatten();
    let x_range = Range::of(points.clone().map(|p| p[0]));
    let y_range = Range::of(points.map(|p| p[1])).map(|r| r.padded(0.05));

    let (Some(x_range), Some(y_range)) = (x_range, y_range) else {
        writeln!(
            svg,
            r##"<text x="{}" y="{}" text-anchor="middle" fill="#666">No data</text>"##,
            WIDTH / 2.0,
            HEIGHT / 2.0
        )?;
        svg.push_str("</svg>\n");
        return Ok(svg);
    };

    // Grid and tick labels
    for i in 0..=TICKS {
        let y_value = y_range.tick(i);
        let y = y_range.scale(y_value, plot_bottom, plot_top);
        writeln!(
            svg,
            r##"<line x1="{plot_left}" y1="{y:.1}" x2="{plot_right}" y2="{y:.1}" stroke="#ddd"/>"##
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{:.1}</text>"#,
            plot_left - 6.0,
            y + 4.0,
            y_value
        )?;

        let x_value = x_range.tick(i);
        let x = x_range.scale(x_value, plot_left, plot_right);
        writeln!(
            svg,
            r##"<line x1="{x:.1}" y1="{plot_top}" x2="{x:.1}" y2="{plot_bottom}" stroke="#ddd"/>"##
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            x,
            plot_bottom + 18.0,
            time_label(origin, x_value)
        )?;
    }

    // Axes
    writeln!(
        svg,
        r#"<rect x="{plot_left}" y="{plot_top}" width="{}" height="{}" fill="none" stroke="black"/>"#,
        plot_right - plot_left,
        plot_bottom - plot_top
    )?;
    writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">Time</text>"#,
        (plot_left + plot_right) / 2.0,
        HEIGHT - 16.0
    )?;
    writeln!(
        svg,
        r#"<text x="18" y="{:.1}" text-anchor="middle" transform="rotate(-90 18 {:.1})">{}</text>"#,
        (plot_top + plot_bottom) / 2.0,
        (plot_top + plot_bottom) / 2.0,
        escape(panel.y_label)
    )?;

    // One polyline per node, plus its legend entry
    for (index, (node, series)) in panel.series.iter().enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        let coords: Vec<String> = series
            .iter()
            .map(|[x, y]| {
                format!(
                    "{:.1},{:.1}",
                    x_range.scale(*x, plot_left, plot_right),
                    y_range.scale(*y, plot_bottom, plot_top)
                )
            })
            .collect();
        writeln!(
            svg,
            r#"<polyline fill="none" stroke="{color}" stroke-width="2" points="{}"/>"#,
            coords.join(" ")
        )?;

        let legend_y = plot_top + 10.0 + index as f64 * 18.0;
        writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{legend_y:.1}" x2="{:.1}" y2="{legend_y:.1}" stroke="{color}" stroke-width="3"/>"#,
            plot_right + 12.0,
            plot_right + 32.0
        )?;
        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}">{}</text>"#,
            plot_right + 38.0,
            legend_y + 4.0,
            escape(node)
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn time_label(origin: Option<NaiveDateTime>, seconds: f64) -> String {
    match origin {
        Some(origin) => (origin + Duration::milliseconds((seconds * 1000.0).round() as i64))
            .format("%H:%M:%S")
            .to_string(),
        None => format!("{seconds:.0}s"),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
