/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Text reports: posterior summaries, interval plots and LOO comparison tables.
//
// Created on: 25 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Reports
//!
//! Renders fitted models and comparisons with `comfy_table`, plus a
//! fixed-width interval plot for eyeballing shrinkage in a terminal.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};
use num_traits::ToPrimitive;

use crate::models::comparison::ComparisonRow;
use crate::models::regression::{FittedModel, ParameterSummary};
use crate::utils::usize_to_f64;

/// Width of the interval plot track in characters.
pub const INTERVAL_PLOT_WIDTH: usize = 48;

/// Posterior summary table: estimate, error, 95% interval, R-hat and ESS per
/// coefficient and for `sigma`.
#[must_use]
pub fn posterior_table(model: &FittedModel) -> String {
    let mut table = make_table(&[
        "parameter",
        "estimate",
        "est.error",
        "l-95% CI",
        "u-95% CI",
        "R-hat",
        "ESS",
    ]);
    for row in model.posterior_rows() {
        let mut name = Cell::new(&row.name);
        if row.name != "sigma" && row.summary.excludes_zero() {
            name = name.add_attribute(Attribute::Bold);
        }
        table.add_row(vec![
            name,
            Cell::new(format!("{:.2}", row.summary.mean)),
            Cell::new(format!("{:.2}", row.summary.std_dev)),
            Cell::new(format!("{:.2}", row.summary.q025)),
            Cell::new(format!("{:.2}", row.summary.q975)),
            rhat_cell(row.rhat),
            Cell::new(format!("{:.0}", row.ess)),
        ]);
    }
    table.to_string()
}

/// One line per slope: the 95% interval as `-`, the 50% interval as `=`,
/// the median as `o` and zero as `|`, on an axis shared by every row.
#[must_use]
pub fn interval_plot(model: &FittedModel) -> String {
    let rows = model
        .coefficient_names()
        .iter()
        .skip(1)
        .filter_map(|name| model.coefficient(name).map(|summary| (name.as_str(), summary)))
        .collect::<Vec<_>>();
    render_intervals(&rows, INTERVAL_PLOT_WIDTH)
}

fn render_intervals(rows: &[(&str, ParameterSummary)], width: usize) -> String {
    if rows.is_empty() || width < 3 {
        return String::new();
    }
    let lower = rows.iter().map(|(_, s)| s.q025).fold(0.0_f64, f64::min);
    let upper = rows.iter().map(|(_, s)| s.q975).fold(0.0_f64, f64::max);
    let span = if upper > lower { upper - lower } else { 1.0 };
    let label_width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    let last = width - 1;
    let position = |value: f64| -> usize {
        let scaled = ((value - lower) / span * usize_to_f64(last)).round();
        scaled.to_usize().unwrap_or(0).min(last)
    };

    let mut out = String::new();
    for (name, summary) in rows {
        let mut track = vec![' '; width];
        for cell in &mut track[position(summary.q025)..=position(summary.q975)] {
            *cell = '-';
        }
        for cell in &mut track[position(summary.q25)..=position(summary.q75)] {
            *cell = '=';
        }
        track[position(0.0)] = '|';
        track[position(summary.q50)] = 'o';
        out.push_str(&format!(
            "{name:>label_width$} {} [{:.2}, {:.2}]\n",
            track.iter().collect::<String>(),
            summary.q025,
            summary.q975
        ));
    }
    out.push_str(&format!(
        "{:>label_width$} {:<half$}{:>rest$}\n",
        "",
        format!("{lower:.2}"),
        format!("{upper:.2}"),
        half = width / 2,
        rest = width - width / 2,
    ));
    out
}

/// LOO comparison table; the best model's cells are highlighted.
#[must_use]
pub fn comparison_table(rows: &[ComparisonRow]) -> String {
    let mut table = make_table(&[
        "model",
        "elpd_diff",
        "se_diff",
        "elpd_loo",
        "se_elpd_loo",
        "p_loo",
        "looic",
    ]);
    let best_elpd = rows
        .iter()
        .map(|row| row.elpd_loo)
        .fold(f64::NEG_INFINITY, f64::max);
    let best_looic = rows.iter().map(|row| row.looic).fold(f64::INFINITY, f64::min);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.name),
            Cell::new(format!("{:.2}", row.elpd_diff)),
            Cell::new(format!("{:.2}", row.se_diff)),
            highlight_metric_cell(row.elpd_loo, best_elpd, 2),
            Cell::new(format!("{:.2}", row.se_elpd_loo)),
            Cell::new(format!("{:.2}", row.p_loo)),
            highlight_metric_cell(row.looic, best_looic, 2),
        ]);
    }
    table.to_string()
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

fn rhat_cell(rhat: f64) -> Cell {
    let cell = Cell::new(format!("{rhat:.3}"));
    if rhat > 1.05 || rhat.is_nan() {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

fn highlight_metric_cell(value: f64, best: f64, precision: usize) -> Cell {
    let is_best = (value - best).abs() < 1e-12;
    if is_best {
        Cell::new(format!("{value:.precision$}"))
            .fg(Color::Green)
            .add_attribute(Attribute::Bold)
    } else {
        Cell::new(format!("{value:.precision$}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(q025: f64, q50: f64, q975: f64) -> ParameterSummary {
        ParameterSummary {
            mean: q50,
            std_dev: (q975 - q025) / 4.0,
            q025,
            q25: q025 + (q50 - q025) / 2.0,
            q50,
            q75: q50 + (q975 - q50) / 2.0,
            q975,
        }
    }

    #[test]
    fn intervals_share_an_axis_and_mark_zero() {
        let plot = render_intervals(
            &[("age", summary(-4.0, -3.0, -2.0)), ("pets", summary(-0.5, 0.1, 0.6))],
            21,
        );
        let lines = plot.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(" age "));
        assert!(lines[1].starts_with("pets "));

        // axis is [-4, 0.6]; zero sits at column round(4 / 4.6 * 20) = 17
        let track = |line: &str| line.chars().skip(5).take(21).collect::<Vec<_>>();
        assert_eq!(track(lines[0])[17], '|');
        assert_eq!(track(lines[0])[0], '-');
        assert!(track(lines[1]).contains(&'o'));
        assert!(lines[2].contains("-4.00") && lines[2].contains("0.60"));
    }

    #[test]
    fn intervals_of_nothing_render_nothing() {
        assert!(render_intervals(&[], 10).is_empty());
    }

    #[test]
    fn comparison_table_lists_models_in_rank_order() {
        let rows = vec![
            ComparisonRow {
                name: "horseshoe".to_string(),
                elpd_diff: 0.0,
                se_diff: 0.0,
                elpd_loo: -1210.4,
                se_elpd_loo: 9.8,
                p_loo: 6.1,
                looic: 2420.8,
            },
            ComparisonRow {
                name: "naive".to_string(),
                elpd_diff: -3.2,
                se_diff: 1.9,
                elpd_loo: -1213.6,
                se_elpd_loo: 10.1,
                p_loo: 11.4,
                looic: 2427.2,
            },
        ];
        let rendered = comparison_table(&rows);
        let horseshoe = rendered.find("horseshoe").unwrap();
        let naive = rendered.find("naive").unwrap();
        assert!(horseshoe < naive);
        assert!(rendered.contains("-3.20"));
        assert!(rendered.contains("elpd_diff"));
    }
}
