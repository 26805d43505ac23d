use std::f64::consts::TAU;

use eframe::egui::{self, Ui};
use egui_plot::{Bar, BarChart, Legend, Plot, PlotPoint, PlotPoints, Polygon, Text};

use crate::data::model::Table;
use crate::state::{AppState, ChartKind};
use crate::ui::{table, treemap};

// ---------------------------------------------------------------------------
// Chart area (central panel)
// ---------------------------------------------------------------------------

/// Render the view selector and the selected view.
pub fn chart_area(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        for kind in ChartKind::ALL {
            ui.selectable_value(&mut state.chart, kind, kind.label());
        }
    });
    ui.separator();

    let Some(output) = &state.output else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a dataset to get started  (File → Open…)");
        });
        return;
    };

    if output.filtered.is_empty() && state.chart != ChartKind::Table {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No rows match the current filters.");
        });
        return;
    }

    match state.chart {
        ChartKind::Bar => bar_chart(ui, state),
        ChartKind::Pie => pie_chart(ui, state),
        ChartKind::Treemap => treemap::treemap(ui, state),
        ChartKind::StackedBar => stacked_bar_chart(ui, state),
        ChartKind::Table => table::table_view(ui, state),
    }
}

// ---------------------------------------------------------------------------
// Series extraction
// ---------------------------------------------------------------------------

/// `(key, value)` pairs of one aggregate column; undefined values are
/// skipped rather than drawn as zero.
pub fn measure_series(table: &Table, key: &str, measure: &str) -> Vec<(String, f64)> {
    let (Some(ki), Some(mi)) = (table.column_index(key), table.column_index(measure)) else {
        return Vec::new();
    };
    table
        .rows
        .iter()
        .filter_map(|row| Some((row[ki].key_label(), row[mi].as_f64()?)))
        .collect()
}

/// One pie slice: label, angular span in radians and share of the total.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub share: f64,
}

/// Pie slices for the positive values of `series`, clockwise from twelve
/// o'clock.
pub fn pie_slices(series: &[(String, f64)]) -> Vec<Slice> {
    let total: f64 = series.iter().map(|(_, v)| v.max(0.0)).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut angle = 0.0;
    series
        .iter()
        .filter(|(_, v)| *v > 0.0)
        .map(|(label, v)| {
            let share = v / total;
            let slice = Slice {
                label: label.clone(),
                start: angle,
                end: angle + share * TAU,
                share,
            };
            angle = slice.end;
            slice
        })
        .collect()
}

/// Why a single-measure chart has nothing to draw, if it doesn't.
pub fn measure_notice(table: &Table, key: &str, measure: &str) -> Option<String> {
    if !table.has_column(measure) {
        return Some(format!("`{measure}` is not among the selected measures."));
    }
    if measure_series(table, key, measure).is_empty() {
        return Some(format!("No defined `{measure}` values to chart."));
    }
    None
}

/// One stacked segment: bar position, where it starts and its height.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub base: f64,
    pub value: f64,
}

/// Stack each measure's values per bar position.  Positive values grow
/// upwards from zero and negative ones downwards; undefined values leave no
/// segment at all.
pub fn stack_segments(columns: &[Vec<Option<f64>>]) -> Vec<Vec<Segment>> {
    let width = columns.iter().map(Vec::len).max().unwrap_or(0);
    let mut above = vec![0.0; width];
    let mut below = vec![0.0; width];
    columns
        .iter()
        .map(|values| {
            values
                .iter()
                .enumerate()
                .filter_map(|(index, v)| {
                    let value = (*v)?;
                    let level = if value >= 0.0 { &mut above[index] } else { &mut below[index] };
                    let base = *level;
                    *level += value;
                    Some(Segment { index, base, value })
                })
                .collect()
        })
        .collect()
}

/// Axis labels for categorical bar charts: integer marks map to keys.
fn category_formatter(labels: Vec<String>) -> impl Fn(egui_plot::GridMark, &std::ops::RangeInclusive<f64>) -> String {
    move |mark, _range| {
        let idx = mark.value.round();
        if (mark.value - idx).abs() > 1e-6 || idx < 0.0 {
            return String::new();
        }
        labels.get(idx as usize).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Bar chart: chart measure by key
// ---------------------------------------------------------------------------

fn bar_chart(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        return;
    };
    let measure = &state.schema.chart_measure;
    if let Some(notice) = measure_notice(&output.aggregate, &state.schema.group_key, measure) {
        ui.label(notice);
        return;
    }
    let series = measure_series(&output.aggregate, &state.schema.group_key, measure);

    let bars: Vec<Bar> = series
        .iter()
        .enumerate()
        .map(|(i, (label, v))| {
            Bar::new(i as f64, *v)
                .name(label)
                .fill(state.key_colors.color_for(label))
                .width(0.7)
        })
        .collect();
    let labels = series.into_iter().map(|(label, _)| label).collect();

    Plot::new("bar_chart")
        .y_axis_label(measure.as_str())
        .x_axis_formatter(category_formatter(labels))
        .allow_scroll(false)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new(bars).name(measure));
        });
}

// ---------------------------------------------------------------------------
// Pie chart: share of the chart measure by key
// ---------------------------------------------------------------------------

fn pie_chart(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        return;
    };
    let (key, measure) = (&state.schema.group_key, &state.schema.chart_measure);
    if let Some(notice) = measure_notice(&output.aggregate, key, measure) {
        ui.label(notice);
        return;
    }
    let slices = pie_slices(&measure_series(&output.aggregate, key, measure));
    if slices.is_empty() {
        ui.label(format!(
            "No positive `{}` values to chart.",
            state.schema.chart_measure
        ));
        return;
    }

    Plot::new("pie_chart")
        .legend(Legend::default())
        .data_aspect(1.0)
        .show_axes(false)
        .show_grid(false)
        .allow_drag(false)
        .allow_scroll(false)
        .allow_zoom(false)
        .show(ui, |plot_ui| {
            for slice in &slices {
                let steps = ((slice.end - slice.start) / TAU * 128.0).ceil().max(2.0) as usize;
                let mut points = vec![[0.0, 0.0]];
                points.extend((0..=steps).map(|s| {
                    let a = slice.start + (slice.end - slice.start) * s as f64 / steps as f64;
                    [a.sin(), a.cos()]
                }));
                plot_ui.polygon(
                    Polygon::new(PlotPoints::new(points))
                        .name(&slice.label)
                        .fill_color(state.key_colors.color_for(&slice.label)),
                );

                if slice.share >= 0.03 {
                    let mid = (slice.start + slice.end) / 2.0;
                    plot_ui.text(Text::new(
                        PlotPoint::new(0.65 * mid.sin(), 0.65 * mid.cos()),
                        format!("{:.1}%", slice.share * 100.0),
                    ));
                }
            }
        });
}

// ---------------------------------------------------------------------------
// Stacked bar chart: every retained measure per key
// ---------------------------------------------------------------------------

fn stacked_bar_chart(ui: &mut Ui, state: &AppState) {
    let Some(output) = &state.output else {
        return;
    };
    let aggregate = &output.aggregate;
    let key = &state.schema.group_key;
    let labels: Vec<String> = aggregate
        .column_values(key)
        .map(|vals| vals.into_iter().map(|v| v.key_label()).collect())
        .unwrap_or_default();

    let measures: Vec<&String> = state
        .schema
        .measure_columns
        .iter()
        .filter(|m| aggregate.has_column(m))
        .collect();
    let columns: Vec<Vec<Option<f64>>> = measures
        .iter()
        .map(|m| {
            aggregate
                .column_values(m)
                .map(|vals| vals.into_iter().map(|v| v.as_f64()).collect())
                .unwrap_or_default()
        })
        .collect();

    let charts: Vec<BarChart> = measures
        .iter()
        .zip(stack_segments(&columns))
        .map(|(measure, segments)| {
            let bars: Vec<Bar> = segments
                .into_iter()
                .map(|s| Bar::new(s.index as f64, s.value).base_offset(s.base).width(0.7))
                .collect();
            BarChart::new(bars)
                .name(measure)
                .color(state.measure_colors.color_for(measure))
        })
        .collect();

    if charts.is_empty() {
        ui.label("No measure columns selected.");
        return;
    }

    Plot::new("stacked_bar_chart")
        .legend(Legend::default())
        .x_axis_formatter(category_formatter(labels))
        .allow_scroll(false)
        .show(ui, |plot_ui| {
            for chart in charts {
                plot_ui.bar_chart(chart);
            }
        });
    ui.add_space(2.0);
    ui.small(egui::RichText::new("Undefined measure values are left out of the stacks.").weak());
}
