use eframe::egui::{Align, Color32, Layout, RichText, Ui};
use egui_extras::{Column, TableBuilder};

use crate::data::model::Value;
use crate::state::{AppState, TableKind};

/// Tabular view of one pipeline output.
pub fn table_view(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        ui.selectable_value(&mut state.table_kind, TableKind::Filtered, "Filtered rows");
        ui.selectable_value(&mut state.table_kind, TableKind::Aggregate, "Aggregate");
        ui.selectable_value(&mut state.table_kind, TableKind::Hierarchy, "Hierarchy");
    });

    let Some(table) = state.table(state.table_kind) else {
        return;
    };
    ui.small(format!("{} rows", table.len()));
    if table.is_empty() {
        ui.label("No rows match the current filters.");
        return;
    }

    TableBuilder::new(ui)
        .striped(true)
        .resizable(true)
        .cell_layout(Layout::left_to_right(Align::Center))
        .columns(Column::auto().at_least(60.0), table.columns.len())
        .header(20.0, |mut header| {
            for name in &table.columns {
                header.col(|ui| {
                    ui.strong(name.as_str());
                });
            }
        })
        .body(|body| {
            body.rows(18.0, table.len(), |mut row| {
                let record = &table.rows[row.index()];
                for value in record {
                    row.col(|ui| cell(ui, value));
                }
            });
        });
}

fn cell(ui: &mut Ui, value: &Value) {
    match value {
        Value::Null => {
            ui.label(RichText::new("n/a").italics().color(Color32::GRAY));
        }
        Value::Number(_) => {
            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.label(value.to_string());
            });
        }
        _ => {
            ui.label(value.to_string());
        }
    }
}
