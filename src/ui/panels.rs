use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;

use crate::data::loader::ALLOWED_EXTENSIONS;
use crate::state::{AppState, TableKind};

// ---------------------------------------------------------------------------
// Left side panel – filter widgets
// ---------------------------------------------------------------------------

/// Render the left filter panel.  Widgets only touch the selection fields of
/// [`AppState`]; every change reruns the pipeline.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading(state.schema.title.as_str());
    ui.separator();

    if state.raw.is_none() {
        ui.label("No dataset loaded.");
        return;
    }

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            date_filter(ui, state);
            ui.separator();
            key_filter(ui, state);
            ui.separator();
            measure_filter(ui, state);
        });
}

fn date_filter(ui: &mut Ui, state: &mut AppState) {
    let Some((lo, hi)) = state.date_bounds else {
        return;
    };

    ui.strong("Date range");
    let mut enabled = state.date_filter_enabled;
    let mut start = state.date_start;
    let mut end = state.date_end;
    let mut changed = ui.checkbox(&mut enabled, "Filter by date").changed();

    ui.add_enabled_ui(enabled, |ui: &mut Ui| {
        ui.horizontal(|ui: &mut Ui| {
            ui.label("Start");
            changed |= ui
                .add(DatePickerButton::new(&mut start).id_salt("date_start"))
                .changed();
        });
        ui.horizontal(|ui: &mut Ui| {
            ui.label("End");
            changed |= ui
                .add(DatePickerButton::new(&mut end).id_salt("date_end"))
                .changed();
        });
    });
    ui.small(format!("Data spans {lo} to {hi}"));
    if enabled && start > end {
        ui.colored_label(Color32::YELLOW, "Start is after end: nothing matches.");
    }

    if changed {
        state.set_date_filter(enabled, start, end);
    }
}

fn key_filter(ui: &mut Ui, state: &mut AppState) {
    let n_selected = state.selected_keys.len();
    let n_total = state.key_options.len();
    let header = format!("{}  ({n_selected}/{n_total})", state.schema.group_key);

    egui::CollapsingHeader::new(RichText::new(header).strong())
        .id_salt("key_filter")
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.small_button("All").clicked() {
                    state.select_all_keys();
                }
                if ui.small_button("None").clicked() {
                    state.clear_keys();
                }
            });
            if state.selected_keys.is_empty() {
                ui.small(fallback_hint(state));
            }

            for key in state.key_options.clone() {
                let mut checked = state.selected_keys.contains(&key);
                let text = RichText::new(&key).color(state.key_colors.color_for(&key));
                if ui.checkbox(&mut checked, text).changed() {
                    state.toggle_key(&key);
                }
            }
        });
}

fn measure_filter(ui: &mut Ui, state: &mut AppState) {
    if state.schema.measure_columns.is_empty() {
        return;
    }
    egui::CollapsingHeader::new(RichText::new("Measures").strong())
        .id_salt("measure_filter")
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            if state.selected_measures.is_empty() {
                ui.small("All measures shown.");
            }
            for measure in state.schema.measure_columns.clone() {
                let mut checked = state.selected_measures.contains(&measure);
                if ui.checkbox(&mut checked, measure.as_str()).changed() {
                    state.toggle_measure(&measure);
                }
            }
        });
}

fn fallback_hint(state: &AppState) -> String {
    use crate::data::filter::FallbackPolicy;
    match &state.schema.fallback {
        FallbackPolicy::AllRows => "Nothing selected: showing every row.".to_string(),
        FallbackPolicy::TopK { k, by } => {
            format!("Nothing selected: showing the top {k} rows by {by}.")
        }
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            ui.separator();
            for (kind, label) in [
                (TableKind::Filtered, "Export filtered rows…"),
                (TableKind::Aggregate, "Export aggregate…"),
                (TableKind::Hierarchy, "Export hierarchy…"),
            ] {
                if ui
                    .add_enabled(state.output.is_some(), egui::Button::new(label))
                    .clicked()
                {
                    save_export_dialog(state, kind);
                    ui.close_menu();
                }
            }
        });

        ui.separator();

        if let (Some(raw), Some(source)) = (&state.raw, &state.source) {
            let shown = state.output.as_ref().map_or(0, |o| o.filtered.len());
            ui.label(format!("{source}: {} rows loaded, {shown} shown", raw.len()));
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open dataset")
        .add_filter("Supported files", &ALLOWED_EXTENSIONS)
        .add_filter("Delimited text", &["csv", "txt"])
        .add_filter("Spreadsheets", &["xlsx", "xls"])
        .pick_file();

    if let Some(path) = file {
        state.load(Some(&path));
    }
}

pub fn save_export_dialog(state: &mut AppState, kind: TableKind) {
    let download = match state.export(kind) {
        Ok(download) => download,
        Err(e) => {
            log::error!("Export failed: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
            return;
        }
    };

    let target = rfd::FileDialog::new()
        .set_title("Save CSV extract")
        .set_file_name(download.file_name.as_str())
        .add_filter("CSV", &["csv"])
        .save_file();

    if let Some(path) = target {
        if let Err(e) = download.save(&path) {
            log::error!("Export failed: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}
