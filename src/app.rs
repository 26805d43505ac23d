use std::path::Path;

use eframe::egui;

use crate::config::DatasetSchema;
use crate::state::AppState;
use crate::ui::{charts, panels};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct RustyDashApp {
    pub state: AppState,
}

impl RustyDashApp {
    /// Build the app and load the initial dataset (upload or default).
    pub fn new(schema: DatasetSchema, upload: Option<&Path>) -> Self {
        let mut state = AppState::new(schema);
        state.load(upload);
        Self { state }
    }
}

impl eframe::App for RustyDashApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: filters ----
        egui::SidePanel::left("filter_panel")
            .default_width(240.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: charts ----
        egui::CentralPanel::default().show(ctx, |ui| {
            charts::chart_area(ui, &mut self.state);
        });
    }
}
