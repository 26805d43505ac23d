mod app;
mod color;
mod config;
mod data;
mod state;
mod ui;

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use eframe::egui;

use app::RustyDashApp;
use config::DatasetSchema;
use data::loader;
use state::{AppState, TableKind};

#[derive(Parser)]
#[command(name = "rusty-dash")]
#[command(about = "Filter-and-aggregate dashboard for tabular datasets", long_about = None)]
struct Cli {
    /// Preset name (superstore, mortality, mortality-rate) or a .json schema
    #[arg(long, global = true, default_value = "superstore")]
    dataset: String,
    /// Data file to load instead of the dataset's default
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline without a window and write one table as CSV
    Export {
        /// Grouping keys to keep; none applies the dataset's fallback
        #[arg(long, num_args = 1..)]
        select: Vec<String>,
        /// First day of the date range (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day of the date range (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Measure columns to keep; none keeps every measure
        #[arg(long, num_args = 1..)]
        measure: Vec<String>,
        #[arg(long, value_enum, default_value_t = TableKind::Aggregate)]
        table: TableKind,
        /// Output path; defaults to the dataset's export file name
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let schema = DatasetSchema::resolve(&cli.dataset)
        .with_context(|| format!("resolving dataset `{}`", cli.dataset))?;

    match cli.command {
        Some(Commands::Export {
            select,
            start,
            end,
            measure,
            table,
            out,
        }) => {
            let (raw, source) = loader::load_dataset(cli.data.as_deref(), &schema)
                .context("loading dataset")?;
            let mut state = AppState::new(schema);
            state.set_dataset(raw, source);

            for key in select.iter().filter(|k| !state.key_options.contains(k)) {
                log::warn!("`{key}` does not occur in column `{}`", state.schema.group_key);
            }
            for name in state.schema.unknown_measures(&measure) {
                log::warn!(
                    "`{name}` is not a measure of `{}` (expected one of {})",
                    state.schema.name,
                    state.schema.measure_columns.join(", ")
                );
            }
            state.selected_keys = select.into_iter().collect();
            state.selected_measures = measure.into_iter().collect();
            if start.is_some() || end.is_some() {
                if state.date_bounds.is_none() {
                    log::warn!("dataset has no dates; ignoring --start/--end");
                }
                state.date_filter_enabled = true;
                state.date_start = start.unwrap_or(NaiveDate::MIN);
                state.date_end = end.unwrap_or(NaiveDate::MAX);
            }
            state.rerun();
            if let Some(msg) = state.status_message.take() {
                bail!(msg);
            }

            let download = state.export(table)?;
            let path = out.unwrap_or_else(|| PathBuf::from(&download.file_name));
            download.save(&path)?;
            let rows = state.table(table).map_or(0, |t| t.len());
            println!("Wrote {rows} rows to {}.", path.display());
            Ok(())
        }
        None => {
            let title = schema.title.clone();
            let options = eframe::NativeOptions {
                viewport: egui::ViewportBuilder::default()
                    .with_inner_size([1200.0, 800.0])
                    .with_min_inner_size([600.0, 400.0]),
                ..Default::default()
            };

            eframe::run_native(
                &title,
                options,
                Box::new(move |_cc| Ok(Box::new(RustyDashApp::new(schema, cli.data.as_deref())))),
            )
            .map_err(|e| anyhow::anyhow!("dashboard window failed: {e}"))
        }
    }
}
