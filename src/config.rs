use crate::loader::Dataset;
use crate::types::ClusterKind;
use crate::view::{Filters, GrowthScope, Page, SectorChoice, YearSelection};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tea_dashboard",
    about = "West Java tea plantation dashboard: production, productivity, growth and clusters"
)]
pub struct Args {
    /// Primary dataset (one row per district and year).
    #[arg(long, env = "TEA_DATA", default_value = "perkebunan_teh.csv")]
    pub data: PathBuf,

    /// District location lookup used by the map page.
    #[arg(long, env = "TEA_LOCATIONS", default_value = "lokasi_wilayah.csv")]
    pub locations: PathBuf,

    /// Pages to render; repeat for several.
    #[arg(long = "page", value_enum)]
    pub pages: Vec<Page>,

    /// A single year or `all`. Defaults to the latest year in the data.
    #[arg(long)]
    pub year: Option<YearSelection>,

    /// Districts to compare; repeat for several. Defaults to the first
    /// five producing districts.
    #[arg(long = "district")]
    pub districts: Vec<String>,

    #[arg(long, value_enum, default_value = "smallholder")]
    pub sector: SectorChoice,

    /// `topN` or `all`.
    #[arg(long, default_value = "top5")]
    pub growth_scope: GrowthScope,

    #[arg(long, value_enum, default_value = "productivity")]
    pub cluster: ClusterKind,

    /// Write every displayed table as CSV into this directory.
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Write the rendered view model as JSON.
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Start the menu-driven shell instead of rendering once.
    #[arg(long, short)]
    pub interactive: bool,

    /// Rows shown per table or chart preview.
    #[arg(long, default_value_t = 10)]
    pub preview_rows: usize,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// Filters from the command line, falling back to the dataset defaults.
    pub fn filters(&self, dataset: &Dataset) -> Filters {
        let mut filters = Filters::defaults_for(dataset);
        if !self.pages.is_empty() {
            filters.pages = self.pages.clone();
        }
        if let Some(year) = self.year {
            filters.year = year;
        }
        if !self.districts.is_empty() {
            filters.districts = self.districts.clone();
        }
        filters.sector = self.sector;
        filters.growth_scope = self.growth_scope;
        filters.cluster = self.cluster;
        filters
    }
}

/// Logs go to stderr so stdout stays a clean report.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
