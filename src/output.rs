use crate::chart::{ChartSpec, TableView};
use crate::error::Result;
use crate::loader::{DataSource, Dataset};
use crate::types::PointRow;
use crate::util::{format_int, format_number, format_optional};
use crate::view::{PanelContent, ViewModel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Table};

pub fn write_csv(path: &Path, table: &TableView) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&table.columns)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    generated_at: DateTime<Utc>,
    view: &'a T,
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let envelope = Envelope {
        generated_at: Utc::now(),
        view: value,
    };
    let s = serde_json::to_string_pretty(&envelope)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// File name for an exported table: lower-case words joined by `_`.
pub fn table_file_name(title: &str) -> String {
    let slug: Vec<String> = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect();
    format!("{}.csv", slug.join("_"))
}

/// Export every table currently on screen into `dir`.
pub fn export_tables(dir: &Path, view: &ViewModel) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for table in view.tables() {
        let path = dir.join(table_file_name(&table.title));
        write_csv(&path, table)?;
        written.push(path);
    }
    Ok(written)
}

fn preview_chart(chart: &ChartSpec, max_rows: usize) {
    println!("{} [{:?}, {:?}]", chart.title, chart.kind, chart.region);
    println!("({} vs {})\n", chart.y_label, chart.x_label);
    let rows: Vec<PointRow> = chart
        .series
        .iter()
        .flat_map(|s| {
            s.points.iter().map(move |p| PointRow {
                series: s.name.clone(),
                x: p.x.to_string(),
                y: format_number(p.y, 2),
            })
        })
        .collect();
    preview_table_rows(&rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: tabled::Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}", table_str);
    if rows.len() > max_rows {
        println!("... {} more rows", rows.len() - max_rows);
    }
    println!();
}

fn preview_table_view(table: &TableView, max_rows: usize) {
    println!("{}\n", table.title);
    let mut builder = Builder::default();
    builder.push_record(table.columns.clone());
    for row in table.rows.iter().take(max_rows) {
        builder.push_record(row.clone());
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}", table_str);
    if table.rows.len() > max_rows {
        println!("... {} more rows", table.rows.len() - max_rows);
    }
    println!();
}

pub fn print_load_summary(dataset: &Dataset) {
    let report = &dataset.report;
    match &dataset.source {
        DataSource::File(path) => println!(
            "Processing dataset... ({} rows read, {} loaded from {})",
            format_int(report.total_rows),
            format_int(report.loaded_rows),
            path.display()
        ),
        DataSource::Synthetic { .. } => println!(
            "Processing dataset... ({} sample rows generated)",
            format_int(report.loaded_rows)
        ),
    }
    if !dataset.is_synthetic() {
        println!(
            "Note: {} rows skipped, {} duplicates dropped, {} malformed values and {} \
             zero productivity entries treated as missing.",
            format_int(report.parse_errors),
            format_int(report.duplicates),
            format_int(report.malformed_values),
            format_int(report.zero_productivity)
        );
    }
    println!();
}

/// Print a whole view model to stdout as markdown.
pub fn print_view(view: &ViewModel, max_rows: usize) {
    for w in &view.warnings {
        println!("Warning: {}", w);
    }
    if !view.warnings.is_empty() {
        println!();
    }
    for page in &view.pages {
        println!("== {} ==", page.title);
        println!(
            "(Year: {}, Sector: {})\n",
            view.filters.year,
            view.filters.sector.label()
        );
        for panel in &page.panels {
            match &panel.content {
                PanelContent::Chart(chart) => preview_chart(chart, max_rows),
                PanelContent::Table(table) => preview_table_view(table, max_rows),
                PanelContent::Metric { label, value, unit, decimals } => {
                    println!("{}: {}", label, format_optional(*value, *decimals, unit));
                }
                PanelContent::Notice(text) => println!("Info: {}\n", text),
                PanelContent::Caption(text) => println!("({})\n", text),
            }
        }
        println!();
    }
}
