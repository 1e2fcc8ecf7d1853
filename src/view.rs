//! Pages, filters and the pure `render` pass that turns them into a
//! [`ViewModel`]. Every call recomputes from the dataset; nothing is cached
//! between renders.

use crate::aggregate::{
    active_districts, cluster_tally, growth_table, mean_of, positive_desc, productivity_gap,
    productivity_ratios, rows_for_districts, rows_for_year, sector_totals, sorted_desc,
    top_cumulative_districts, top_growth_districts, top_n, total_production_of, yearly_means,
};
use crate::chart::{build_chart, ChartKind, ChartRequest, ChartSpec, LayoutRegion, TableView};
use crate::error::{DashboardError, Result};
use crate::geo::{join_locations, with_coordinates, GeoLookup};
use crate::loader::{producing_districts, Dataset};
use crate::types::{ClusterKind, Column, GrowthRecord, Measure, Observation, Record, Sector};
use crate::util::format_int;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DISTRICTS: usize = 5;
const TOP_N: usize = 5;
const NO_GROWTH: &str = "Insufficient data to calculate growth rates.";
const NO_RATIO: &str =
    "No districts have both smallholder and private estate productivity data for comparison.";
const SIDE_BY_SIDE_HINT: &str =
    "Per-district sector comparison is on the Smallholder vs Private Estate page.";
const SECTOR_REGIONS: [(Sector, LayoutRegion); 2] = [
    (Sector::Smallholder, LayoutRegion::Left),
    (Sector::Private, LayoutRegion::Right),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum Page {
    Overview,
    Production,
    ProductivityAnalysis,
    ProductivityTrend,
    SectorComparison,
    Clustering,
    GeoMap,
    DataExplorer,
}

impl Page {
    pub const ALL: [Page; 8] = [
        Page::Overview,
        Page::Production,
        Page::ProductivityAnalysis,
        Page::ProductivityTrend,
        Page::SectorComparison,
        Page::Clustering,
        Page::GeoMap,
        Page::DataExplorer,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Page::Overview => "Dashboard Overview",
            Page::Production => "Production Analysis",
            Page::ProductivityAnalysis => "Productivity Analysis",
            Page::ProductivityTrend => "Productivity Trends",
            Page::SectorComparison => "Smallholder vs Private Estate",
            Page::Clustering => "Clustering",
            Page::GeoMap => "Geographic Map",
            Page::DataExplorer => "Data Explorer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum YearSelection {
    All,
    Year(i32),
}

impl YearSelection {
    pub fn as_option(self) -> Option<i32> {
        match self {
            YearSelection::All => None,
            YearSelection::Year(y) => Some(y),
        }
    }
}

impl fmt::Display for YearSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearSelection::All => write!(f, "All Years"),
            YearSelection::Year(y) => write!(f, "{}", y),
        }
    }
}

impl FromStr for YearSelection {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(YearSelection::All);
        }
        s.parse::<i32>().map(YearSelection::Year).map_err(|_| {
            DashboardError::InvalidFilter(format!("year must be a number or 'all', got '{}'", s))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum SectorChoice {
    Smallholder,
    Private,
    Both,
}

impl SectorChoice {
    pub fn sectors(self) -> Vec<Sector> {
        match self {
            SectorChoice::Smallholder => vec![Sector::Smallholder],
            SectorChoice::Private => vec![Sector::Private],
            SectorChoice::Both => Sector::ALL.to_vec(),
        }
    }

    pub fn production_column(self) -> Column {
        match self {
            SectorChoice::Smallholder => Column::ProductionSmallholder,
            SectorChoice::Private => Column::ProductionPrivate,
            SectorChoice::Both => Column::ProductionTotal,
        }
    }

    /// `None` for both sectors: productivity does not add up across them.
    pub fn productivity_column(self) -> Option<Column> {
        match self {
            SectorChoice::Smallholder => Some(Column::ProductivitySmallholder),
            SectorChoice::Private => Some(Column::ProductivityPrivate),
            SectorChoice::Both => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SectorChoice::Smallholder => "Smallholder",
            SectorChoice::Private => "Private Estate",
            SectorChoice::Both => "Total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GrowthScope {
    Top(usize),
    All,
}

impl FromStr for GrowthScope {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(GrowthScope::All);
        }
        s.strip_prefix("top")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(GrowthScope::Top)
            .ok_or_else(|| {
                DashboardError::InvalidFilter(format!(
                    "growth scope must be 'all' or 'topN', got '{}'",
                    s
                ))
            })
    }
}

/// The whole user selection. Last selected values win; there is no other
/// state between renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filters {
    pub pages: Vec<Page>,
    pub year: YearSelection,
    pub districts: Vec<String>,
    pub sector: SectorChoice,
    pub growth_scope: GrowthScope,
    pub cluster: ClusterKind,
}

impl Filters {
    pub fn defaults_for(dataset: &Dataset) -> Self {
        Filters {
            pages: vec![Page::Overview],
            year: dataset
                .latest_year()
                .map_or(YearSelection::All, YearSelection::Year),
            districts: producing_districts(&dataset.observations)
                .into_iter()
                .take(DEFAULT_DISTRICTS)
                .collect(),
            sector: SectorChoice::Smallholder,
            growth_scope: GrowthScope::Top(TOP_N),
            cluster: ClusterKind::Productivity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PanelContent {
    Chart(ChartSpec),
    Table(TableView),
    Metric {
        label: String,
        value: Option<f64>,
        unit: String,
        decimals: usize,
    },
    Notice(String),
    Caption(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub region: LayoutRegion,
    pub content: PanelContent,
}

impl Panel {
    fn full(content: PanelContent) -> Self {
        Panel { region: LayoutRegion::Full, content }
    }

    fn notice(text: impl Into<String>) -> Self {
        Panel::full(PanelContent::Notice(text.into()))
    }

    fn caption(text: impl Into<String>) -> Self {
        Panel::full(PanelContent::Caption(text.into()))
    }

    fn metric(label: &str, value: Option<f64>, unit: &str) -> Self {
        Panel::full(PanelContent::Metric {
            label: label.to_string(),
            value,
            unit: unit.to_string(),
            decimals: 1,
        })
    }

    fn count(label: &str, value: Option<usize>, unit: &str) -> Self {
        Panel::full(PanelContent::Metric {
            label: label.to_string(),
            value: value.map(|n| n as f64),
            unit: unit.to_string(),
            decimals: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub page: Page,
    pub title: String,
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub warnings: Vec<String>,
    pub filters: Filters,
    pub pages: Vec<PageView>,
}

impl ViewModel {
    pub fn tables(&self) -> impl Iterator<Item = &TableView> {
        self.pages
            .iter()
            .flat_map(|p| &p.panels)
            .filter_map(|panel| match &panel.content {
                PanelContent::Table(t) => Some(t),
                _ => None,
            })
    }
}

/// Chart panel, or a notice when the slice has nothing to plot.
fn chart<R: Record>(rows: &[R], request: ChartRequest) -> Panel {
    chart_or(rows, request, None)
}

fn chart_or<R: Record>(rows: &[R], request: ChartRequest, empty: Option<&str>) -> Panel {
    let region = request.region;
    let content = match build_chart(rows, &request) {
        Ok(spec) => PanelContent::Chart(spec),
        Err(e) => PanelContent::Notice(empty.map_or_else(|| e.to_string(), str::to_string)),
    };
    Panel { region, content }
}

fn table<R: Record>(title: &str, rows: &[R], columns: &[Column]) -> Panel {
    match TableView::from_records(title, rows, columns) {
        Ok(t) => Panel::full(PanelContent::Table(t)),
        Err(e) => Panel::notice(e.to_string()),
    }
}

fn year_suffix(year: YearSelection) -> String {
    format!("({})", year)
}

/// Rows of the selected districts, or of every district with a positive
/// value in `column` when none are selected.
fn district_scope(filters: &Filters, rows: &[Observation], column: Column) -> Vec<Observation> {
    if filters.districts.is_empty() {
        rows.iter()
            .filter(|o| o.measure(column).map_or(false, |v| v > 0.0))
            .cloned()
            .collect()
    } else {
        rows_for_districts(rows, &filters.districts)
    }
}

/// Drop single-year growth records, with a caption counting them.
fn usable_growth(records: Vec<GrowthRecord>) -> (Vec<GrowthRecord>, Option<Panel>) {
    let (flagged, usable): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|g| g.insufficient_range);
    let caption = (!flagged.is_empty()).then(|| {
        Panel::caption(format!(
            "{} district/sector pairs have a single year of data and were left out.",
            format_int(flagged.len())
        ))
    });
    (usable, caption)
}

fn productivity_metrics(rows: &[Observation], year: Option<i32>) -> Vec<Panel> {
    vec![
        Panel::metric(
            "Average Smallholder Productivity",
            mean_of(rows, Column::ProductivitySmallholder, year),
            "kg/ha",
        ),
        Panel::metric(
            "Average Private Estate Productivity",
            mean_of(rows, Column::ProductivityPrivate, year),
            "kg/ha",
        ),
        Panel::metric("Productivity Gap", productivity_gap(rows, year), "kg/ha"),
    ]
}

fn overview(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let year = filters.year.as_option();
    let all = &data.observations;
    let year_rows = rows_for_year(all, year);
    let suffix = year_suffix(filters.year);

    let mut panels = vec![
        Panel::metric("Total Production", total_production_of(all, year), "tons"),
        Panel::count(
            "Active Producing Districts",
            (!year_rows.is_empty()).then(|| active_districts(&year_rows)),
            "districts",
        ),
    ];
    panels.extend(
        [
            ("Average Smallholder Productivity", Column::ProductivitySmallholder, "kg/ha"),
            ("Average Private Estate Productivity", Column::ProductivityPrivate, "kg/ha"),
            ("Average Smallholder Production", Column::ProductionSmallholder, "tons"),
            ("Average Private Estate Production", Column::ProductionPrivate, "tons"),
        ]
        .into_iter()
        .map(|(label, col, unit)| Panel::metric(label, mean_of(all, col, year), unit)),
    );

    for (sector, region) in SECTOR_REGIONS {
        let col = sector.production();
        panels.push(chart(
            &top_n(&year_rows, col, TOP_N),
            ChartRequest::new(
                ChartKind::Bar,
                format!("Top {} {} Production {}", TOP_N, sector.label(), suffix),
                Column::District,
                col,
            )
            .color(col)
            .region(region),
        ));
    }

    let leaders = top_cumulative_districts(all, Column::ProductionSmallholder, TOP_N);
    panels.push(chart(
        &rows_for_districts(all, &leaders),
        ChartRequest::new(
            ChartKind::Line,
            "Smallholder Production Trend",
            Column::Year,
            Column::ProductionSmallholder,
        )
        .color(Column::District)
        .region(LayoutRegion::Left),
    ));
    panels.push(chart(
        &positive_desc(&year_rows, Column::ProductionTotal),
        ChartRequest::new(
            ChartKind::Pie,
            format!("Tea Production Distribution {}", suffix),
            Column::District,
            Column::ProductionTotal,
        )
        .region(LayoutRegion::Right),
    ));

    let shares: Vec<_> = sector_totals(&year_rows)
        .into_iter()
        .filter(|t| t.total > 0.0)
        .collect();
    panels.push(chart(
        &shares,
        ChartRequest::new(
            ChartKind::Pie,
            format!("Smallholder vs Private Estate Production Share {}", suffix),
            Column::Sector,
            Column::Total,
        ),
    ));

    panels.push(chart(
        &yearly_means(all, &[Column::ProductionSmallholder, Column::ProductionPrivate]),
        ChartRequest::new(
            ChartKind::Line,
            "Average Production per Sector",
            Column::Year,
            Column::ProductionSmallholder,
        )
        .also(Column::ProductionPrivate),
    ));

    panels.push(chart(
        &year_rows,
        ChartRequest::new(
            ChartKind::HorizontalBar,
            format!("Production per District {}", suffix),
            Column::District,
            Column::ProductionSmallholder,
        )
        .also(Column::ProductionPrivate),
    ));
    panels
}

fn production(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let year = filters.year.as_option();
    let col = filters.sector.production_column();
    let name = filters.sector.label();
    let suffix = year_suffix(filters.year);
    let all = &data.observations;
    let scope = district_scope(filters, all, col);
    let scope_year = sorted_desc(&rows_for_year(&scope, year), col);
    let mut panels = Vec::new();

    if filters.districts.is_empty() {
        panels.push(Panel::notice("Please select at least one district to compare."));
    } else {
        panels.push(chart(
            &scope,
            ChartRequest::new(
                ChartKind::Line,
                format!("{} Production Time Series", name),
                Column::Year,
                col,
            )
            .color(Column::District)
            .region(LayoutRegion::Left),
        ));
    }
    panels.push(chart(
        &scope_year,
        ChartRequest::new(
            ChartKind::Pie,
            format!("{} Production Share {}", name, suffix),
            Column::District,
            col,
        )
        .region(LayoutRegion::Left),
    ));
    panels.push(chart(
        &scope_year,
        ChartRequest::new(
            ChartKind::Bar,
            format!("Compare {} Production {}", name, suffix),
            Column::District,
            col,
        )
        .color(col)
        .region(LayoutRegion::Right),
    ));

    // Growth only ever covers an explicit selection.
    let growth = if filters.districts.is_empty() {
        Vec::new()
    } else {
        growth_table(all, &filters.districts, &filters.sector.sectors(), Measure::Production)
    };
    let (growth, flagged) = usable_growth(growth);
    let color = match filters.sector {
        SectorChoice::Both => Column::Sector,
        _ => Column::AnnualGrowth,
    };
    panels.push(chart_or(
        &growth,
        ChartRequest::new(
            ChartKind::Bar,
            "Average Annual Growth Rate (%)",
            Column::District,
            Column::AnnualGrowth,
        )
        .color(color)
        .region(LayoutRegion::Right),
        Some(NO_GROWTH),
    ));
    panels.extend(flagged);

    panels.push(chart(
        &sorted_desc(&rows_for_year(all, year), col),
        ChartRequest::new(
            ChartKind::Choropleth,
            format!("Geographic Distribution of {} Production {}", name, suffix),
            Column::District,
            col,
        )
        .color(col),
    ));
    panels.push(Panel::caption("District boundaries are placeholders."));
    panels
}

fn productivity_analysis(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let year = filters.year.as_option();
    let suffix = year_suffix(filters.year);
    let all = &data.observations;

    let Some(col) = filters.sector.productivity_column() else {
        return match filters.districts.first() {
            None => vec![Panel::notice(
                "Please select at least one district for trend comparison.",
            )],
            Some(district) => {
                let rows = rows_for_districts(all, std::slice::from_ref(district));
                let shown = rows.first().map_or(district.as_str(), |o| o.district.as_str());
                vec![
                    chart(
                        &rows,
                        ChartRequest::new(
                            ChartKind::Line,
                            format!("Productivity Trend in {}", shown),
                            Column::Year,
                            Column::ProductivitySmallholder,
                        )
                        .also(Column::ProductivityPrivate),
                    ),
                    Panel::caption(SIDE_BY_SIDE_HINT),
                ]
            }
        };
    };

    let name = filters.sector.label();
    let scope = district_scope(filters, all, col);
    let scope_year = sorted_desc(&rows_for_year(&scope, year), col);
    let mut panels = vec![chart(
        &scope_year,
        ChartRequest::new(
            ChartKind::Bar,
            format!("{} Productivity Ranking {}", name, suffix),
            Column::District,
            col,
        )
        .color(col)
        .region(LayoutRegion::Left),
    )];
    panels.push(Panel {
        region: LayoutRegion::Left,
        ..table(
            &format!("Top Districts by {} Productivity {}", name, suffix),
            &top_n(&scope_year, col, TOP_N),
            &[Column::District, col],
        )
    });

    if filters.districts.is_empty() {
        panels.push(Panel::notice("Please select at least one district to compare."));
    } else {
        panels.push(chart(
            &scope,
            ChartRequest::new(
                ChartKind::Line,
                format!("{} Productivity Trend", name),
                Column::Year,
                col,
            )
            .color(Column::District)
            .region(LayoutRegion::Right),
        ));
    }

    let production_col = filters.sector.production_column();
    panels.push(chart(
        &scope_year,
        ChartRequest::new(
            ChartKind::Scatter,
            format!("Production vs Productivity {}", suffix),
            production_col,
            col,
        )
        .color(Column::District)
        .size(production_col)
        .region(LayoutRegion::Right),
    ));
    panels
}

fn productivity_trend(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let year = filters.year.as_option();
    let all = &data.observations;
    let year_rows = rows_for_year(all, year);
    let suffix = year_suffix(filters.year);
    let mut panels = Vec::new();

    for (sector, region) in SECTOR_REGIONS {
        let col = sector.productivity();
        panels.push(chart(
            &top_n(&year_rows, col, TOP_N),
            ChartRequest::new(
                ChartKind::Bar,
                format!("Top {} {} Productivity {}", TOP_N, sector.label(), suffix),
                Column::District,
                col,
            )
            .color(col)
            .region(region),
        ));
    }

    panels.push(chart(
        &yearly_means(all, &[Column::ProductivitySmallholder, Column::ProductivityPrivate]),
        ChartRequest::new(
            ChartKind::Line,
            "Average Productivity per Sector",
            Column::Year,
            Column::ProductivitySmallholder,
        )
        .also(Column::ProductivityPrivate),
    ));

    let (growth, flagged) =
        usable_growth(growth_table(all, &[], &Sector::ALL, Measure::Productivity));
    let growth = match filters.growth_scope {
        GrowthScope::Top(n) => top_growth_districts(&growth, n),
        GrowthScope::All => growth,
    };
    panels.push(chart_or(
        &growth,
        ChartRequest::new(
            ChartKind::GroupedBar,
            "Average Annual Productivity Growth per Sector (%)",
            Column::District,
            Column::AnnualGrowth,
        )
        .color(Column::Sector),
        Some(NO_GROWTH),
    ));
    panels.extend(flagged);
    panels.push(table(
        "Productivity Growth",
        &growth,
        &[
            Column::District,
            Column::Sector,
            Column::TotalGrowth,
            Column::AnnualGrowth,
            Column::YearsSpan,
        ],
    ));
    panels
}

fn sector_comparison(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let year = filters.year.as_option();
    let suffix = year_suffix(filters.year);
    let scope = if filters.districts.is_empty() {
        data.observations.clone()
    } else {
        rows_for_districts(&data.observations, &filters.districts)
    };
    let compared: Vec<Observation> = rows_for_year(&scope, year)
        .into_iter()
        .filter(|o| o.productivity_smallholder.is_some() || o.productivity_private.is_some())
        .collect();

    let mut panels = vec![chart(
        &compared,
        ChartRequest::new(
            ChartKind::GroupedBar,
            format!("Productivity Comparison {}", suffix),
            Column::District,
            Column::ProductivitySmallholder,
        )
        .also(Column::ProductivityPrivate),
    )];

    panels.push(chart_or(
        &productivity_ratios(&compared),
        ChartRequest::new(
            ChartKind::Bar,
            format!("Private Estate to Smallholder Productivity Ratio {}", suffix),
            Column::District,
            Column::ProductivityRatio,
        )
        .color(Column::ProductivityRatio),
        Some(NO_RATIO),
    ));

    panels.push(chart(
        &compared,
        ChartRequest::new(
            ChartKind::Scatter,
            format!("Smallholder vs Private Estate Productivity {}", suffix),
            Column::ProductivitySmallholder,
            Column::ProductivityPrivate,
        )
        .color(Column::District)
        .region(LayoutRegion::Left),
    ));
    panels.push(chart(
        &compared,
        ChartRequest::new(
            ChartKind::Choropleth,
            format!("Productivity Difference {}", suffix),
            Column::District,
            Column::ProductivityDifference,
        )
        .color(Column::ProductivityDifference)
        .region(LayoutRegion::Right),
    ));
    panels.push(Panel::caption("Productivity Difference = Private Estate - Smallholder"));
    panels.push(table(
        "Productivity Difference",
        &compared,
        &[
            Column::District,
            Column::Year,
            Column::ProductivitySmallholder,
            Column::ProductivityPrivate,
            Column::ProductivityDifference,
        ],
    ));
    panels.extend(productivity_metrics(&scope, year));
    panels
}

fn clustering(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let year = filters.year.as_option();
    let suffix = year_suffix(filters.year);
    let rows = rows_for_year(&data.observations, year);
    let cluster_col = filters.cluster.column();

    let mut panels = vec![chart(
        &rows,
        ChartRequest::new(
            ChartKind::Scatter,
            format!("Cluster Scatter Plot {}", suffix),
            Column::ProductivitySmallholder,
            Column::ProductivityPrivate,
        )
        .color(cluster_col),
    )];

    let tally = cluster_tally(&rows, filters.cluster);
    panels.push(chart(
        &tally,
        ChartRequest::new(
            ChartKind::Pie,
            format!("Cluster Distribution {}", suffix),
            Column::Cluster,
            Column::Observations,
        )
        .region(LayoutRegion::Left),
    ));
    panels.push(chart(
        &tally,
        ChartRequest::new(
            ChartKind::Bar,
            format!("Districts per Cluster {}", suffix),
            Column::Cluster,
            Column::Districts,
        )
        .color(Column::Cluster)
        .region(LayoutRegion::Right),
    ));
    if !tally.is_empty() {
        let districts = distinct_districts(&rows);
        panels.push(Panel::caption(format!(
            "{} observations across {} districts.",
            format_int(rows.len()),
            format_int(districts)
        )));
    }
    panels.push(table(
        "Cluster Assignments",
        &rows,
        &[
            Column::District,
            Column::Year,
            Column::ProductivitySmallholder,
            Column::ProductivityPrivate,
            cluster_col,
        ],
    ));
    panels
}

fn distinct_districts(rows: &[Observation]) -> usize {
    rows.iter().map(|o| o.key()).collect::<HashSet<_>>().len()
}

fn geo_map(filters: &Filters, data: &Dataset, geo: Option<&GeoLookup>) -> Vec<Panel> {
    let year = filters.year.as_option();
    let suffix = year_suffix(filters.year);
    let rows = rows_for_year(&data.observations, year);
    let mut panels = Vec::new();

    match geo {
        None => panels.push(Panel::notice(
            "District location lookup is unavailable; map views are disabled.",
        )),
        Some(lookup) => {
            let (located, dropped) = with_coordinates(join_locations(&rows, lookup));
            if dropped > 0 {
                panels.push(Panel::caption(format!(
                    "{} rows without coordinates were left off the map.",
                    format_int(dropped)
                )));
            }
            for (sector, region) in SECTOR_REGIONS {
                let col = sector.productivity();
                panels.push(chart(
                    &located,
                    ChartRequest::new(
                        ChartKind::BubbleMap,
                        format!("{} Productivity Distribution {}", sector.label(), suffix),
                        Column::Longitude,
                        Column::Latitude,
                    )
                    .size(col)
                    .color(col)
                    .region(region),
                ));
            }
        }
    }
    for (sector, region) in SECTOR_REGIONS {
        let col = sector.productivity();
        panels.push(Panel {
            region,
            ..table(
                &format!("{} Productivity Data {}", sector.label(), suffix),
                &positive_desc(&rows, col),
                &[Column::District, col],
            )
        });
    }

    panels.push(chart(
        &rows,
        ChartRequest::new(
            ChartKind::Choropleth,
            format!("Productivity Difference {}", suffix),
            Column::District,
            Column::ProductivityDifference,
        )
        .color(Column::ProductivityDifference),
    ));
    panels.push(Panel::caption(
        "Blue areas: private estates have higher productivity. Red areas: smallholders do.",
    ));
    panels.extend(productivity_metrics(&rows, None));
    panels
}

fn data_explorer(filters: &Filters, data: &Dataset) -> Vec<Panel> {
    let mut rows = rows_for_year(&data.observations, filters.year.as_option());
    if !filters.districts.is_empty() {
        rows = rows_for_districts(&rows, &filters.districts);
    }
    vec![table(
        "Filtered Observations",
        &rows,
        &[
            Column::District,
            Column::Year,
            Column::ProductionSmallholder,
            Column::ProductionPrivate,
            Column::ProductivitySmallholder,
            Column::ProductivityPrivate,
            Column::LogProductionSmallholder,
            Column::LogProductionPrivate,
            Column::ProductionCluster,
            Column::ProductivityCluster,
        ],
    )]
}

/// Recompute every selected page from scratch.
pub fn render(filters: &Filters, data: &Dataset, geo: Option<&GeoLookup>) -> ViewModel {
    let mut warnings = data.warnings();
    if filters.pages.is_empty() {
        warnings.push("Select at least one page from the navigation.".to_string());
    }
    let pages = filters
        .pages
        .iter()
        .map(|page| PageView {
            page: *page,
            title: page.title().to_string(),
            panels: match page {
                Page::Overview => overview(filters, data),
                Page::Production => production(filters, data),
                Page::ProductivityAnalysis => productivity_analysis(filters, data),
                Page::ProductivityTrend => productivity_trend(filters, data),
                Page::SectorComparison => sector_comparison(filters, data),
                Page::Clustering => clustering(filters, data),
                Page::GeoMap => geo_map(filters, data, geo),
                Page::DataExplorer => data_explorer(filters, data),
            },
        })
        .collect();
    ViewModel {
        warnings,
        filters: filters.clone(),
        pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{synthetic_dataset, DataSource, LoadReport};
    use crate::types::{observation, GeoLocation};

    fn dataset() -> Dataset {
        let mut rows = Vec::new();
        for (d, y, ps, pp, qs, qp, c) in [
            ("CIANJUR", 2017, 5000.0, 100.0, Some(900.0), Some(1200.0), 1),
            ("CIANJUR", 2024, 10000.0, 150.0, Some(1000.0), None, 1),
            ("BOGOR", 2017, 0.0, 0.0, None, None, 0),
            ("BOGOR", 2024, 0.0, 0.0, None, None, 0),
            ("GARUT", 2017, 3000.0, 0.0, Some(800.0), None, 2),
            ("GARUT", 2024, 3300.0, 40.0, Some(850.0), Some(1400.0), 2),
        ] {
            let mut o = observation(d, y);
            o.production_smallholder = Some(ps);
            o.production_private = Some(pp);
            o.productivity_smallholder = qs;
            o.productivity_private = qp;
            o.productivity_cluster = Some(c);
            o.production_cluster = Some(c);
            rows.push(o);
        }
        Dataset {
            report: LoadReport {
                total_rows: rows.len(),
                loaded_rows: rows.len(),
                ..LoadReport::default()
            },
            observations: rows,
            source: DataSource::File("test.csv".into()),
        }
    }

    fn all_pages(year: YearSelection) -> Filters {
        Filters {
            pages: Page::ALL.to_vec(),
            year,
            districts: vec!["CIANJUR".into(), "BOGOR".into(), "GARUT".into()],
            sector: SectorChoice::Smallholder,
            growth_scope: GrowthScope::Top(5),
            cluster: ClusterKind::Productivity,
        }
    }

    fn lookup() -> GeoLookup {
        GeoLookup::from_locations(vec![GeoLocation {
            district_key: "Cianjur ".into(),
            latitude: -6.8,
            longitude: 107.1,
        }])
    }

    fn panels(view: &ViewModel, page: Page) -> &[Panel] {
        &view.pages.iter().find(|p| p.page == page).unwrap().panels
    }

    fn only(page: Page, year: YearSelection) -> Filters {
        Filters {
            pages: vec![page],
            ..all_pages(year)
        }
    }

    fn find_chart<'a>(view: &'a ViewModel, title: &str) -> &'a ChartSpec {
        view.pages
            .iter()
            .flat_map(|p| &p.panels)
            .find_map(|p| match &p.content {
                PanelContent::Chart(c) if c.title == title => Some(c),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no chart titled '{}'", title))
    }

    fn xs(chart: &ChartSpec) -> Vec<String> {
        chart.series.iter().flat_map(|s| &s.points).map(|p| p.x.to_string()).collect()
    }

    fn has_notice(view: &ViewModel, text: &str) -> bool {
        view.pages
            .iter()
            .flat_map(|p| &p.panels)
            .any(|p| matches!(&p.content, PanelContent::Notice(n) if n == text))
    }

    #[test]
    fn defaults_pick_latest_year_and_producing_districts() {
        let f = Filters::defaults_for(&dataset());
        assert_eq!(f.year, YearSelection::Year(2024));
        assert_eq!(f.districts, vec!["CIANJUR".to_string(), "GARUT".to_string()]);
        assert_eq!(f.pages, vec![Page::Overview]);
    }

    #[test]
    fn parses_year_and_growth_scope() {
        assert_eq!("all".parse::<YearSelection>().unwrap(), YearSelection::All);
        assert_eq!(" 2020 ".parse::<YearSelection>().unwrap(), YearSelection::Year(2020));
        assert!("last".parse::<YearSelection>().is_err());
        assert_eq!("top5".parse::<GrowthScope>().unwrap(), GrowthScope::Top(5));
        assert_eq!("ALL".parse::<GrowthScope>().unwrap(), GrowthScope::All);
        assert!("top0".parse::<GrowthScope>().is_err());
    }

    #[test]
    fn growth_chart_orders_districts_by_annual_rate() {
        let view = render(&all_pages(YearSelection::Year(2024)), &dataset(), None);
        let growth = panels(&view, Page::Production)
            .iter()
            .find_map(|p| match &p.content {
                PanelContent::Chart(c) if c.title.starts_with("Average Annual Growth") => Some(c),
                _ => None,
            })
            .unwrap();
        let xs: Vec<String> = growth.series[0].points.iter().map(|p| p.x.to_string()).collect();
        assert_eq!(xs, vec!["CIANJUR", "GARUT", "BOGOR"]);
        assert!((growth.series[0].points[0].y - 100.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn empty_year_renders_notices_not_empty_charts() {
        let view = render(&all_pages(YearSelection::Year(2030)), &dataset(), Some(&lookup()));
        for page in &view.pages {
            for panel in &page.panels {
                match &panel.content {
                    PanelContent::Chart(c) => {
                        assert!(c.point_count() > 0);
                        // Only year-independent trends and growth may still draw.
                        assert!(
                            !c.title.contains("2030"),
                            "chart '{}' drawn for an empty year",
                            c.title
                        );
                    }
                    PanelContent::Metric { value, .. } => assert_eq!(*value, None),
                    _ => {}
                }
            }
        }
        let explorer = panels(&view, Page::DataExplorer);
        assert!(matches!(explorer[0].content, PanelContent::Notice(_)));
    }

    #[test]
    fn metrics_distinguish_no_data_from_zero() {
        let mut filters = all_pages(YearSelection::Year(2024));
        filters.pages = vec![Page::SectorComparison];
        filters.districts = vec!["BOGOR".into()];
        let view = render(&filters, &dataset(), None);
        let metrics: Vec<Option<f64>> = view.pages[0]
            .panels
            .iter()
            .filter_map(|p| match &p.content {
                PanelContent::Metric { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(metrics, vec![None, None, None]);
        assert!(view.pages[0].panels.iter().any(|p| matches!(
            &p.content,
            PanelContent::Notice(n) if n.starts_with("No districts have both")
        )));
    }

    #[test]
    fn map_page_drops_unlocated_rows() {
        let mut filters = all_pages(YearSelection::Year(2024));
        filters.pages = vec![Page::GeoMap];
        let view = render(&filters, &dataset(), Some(&lookup()));
        let page = &view.pages[0].panels;
        assert!(page.iter().any(|p| matches!(
            &p.content,
            PanelContent::Caption(c) if c.starts_with("2 rows without coordinates")
        )));
        let bubble = page
            .iter()
            .find_map(|p| match &p.content {
                PanelContent::Chart(c) if c.kind == ChartKind::BubbleMap => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(bubble.point_count(), 1);

        let without = render(&filters, &dataset(), None);
        assert!(matches!(without.pages[0].panels[0].content, PanelContent::Notice(_)));
    }

    #[test]
    fn cluster_tally_matches_year_rows() {
        let mut filters = all_pages(YearSelection::Year(2017));
        filters.pages = vec![Page::Clustering];
        let view = render(&filters, &dataset(), None);
        let pie = view.pages[0]
            .panels
            .iter()
            .find_map(|p| match &p.content {
                PanelContent::Chart(c) if c.kind == ChartKind::Pie => Some(c),
                _ => None,
            })
            .unwrap();
        let total: f64 = pie.series.iter().flat_map(|s| &s.points).map(|p| p.y).sum();
        assert_eq!(total, 3.0);
    }

    #[test]
    fn no_pages_selected_is_a_warning() {
        let mut filters = all_pages(YearSelection::All);
        filters.pages.clear();
        let view = render(&filters, &dataset(), None);
        assert!(view.pages.is_empty());
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn synthetic_data_warning_reaches_the_view() {
        let rows = synthetic_dataset(1);
        let data = Dataset {
            report: LoadReport::default(),
            observations: rows,
            source: DataSource::Synthetic { reason: "missing".into() },
        };
        let view = render(&Filters::defaults_for(&data), &data, None);
        assert!(view.warnings[0].starts_with("Using sample data"));
        assert_eq!(view.pages.len(), 1);
    }

    #[test]
    fn explorer_table_is_exposed_for_export() {
        let mut filters = all_pages(YearSelection::All);
        filters.pages = vec![Page::DataExplorer];
        filters.districts = vec!["garut".into()];
        let view = render(&filters, &dataset(), None);
        let tables: Vec<_> = view.tables().collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 2);
    }

    #[test]
    fn production_without_selection_uses_producing_districts() {
        let mut filters = only(Page::Production, YearSelection::Year(2024));
        filters.districts.clear();
        let view = render(&filters, &dataset(), None);
        let page = &view.pages[0].panels;
        assert!(matches!(
            &page[0].content,
            PanelContent::Notice(n) if n == "Please select at least one district to compare."
        ));
        let share = find_chart(&view, "Smallholder Production Share (2024)");
        assert_eq!(xs(share), vec!["CIANJUR", "GARUT"]);
        let bar = find_chart(&view, "Compare Smallholder Production (2024)");
        assert_eq!(bar.point_count(), 2);
        assert!(has_notice(&view, NO_GROWTH));
    }

    #[test]
    fn district_spellings_render_as_one_series() {
        let text = "kab_kota,tahun,produksi_rakyat,produksi_swasta,produktivitas_rakyat,\
                    produktivitas_swasta,log_prdks_rakyat,log_prdks_swasta,cluster_produksi,\
                    cluster_produktivitas\n\
                    KABUPATEN BANDUNG,2017,100,0,900,0,4.6,0,1,1\n\
                    Kabupaten Bandung ,2024,200,0,950,0,5.3,0,1,1\n\
                    KOTA BOGOR,2017,50,0,800,0,3.9,0,1,1\n";
        let (rows, report) = crate::loader::read_observations(text.as_bytes()).unwrap();
        let data = Dataset {
            observations: rows,
            report,
            source: DataSource::File("mixed.csv".into()),
        };
        let filters = Filters::defaults_for(&data);
        assert_eq!(filters.districts, vec!["KABUPATEN BANDUNG", "KOTA BOGOR"]);
        let mut filters = only(Page::Production, YearSelection::All);
        filters.districts = vec!["kabupaten bandung".into(), "KOTA BOGOR".into()];
        let view = render(&filters, &data, None);
        let series = find_chart(&view, "Smallholder Production Time Series");
        let names: Vec<&str> = series.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["KABUPATEN BANDUNG", "KOTA BOGOR"]);
        assert_eq!(series.series[0].points.len(), 2);
    }

    #[test]
    fn overview_reports_year_totals() {
        let view = render(&only(Page::Overview, YearSelection::Year(2024)), &dataset(), None);
        let metric = |label: &str| {
            view.pages[0].panels.iter().find_map(|p| match &p.content {
                PanelContent::Metric { label: l, value, decimals, .. } if l == label => {
                    Some((*value, *decimals))
                }
                _ => None,
            })
        };
        assert_eq!(metric("Total Production"), Some((Some(13490.0), 1)));
        assert_eq!(metric("Active Producing Districts"), Some((Some(2.0), 0)));
        let pie = find_chart(&view, "Tea Production Distribution (2024)");
        assert_eq!(xs(pie), vec!["CIANJUR", "GARUT"]);
        let trend = find_chart(&view, "Smallholder Production Trend");
        assert_eq!(trend.series[0].name, "CIANJUR");
    }

    #[test]
    fn productivity_analysis_follows_sector_and_districts() {
        let mut filters = only(Page::ProductivityAnalysis, YearSelection::Year(2024));
        filters.districts = vec!["CIANJUR".into(), "GARUT".into()];
        let view = render(&filters, &dataset(), None);
        let ranking = find_chart(&view, "Smallholder Productivity Ranking (2024)");
        assert_eq!(xs(ranking), vec!["CIANJUR", "GARUT"]);
        let trend = find_chart(&view, "Smallholder Productivity Trend");
        assert_eq!(trend.series.len(), 2);
        let scatter = find_chart(&view, "Production vs Productivity (2024)");
        assert_eq!(scatter.series[0].points[0].size, Some(10000.0));
        let tables: Vec<_> = view.tables().collect();
        assert_eq!(tables[0].title, "Top Districts by Smallholder Productivity (2024)");
        assert_eq!(tables[0].rows.len(), 2);

        filters.sector = SectorChoice::Private;
        let view = render(&filters, &dataset(), None);
        let ranking = find_chart(&view, "Private Estate Productivity Ranking (2024)");
        assert_eq!(xs(ranking), vec!["GARUT"]);

        filters.sector = SectorChoice::Both;
        let view = render(&filters, &dataset(), None);
        let both = find_chart(&view, "Productivity Trend in CIANJUR");
        assert_eq!(both.series.len(), 2);

        filters.districts.clear();
        let view = render(&filters, &dataset(), None);
        assert!(has_notice(&view, "Please select at least one district for trend comparison."));
    }

    #[test]
    fn productivity_growth_leaves_out_single_year_districts() {
        let mut data = dataset();
        let mut depok = observation("KOTA DEPOK", 2024);
        depok.productivity_smallholder = Some(700.0);
        data.observations.push(depok);
        let mut filters = only(Page::ProductivityTrend, YearSelection::All);
        filters.growth_scope = GrowthScope::All;
        let view = render(&filters, &data, None);
        let growth = view.tables().find(|t| t.title == "Productivity Growth").unwrap();
        assert!(growth.rows.iter().all(|r| r[0] != "KOTA DEPOK"));
        assert!(view.pages[0].panels.iter().any(|p| matches!(
            &p.content,
            PanelContent::Caption(c) if c.starts_with("2 district/sector pairs")
        )));
    }

    #[test]
    fn map_page_lists_positive_productivity_per_sector() {
        let view = render(&only(Page::GeoMap, YearSelection::Year(2024)), &dataset(), None);
        let tables: Vec<_> = view.tables().collect();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].title, "Smallholder Productivity Data (2024)");
        let first: Vec<&str> = tables[0].rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(first, vec!["CIANJUR", "GARUT"]);
        let second: Vec<&str> = tables[1].rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(second, vec!["GARUT"]);
    }
}
