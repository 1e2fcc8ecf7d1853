use crate::util::normalize_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// One line of the primary dataset exactly as it appears in the file.
/// Every field stays a string so a bad cell never rejects the whole row.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "kab_kota")]
    pub district: Option<String>,
    #[serde(rename = "tahun")]
    pub year: Option<String>,
    #[serde(rename = "produksi_rakyat")]
    pub production_smallholder: Option<String>,
    #[serde(rename = "produksi_swasta")]
    pub production_private: Option<String>,
    #[serde(rename = "produktivitas_rakyat")]
    pub productivity_smallholder: Option<String>,
    #[serde(rename = "produktivitas_swasta")]
    pub productivity_private: Option<String>,
    #[serde(rename = "log_prdks_rakyat")]
    pub log_production_smallholder: Option<String>,
    #[serde(rename = "log_prdks_swasta")]
    pub log_production_private: Option<String>,
    #[serde(rename = "cluster_produksi")]
    pub production_cluster: Option<String>,
    #[serde(rename = "cluster_produktivitas")]
    pub productivity_cluster: Option<String>,
}

/// One line of the location lookup.
#[derive(Debug, Deserialize)]
pub struct RawLocationRow {
    #[serde(rename = "bps_kota_nama")]
    pub district: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// A cleaned (district, year) observation. Productivity is `None` when the
/// sector did not operate that year (stored as zero in the source file).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub district: String,
    pub year: i32,
    pub production_smallholder: Option<f64>,
    pub production_private: Option<f64>,
    pub productivity_smallholder: Option<f64>,
    pub productivity_private: Option<f64>,
    pub log_production_smallholder: Option<f64>,
    pub log_production_private: Option<f64>,
    pub production_cluster: Option<i32>,
    pub productivity_cluster: Option<i32>,
}

impl Observation {
    pub fn key(&self) -> String {
        normalize_name(&self.district)
    }

    /// Smallholder plus private production. A missing side counts as zero
    /// unless both are missing.
    pub fn total_production(&self) -> Option<f64> {
        match (self.production_smallholder, self.production_private) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        }
    }

    pub fn productivity_difference(&self) -> Option<f64> {
        Some(self.productivity_private? - self.productivity_smallholder?)
    }

    pub fn is_producing(&self) -> bool {
        self.production_smallholder.unwrap_or(0.0) > 0.0
            || self.production_private.unwrap_or(0.0) > 0.0
    }

    pub fn cluster(&self, kind: ClusterKind) -> Option<i32> {
        match kind {
            ClusterKind::Production => self.production_cluster,
            ClusterKind::Productivity => self.productivity_cluster,
        }
    }

    /// Numeric view of a measure column; `None` for identifiers and for
    /// missing values.
    pub fn measure(&self, column: Column) -> Option<f64> {
        match column {
            Column::ProductionSmallholder => self.production_smallholder,
            Column::ProductionPrivate => self.production_private,
            Column::ProductionTotal => self.total_production(),
            Column::ProductivitySmallholder => self.productivity_smallholder,
            Column::ProductivityPrivate => self.productivity_private,
            Column::LogProductionSmallholder => self.log_production_smallholder,
            Column::LogProductionPrivate => self.log_production_private,
            Column::ProductivityDifference => self.productivity_difference(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Sector {
    Smallholder,
    Private,
}

impl Sector {
    pub const ALL: [Sector; 2] = [Sector::Smallholder, Sector::Private];

    pub fn label(self) -> &'static str {
        match self {
            Sector::Smallholder => "Smallholder",
            Sector::Private => "Private Estate",
        }
    }

    pub fn production(self) -> Column {
        match self {
            Sector::Smallholder => Column::ProductionSmallholder,
            Sector::Private => Column::ProductionPrivate,
        }
    }

    pub fn productivity(self) -> Column {
        match self {
            Sector::Smallholder => Column::ProductivitySmallholder,
            Sector::Private => Column::ProductivityPrivate,
        }
    }
}

/// Production (tons) or productivity (kg/ha).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Measure {
    Production,
    Productivity,
}

impl Measure {
    pub fn column(self, sector: Sector) -> Column {
        match self {
            Measure::Production => sector.production(),
            Measure::Productivity => sector.productivity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum ClusterKind {
    Production,
    Productivity,
}

impl ClusterKind {
    pub fn column(self) -> Column {
        match self {
            ClusterKind::Production => Column::ProductionCluster,
            ClusterKind::Productivity => Column::ProductivityCluster,
        }
    }
}

/// Every field a chart or table can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Column {
    District,
    Year,
    ProductionSmallholder,
    ProductionPrivate,
    ProductionTotal,
    ProductivitySmallholder,
    ProductivityPrivate,
    LogProductionSmallholder,
    LogProductionPrivate,
    ProductionCluster,
    ProductivityCluster,
    ProductivityDifference,
    ProductivityRatio,
    Sector,
    Total,
    TotalGrowth,
    AnnualGrowth,
    YearsSpan,
    Cluster,
    Observations,
    Districts,
    Latitude,
    Longitude,
}

impl Column {
    pub fn label(self) -> &'static str {
        match self {
            Column::District => "District",
            Column::Year => "Year",
            Column::ProductionSmallholder => "Smallholder Production (tons)",
            Column::ProductionPrivate => "Private Estate Production (tons)",
            Column::ProductionTotal => "Total Production (tons)",
            Column::ProductivitySmallholder => "Smallholder Productivity (kg/ha)",
            Column::ProductivityPrivate => "Private Estate Productivity (kg/ha)",
            Column::LogProductionSmallholder => "Log Smallholder Production",
            Column::LogProductionPrivate => "Log Private Estate Production",
            Column::ProductionCluster => "Production Cluster",
            Column::ProductivityCluster => "Productivity Cluster",
            Column::ProductivityDifference => "Productivity Difference (kg/ha)",
            Column::ProductivityRatio => "Ratio (Private/Smallholder)",
            Column::Sector => "Sector",
            Column::Total => "Total",
            Column::TotalGrowth => "Total Growth (%)",
            Column::AnnualGrowth => "Annual Growth (%)",
            Column::YearsSpan => "Years",
            Column::Cluster => "Cluster",
            Column::Observations => "Observations",
            Column::Districts => "Districts",
            Column::Latitude => "Latitude",
            Column::Longitude => "Longitude",
        }
    }

    /// Categorical columns split a chart into one series per value.
    pub fn is_categorical(self) -> bool {
        matches!(
            self,
            Column::District
                | Column::Sector
                | Column::Cluster
                | Column::ProductionCluster
                | Column::ProductivityCluster
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Number(f64),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Text(_) => None,
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Number(f) => Some(*f),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Number(n) => write!(f, "{}", crate::util::format_number(*n, 2)),
        }
    }
}

fn number(v: Option<f64>) -> Option<CellValue> {
    v.map(CellValue::Number)
}

fn cluster_label(c: Option<i32>) -> CellValue {
    match c {
        Some(c) => CellValue::Text(format!("Cluster {}", c)),
        None => CellValue::Text("Unassigned".to_string()),
    }
}

/// Anything the chart builder and table view can read cells from.
pub trait Record {
    fn cell(&self, column: Column) -> Option<CellValue>;
}

impl Record for Observation {
    fn cell(&self, column: Column) -> Option<CellValue> {
        match column {
            Column::District => Some(CellValue::Text(self.district.clone())),
            Column::Year => Some(CellValue::Int(self.year as i64)),
            Column::ProductionCluster => Some(cluster_label(self.production_cluster)),
            Column::ProductivityCluster => Some(cluster_label(self.productivity_cluster)),
            other => number(self.measure(other)),
        }
    }
}

/// Endpoint-to-endpoint growth of one sector column in one district.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRecord {
    pub district: String,
    pub sector: Sector,
    pub column: Column,
    pub start_year: i32,
    pub end_year: i32,
    pub years_span: i32,
    pub total_growth_pct: f64,
    pub annualized_growth_pct: f64,
    /// Only one distinct year was available; both rates are zero.
    pub insufficient_range: bool,
}

impl Record for GrowthRecord {
    fn cell(&self, column: Column) -> Option<CellValue> {
        match column {
            Column::District => Some(CellValue::Text(self.district.clone())),
            Column::Sector => Some(CellValue::Text(self.sector.label().to_string())),
            Column::Year => Some(CellValue::Int(self.end_year as i64)),
            Column::YearsSpan => Some(CellValue::Int(self.years_span as i64)),
            Column::TotalGrowth => Some(CellValue::Number(self.total_growth_pct)),
            Column::AnnualGrowth => Some(CellValue::Number(self.annualized_growth_pct)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTally {
    pub cluster: Option<i32>,
    pub observations: usize,
    pub districts: usize,
}

impl Record for ClusterTally {
    fn cell(&self, column: Column) -> Option<CellValue> {
        match column {
            Column::Cluster => Some(cluster_label(self.cluster)),
            Column::Observations => Some(CellValue::Int(self.observations as i64)),
            Column::Districts => Some(CellValue::Int(self.districts as i64)),
            _ => None,
        }
    }
}

/// Per-year means of a set of columns, each with its own "no data" state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyMean {
    pub year: i32,
    pub values: Vec<(Column, Option<f64>)>,
}

impl Record for YearlyMean {
    fn cell(&self, column: Column) -> Option<CellValue> {
        if column == Column::Year {
            return Some(CellValue::Int(self.year as i64));
        }
        self.values
            .iter()
            .find(|(c, _)| *c == column)
            .and_then(|(_, v)| number(*v))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorTotal {
    pub sector: Sector,
    pub total: f64,
}

impl Record for SectorTotal {
    fn cell(&self, column: Column) -> Option<CellValue> {
        match column {
            Column::Sector => Some(CellValue::Text(self.sector.label().to_string())),
            Column::Total => Some(CellValue::Number(self.total)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioRecord {
    pub district: String,
    pub year: i32,
    pub ratio: f64,
}

impl Record for RatioRecord {
    fn cell(&self, column: Column) -> Option<CellValue> {
        match column {
            Column::District => Some(CellValue::Text(self.district.clone())),
            Column::Year => Some(CellValue::Int(self.year as i64)),
            Column::ProductivityRatio => Some(CellValue::Number(self.ratio)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLocation {
    pub district_key: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// An observation after the left join with the location lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedObservation {
    pub observation: Observation,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocatedObservation {
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

impl Record for LocatedObservation {
    fn cell(&self, column: Column) -> Option<CellValue> {
        match column {
            Column::Latitude => number(self.latitude),
            Column::Longitude => number(self.longitude),
            other => self.observation.cell(other),
        }
    }
}

/// Row shape for the markdown preview of a chart's data points.
#[derive(Debug, Clone, Tabled)]
pub struct PointRow {
    #[tabled(rename = "Series")]
    pub series: String,
    #[tabled(rename = "X")]
    pub x: String,
    #[tabled(rename = "Y")]
    pub y: String,
}

#[cfg(test)]
pub(crate) fn observation(district: &str, year: i32) -> Observation {
    Observation {
        district: district.to_string(),
        year,
        production_smallholder: None,
        production_private: None,
        productivity_smallholder: None,
        productivity_private: None,
        log_production_smallholder: None,
        log_production_private: None,
        production_cluster: None,
        productivity_cluster: None,
    }
}
