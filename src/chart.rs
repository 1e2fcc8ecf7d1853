//! Chart specifications and tables built from any [`Record`] slice.
//!
//! A `ChartSpec` is plain data: series of points plus enough metadata for a
//! rendering library to draw it. Nothing here knows about pages.

use crate::error::{DashboardError, Result};
use crate::geo::{placeholder_boundaries, RegionBoundary};
use crate::types::{CellValue, Column, Record};
use serde::Serialize;

/// Floor for bubble sizes so zero or missing values stay visible on maps.
pub const MIN_BUBBLE_SIZE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChartKind {
    Bar,
    GroupedBar,
    HorizontalBar,
    Line,
    Pie,
    Scatter,
    Choropleth,
    BubbleMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayoutRegion {
    Full,
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub title: String,
    pub kind: ChartKind,
    pub x: Column,
    pub y: Vec<Column>,
    pub color: Option<Column>,
    pub size: Option<Column>,
    pub region: LayoutRegion,
}

impl ChartRequest {
    pub fn new(kind: ChartKind, title: impl Into<String>, x: Column, y: Column) -> Self {
        ChartRequest {
            title: title.into(),
            kind,
            x,
            y: vec![y],
            color: None,
            size: None,
            region: LayoutRegion::Full,
        }
    }

    pub fn also(mut self, y: Column) -> Self {
        self.y.push(y);
        self
    }

    pub fn color(mut self, column: Column) -> Self {
        self.color = Some(column);
        self
    }

    pub fn size(mut self, column: Column) -> Self {
        self.size = Some(column);
        self
    }

    pub fn region(mut self, region: LayoutRegion) -> Self {
        self.region = region;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: CellValue,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub region: LayoutRegion,
    pub x_label: String,
    pub y_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_label: Option<String>,
    pub series: Vec<Series>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boundaries: Vec<RegionBoundary>,
}

impl ChartSpec {
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }
}

fn push_point(series: &mut Vec<Series>, name: String, point: Point) {
    match series.iter_mut().find(|s| s.name == name) {
        Some(s) => s.points.push(point),
        None => series.push(Series { name, points: vec![point] }),
    }
}

/// The single chart builder every page goes through.
///
/// Series layout:
/// - several `y` columns give one series per column;
/// - a categorical `color` column gives one series per color value;
/// - otherwise there is one series and color rides along on each point.
///
/// Rows missing `x` or `y` are skipped. A chart with no points at all is an
/// [`DashboardError::EmptySelection`].
pub fn build_chart<R: Record>(rows: &[R], request: &ChartRequest) -> Result<ChartSpec> {
    let split_by_color = request.y.len() == 1
        && request.color.map_or(false, |c| c.is_categorical());
    let mut series: Vec<Series> = Vec::new();

    for row in rows {
        let Some(x) = row.cell(request.x) else { continue };
        let color = request.color.and_then(|c| row.cell(c));
        let label = row.cell(Column::District).map(|d| d.to_string());
        let size = match (request.kind, request.size) {
            (ChartKind::BubbleMap, Some(c)) => Some(
                row.cell(c)
                    .and_then(|v| v.as_f64())
                    .filter(|v| *v > 0.0)
                    .unwrap_or(MIN_BUBBLE_SIZE),
            ),
            (_, Some(c)) => row.cell(c).and_then(|v| v.as_f64()),
            (_, None) => None,
        };

        for y_col in &request.y {
            let Some(y) = row.cell(*y_col).and_then(|v| v.as_f64()) else { continue };
            let name = if request.y.len() > 1 {
                y_col.label().to_string()
            } else if split_by_color {
                color.as_ref().map(|c| c.to_string()).unwrap_or_default()
            } else {
                y_col.label().to_string()
            };
            let point = Point {
                x: x.clone(),
                y,
                color: if split_by_color { None } else { color.clone() },
                size,
                label: label.clone(),
            };
            push_point(&mut series, name, point);
        }
    }

    let spec = ChartSpec {
        title: request.title.clone(),
        kind: request.kind,
        region: request.region,
        x_label: request.x.label().to_string(),
        y_label: match request.y.as_slice() {
            [single] => single.label().to_string(),
            _ => "Value".to_string(),
        },
        color_label: request.color.map(|c| c.label().to_string()),
        boundaries: Vec::new(),
        series,
    };
    if spec.point_count() == 0 {
        return Err(DashboardError::EmptySelection(request.title.clone()));
    }
    if spec.kind == ChartKind::Choropleth {
        let mut districts: Vec<String> = Vec::new();
        for p in spec.series.iter().flat_map(|s| &s.points) {
            let name = p.x.to_string();
            if !districts.contains(&name) {
                districts.push(name);
            }
        }
        return Ok(ChartSpec {
            boundaries: placeholder_boundaries(&districts),
            ..spec
        });
    }
    Ok(spec)
}

/// A plain table of formatted cells, ready to print or export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    pub fn from_records<R: Record>(title: &str, rows: &[R], columns: &[Column]) -> Result<Self> {
        if rows.is_empty() {
            return Err(DashboardError::EmptySelection(title.to_string()));
        }
        Ok(TableView {
            title: title.to_string(),
            columns: columns.iter().map(|c| c.label().to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| {
                    columns
                        .iter()
                        .map(|c| r.cell(*c).map(|v| v.to_string()).unwrap_or_default())
                        .collect()
                })
                .collect(),
        })
    }
}
