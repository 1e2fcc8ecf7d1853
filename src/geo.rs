//! District location lookup and the left join onto observations.
//!
//! Names are matched on their trimmed, lower-cased form. The map views only
//! ever see rows that actually matched; see [`with_coordinates`].

use crate::error::{DashboardError, Result};
use crate::types::{GeoLocation, LocatedObservation, Observation, RawLocationRow};
use crate::util::{normalize_name, parse_f64_safe};
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const GRID_COLUMNS: usize = 5;
const GRID_ORIGIN: (f64, f64) = (106.0, -6.0);
const GRID_STEP: f64 = 0.5;
const CELL_SIZE: f64 = 0.4;

/// De-duplicated location table keyed by normalized district name.
#[derive(Debug, Clone, Default)]
pub struct GeoLookup {
    by_key: HashMap<String, GeoLocation>,
}

impl GeoLookup {
    /// Build from raw locations; the first entry per normalized name wins.
    pub fn from_locations<I>(locations: I) -> Self
    where
        I: IntoIterator<Item = GeoLocation>,
    {
        let mut by_key = HashMap::new();
        for mut loc in locations {
            loc.district_key = normalize_name(&loc.district_key);
            by_key.entry(loc.district_key.clone()).or_insert(loc);
        }
        GeoLookup { by_key }
    }

    pub fn get(&self, district: &str) -> Option<&GeoLocation> {
        self.by_key.get(&normalize_name(district))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

pub fn read_locations<R: Read>(source: R) -> Result<GeoLookup> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(source);
    let headers = rdr.headers()?.clone();
    for col in ["bps_kota_nama", "latitude", "longitude"] {
        if !headers.iter().any(|h| h.trim() == col) {
            return Err(DashboardError::MissingColumn(col.to_string()));
        }
    }

    let mut locations = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.deserialize::<RawLocationRow>() {
        let Ok(row) = result else {
            skipped += 1;
            continue;
        };
        let name = row.district.as_deref().unwrap_or("").trim();
        let lat = parse_f64_safe(row.latitude.as_deref());
        let lon = parse_f64_safe(row.longitude.as_deref());
        match (name.is_empty(), lat, lon) {
            (false, Some(latitude), Some(longitude)) => locations.push(GeoLocation {
                district_key: name.to_string(),
                latitude,
                longitude,
            }),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "location rows without usable coordinates");
    }
    Ok(GeoLookup::from_locations(locations))
}

pub fn load_locations(path: &Path) -> Result<GeoLookup> {
    let shown = path.display().to_string();
    let file = File::open(path).map_err(|e| DashboardError::unavailable(&shown, e))?;
    let lookup = read_locations(file).map_err(|e| DashboardError::unavailable(&shown, e))?;
    if lookup.is_empty() {
        warn!(path = %shown, "location lookup has no usable rows");
    } else {
        info!(path = %shown, districts = lookup.len(), "location lookup loaded");
    }
    Ok(lookup)
}

/// Left join: every observation comes back, unmatched ones without
/// coordinates.
pub fn join_locations(observations: &[Observation], lookup: &GeoLookup) -> Vec<LocatedObservation> {
    observations
        .iter()
        .map(|o| {
            let loc = lookup.get(&o.district);
            LocatedObservation {
                observation: o.clone(),
                latitude: loc.map(|l| l.latitude),
                longitude: loc.map(|l| l.longitude),
            }
        })
        .collect()
}

/// Drop rows that would otherwise be plotted at an undefined location.
pub fn with_coordinates(rows: Vec<LocatedObservation>) -> (Vec<LocatedObservation>, usize) {
    let before = rows.len();
    let kept: Vec<LocatedObservation> = rows.into_iter().filter(|r| r.has_coordinates()).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// A synthetic square standing in for a district boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionBoundary {
    pub district: String,
    /// Closed ring of (longitude, latitude) pairs.
    pub ring: Vec<(f64, f64)>,
}

/// Lay the given districts out on a fixed grid east of 106°E, south of 6°S.
pub fn placeholder_boundaries<S: AsRef<str>>(districts: &[S]) -> Vec<RegionBoundary> {
    districts
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let row = (i / GRID_COLUMNS) as f64;
            let col = (i % GRID_COLUMNS) as f64;
            let x0 = GRID_ORIGIN.0 + col * GRID_STEP;
            let y0 = GRID_ORIGIN.1 - row * GRID_STEP;
            RegionBoundary {
                district: name.as_ref().to_string(),
                ring: vec![
                    (x0, y0),
                    (x0 + CELL_SIZE, y0),
                    (x0 + CELL_SIZE, y0 - CELL_SIZE),
                    (x0, y0 - CELL_SIZE),
                    (x0, y0),
                ],
            }
        })
        .collect()
}
