use crate::error::{DashboardError, Result};
use crate::geo::{self, GeoLookup};
use crate::types::{Observation, RawRow};
use crate::util::{is_blank, normalize_name, parse_f64_safe, parse_i32_safe};
use csv::ReaderBuilder;
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REQUIRED_COLUMNS: [&str; 2] = ["kab_kota", "tahun"];

const SAMPLE_DISTRICTS: [&str; 5] = [
    "KABUPATEN CIANJUR",
    "KABUPATEN TASIKMALAYA",
    "KABUPATEN BANDUNG",
    "KABUPATEN GARUT",
    "KABUPATEN SUKABUMI",
];
const SAMPLE_YEARS: std::ops::RangeInclusive<i32> = 2017..=2024;
pub const SAMPLE_SEED: u64 = 2017;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
    pub malformed_values: usize,
    pub zero_productivity: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataSource {
    File(PathBuf),
    Synthetic { reason: String },
}

/// The immutable table every view is derived from.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub observations: Vec<Observation>,
    pub report: LoadReport,
    pub source: DataSource,
}

impl Dataset {
    pub fn is_synthetic(&self) -> bool {
        matches!(self.source, DataSource::Synthetic { .. })
    }

    /// Warnings that must stay visible on every render.
    pub fn warnings(&self) -> Vec<String> {
        match &self.source {
            DataSource::Synthetic { reason } => vec![format!(
                "Using sample data for testing purposes ({}).",
                reason
            )],
            DataSource::File(_) => Vec::new(),
        }
    }

    pub fn years(&self) -> Vec<i32> {
        available_years(&self.observations)
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.years().last().copied()
    }
}

struct Coercer<'a> {
    report: &'a mut LoadReport,
    district: &'a str,
}

impl Coercer<'_> {
    fn number(&mut self, field: &str, raw: Option<&str>) -> Option<f64> {
        let value = parse_f64_safe(raw);
        if value.is_none() && !is_blank(raw) {
            self.report.malformed_values += 1;
            debug!(
                district = self.district,
                field,
                raw = ?raw,
                "coerced malformed value to missing"
            );
        }
        value
    }

    /// Productivity zero means the sector was not operating that year.
    fn productivity(&mut self, field: &str, raw: Option<&str>) -> Option<f64> {
        match self.number(field, raw) {
            Some(v) if v == 0.0 => {
                self.report.zero_productivity += 1;
                None
            }
            other => other,
        }
    }

    fn label(&mut self, field: &str, raw: Option<&str>) -> Option<i32> {
        let value = parse_i32_safe(raw);
        if value.is_none() && !is_blank(raw) {
            self.report.malformed_values += 1;
            debug!(
                district = self.district,
                field,
                raw = ?raw,
                "coerced malformed label to missing"
            );
        }
        value
    }
}

/// Read and clean observations from any CSV source.
pub fn read_observations<R: Read>(source: R) -> Result<(Vec<Observation>, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(source);
    let headers = rdr.headers()?.clone();
    for col in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h.trim() == col) {
            return Err(DashboardError::MissingColumn(col.to_string()));
        }
    }

    let mut report = LoadReport::default();
    let mut seen: HashSet<(String, i32)> = HashSet::new();
    // First spelling seen per normalized name is used for display.
    let mut names: HashMap<String, String> = HashMap::new();
    let mut observations = Vec::new();

    for result in rdr.deserialize::<RawRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(row = report.total_rows, error = %e, "skipping unreadable row");
                report.parse_errors += 1;
                continue;
            }
        };

        let district = row.district.as_deref().unwrap_or("").trim().to_string();
        let year = parse_i32_safe(row.year.as_deref());
        let year = match year {
            Some(y) if !district.is_empty() => y,
            _ => {
                report.parse_errors += 1;
                continue;
            }
        };

        let key = normalize_name(&district);
        if !seen.insert((key.clone(), year)) {
            warn!(district = %district, year, "duplicate district/year row dropped");
            report.duplicates += 1;
            continue;
        }
        let district = names.entry(key).or_insert(district).clone();

        let mut c = Coercer { report: &mut report, district: &district };
        let observation = Observation {
            production_smallholder: c
                .number("produksi_rakyat", row.production_smallholder.as_deref()),
            production_private: c.number("produksi_swasta", row.production_private.as_deref()),
            productivity_smallholder: c
                .productivity("produktivitas_rakyat", row.productivity_smallholder.as_deref()),
            productivity_private: c
                .productivity("produktivitas_swasta", row.productivity_private.as_deref()),
            log_production_smallholder: c
                .number("log_prdks_rakyat", row.log_production_smallholder.as_deref()),
            log_production_private: c
                .number("log_prdks_swasta", row.log_production_private.as_deref()),
            production_cluster: c.label("cluster_produksi", row.production_cluster.as_deref()),
            productivity_cluster: c
                .label("cluster_produktivitas", row.productivity_cluster.as_deref()),
            district,
            year,
        };
        observations.push(observation);
    }

    report.loaded_rows = observations.len();
    Ok((observations, report))
}

/// Load the primary dataset. Any failure to produce at least one usable row
/// is reported as `DataUnavailable`.
pub fn load_observations(path: &Path) -> Result<(Vec<Observation>, LoadReport)> {
    let shown = path.display().to_string();
    let file = File::open(path).map_err(|e| DashboardError::unavailable(&shown, e))?;
    let (observations, report) =
        read_observations(file).map_err(|e| DashboardError::unavailable(&shown, e))?;
    if observations.is_empty() {
        return Err(DashboardError::unavailable(&shown, "no valid rows"));
    }
    Ok((observations, report))
}

/// A deterministic stand-in table with the same schema as the real file.
pub fn synthetic_dataset(seed: u64) -> Vec<Observation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(SAMPLE_DISTRICTS.len() * SAMPLE_YEARS.count());
    for district in SAMPLE_DISTRICTS {
        for year in SAMPLE_YEARS {
            let production_smallholder = rng.gen_range(2000..13000) as f64;
            let production_private = rng.gen_range(0..12000) as f64;
            let productivity_smallholder = rng.gen_range(700..2200) as f64;
            let productivity_private = if rng.gen::<f64>() > 0.3 {
                rng.gen_range(900..2300) as f64
            } else {
                0.0
            };
            out.push(Observation {
                district: district.to_string(),
                year,
                production_smallholder: Some(production_smallholder),
                production_private: Some(production_private),
                productivity_smallholder: Some(productivity_smallholder),
                productivity_private: (productivity_private > 0.0).then_some(productivity_private),
                log_production_smallholder: Some((production_smallholder + 1.0).ln()),
                log_production_private: Some((production_private + 1.0).ln()),
                production_cluster: Some(if production_smallholder == 0.0 { 0 } else { 1 }),
                productivity_cluster: Some(if productivity_smallholder == 0.0 { 0 } else { 1 }),
            });
        }
    }
    out
}

/// Never fails: a missing or malformed file is replaced by sample data.
pub fn load_or_synthetic(path: &Path, seed: u64) -> Dataset {
    match load_observations(path) {
        Ok((observations, report)) => {
            info!(
                path = %path.display(),
                rows = report.total_rows,
                loaded = report.loaded_rows,
                parse_errors = report.parse_errors,
                malformed = report.malformed_values,
                "dataset loaded"
            );
            Dataset {
                observations,
                report,
                source: DataSource::File(path.to_path_buf()),
            }
        }
        Err(e) => {
            warn!(error = %e, "falling back to synthetic dataset");
            let observations = synthetic_dataset(seed);
            let report = LoadReport {
                total_rows: observations.len(),
                loaded_rows: observations.len(),
                ..LoadReport::default()
            };
            Dataset {
                observations,
                report,
                source: DataSource::Synthetic { reason: e.to_string() },
            }
        }
    }
}

/// Districts with non-zero production in either sector at least once, one
/// entry per normalized name.
pub fn producing_districts(observations: &[Observation]) -> Vec<String> {
    let mut keys = HashSet::new();
    let set: BTreeSet<&str> = observations
        .iter()
        .filter(|o| o.is_producing() && keys.insert(o.key()))
        .map(|o| o.district.as_str())
        .collect();
    set.into_iter().map(str::to_string).collect()
}

pub fn available_years(observations: &[Observation]) -> Vec<i32> {
    let set: BTreeSet<i32> = observations.iter().map(|o| o.year).collect();
    set.into_iter().collect()
}

/// Per-session memo of the loaded inputs. Both are read at most once and
/// never change afterwards.
pub struct Session {
    data_path: PathBuf,
    locations_path: PathBuf,
    seed: u64,
    dataset: OnceCell<Dataset>,
    locations: OnceCell<Option<GeoLookup>>,
}

impl Session {
    pub fn new(data_path: impl Into<PathBuf>, locations_path: impl Into<PathBuf>) -> Self {
        Session {
            data_path: data_path.into(),
            locations_path: locations_path.into(),
            seed: SAMPLE_SEED,
            dataset: OnceCell::new(),
            locations: OnceCell::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        self.dataset
            .get_or_init(|| load_or_synthetic(&self.data_path, self.seed))
    }

    /// `None` when the lookup file cannot be read; the map page shows a notice.
    pub fn locations(&self) -> Option<&GeoLookup> {
        self.locations
            .get_or_init(|| match geo::load_locations(&self.locations_path) {
                Ok(lookup) => Some(lookup),
                Err(e) => {
                    warn!(error = %e, "location lookup unavailable");
                    None
                }
            })
            .as_ref()
    }
}
