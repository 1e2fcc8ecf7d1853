use crate::types::{
    ClusterKind, ClusterTally, Column, GrowthRecord, Measure, Observation, RatioRecord, Sector,
    SectorTotal, YearlyMean,
};
use crate::util::{mean, normalize_name};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Sentinel reported when production starts from nothing.
pub const FROM_ZERO_GROWTH_PCT: f64 = 100.0;

/// Endpoint growth in percent. Zero starting values never divide.
pub fn growth_pct(v0: f64, v1: f64) -> f64 {
    if v0 > 0.0 {
        ((v1 / v0) - 1.0) * 100.0
    } else if v1 > 0.0 {
        FROM_ZERO_GROWTH_PCT
    } else {
        0.0
    }
}

/// Growth of one sector column over one district's rows. Missing values at
/// the endpoints count as zero. Returns `None` only for an empty slice.
pub fn district_growth(
    rows: &[&Observation],
    sector: Sector,
    measure: Measure,
) -> Option<GrowthRecord> {
    let first = rows.iter().min_by_key(|o| o.year)?;
    let last = rows.iter().max_by_key(|o| o.year)?;
    let column = measure.column(sector);
    let (y0, y1) = (first.year, last.year);
    let insufficient_range = y0 == y1;
    let years_span = (y1 - y0).max(1);
    let total_growth_pct = if insufficient_range {
        0.0
    } else {
        let v0 = first.measure(column).unwrap_or(0.0);
        let v1 = last.measure(column).unwrap_or(0.0);
        growth_pct(v0, v1)
    };
    Some(GrowthRecord {
        district: first.district.clone(),
        sector,
        column,
        start_year: y0,
        end_year: y1,
        years_span,
        total_growth_pct,
        annualized_growth_pct: total_growth_pct / years_span as f64,
        insufficient_range,
    })
}

fn by_annual_desc(a: &GrowthRecord, b: &GrowthRecord) -> Ordering {
    b.annualized_growth_pct
        .partial_cmp(&a.annualized_growth_pct)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.district.cmp(&b.district))
        .then_with(|| a.sector.cmp(&b.sector))
}

/// Growth for every (district, sector) pair, fastest annualized first.
/// An empty `districts` slice means every district in `rows`.
pub fn growth_table(
    rows: &[Observation],
    districts: &[String],
    sectors: &[Sector],
    measure: Measure,
) -> Vec<GrowthRecord> {
    let wanted: HashSet<String> = districts.iter().map(|d| normalize_name(d)).collect();
    let mut groups: BTreeMap<String, Vec<&Observation>> = BTreeMap::new();
    for o in rows {
        let key = o.key();
        if wanted.is_empty() || wanted.contains(&key) {
            groups.entry(key).or_default().push(o);
        }
    }

    let mut out: Vec<GrowthRecord> = groups
        .values()
        .flat_map(|group| {
            sectors
                .iter()
                .filter_map(move |s| district_growth(group, *s, measure))
        })
        .collect();
    out.sort_by(by_annual_desc);
    out
}

/// Keep only the records of the `n` districts with the highest mean
/// annualized growth across their sectors.
pub fn top_growth_districts(records: &[GrowthRecord], n: usize) -> Vec<GrowthRecord> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for r in records {
        let e = sums.entry(r.district.as_str()).or_insert((0.0, 0));
        e.0 += r.annualized_growth_pct;
        e.1 += 1;
    }
    let mut ranked: Vec<(&str, f64)> = sums
        .into_iter()
        .map(|(d, (s, c))| (d, s / c as f64))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let keep: HashSet<&str> = ranked.into_iter().take(n).map(|(d, _)| d).collect();
    records
        .iter()
        .filter(|r| keep.contains(r.district.as_str()))
        .cloned()
        .collect()
}

pub fn rows_for_year(rows: &[Observation], year: Option<i32>) -> Vec<Observation> {
    rows.iter()
        .filter(|o| year.map_or(true, |y| o.year == y))
        .cloned()
        .collect()
}

pub fn rows_for_districts(rows: &[Observation], districts: &[String]) -> Vec<Observation> {
    let wanted: HashSet<String> = districts.iter().map(|d| normalize_name(d)).collect();
    rows.iter()
        .filter(|o| wanted.contains(&o.key()))
        .cloned()
        .collect()
}

/// Mean of a column over present values, optionally for one year only.
/// `None` is "no data", never a disguised zero.
pub fn mean_of(rows: &[Observation], column: Column, year: Option<i32>) -> Option<f64> {
    mean(
        rows.iter()
            .filter(|o| year.map_or(true, |y| o.year == y))
            .map(|o| o.measure(column)),
    )
}

/// Private estate mean productivity minus smallholder mean productivity.
pub fn productivity_gap(rows: &[Observation], year: Option<i32>) -> Option<f64> {
    let smallholder = mean_of(rows, Column::ProductivitySmallholder, year)?;
    let private = mean_of(rows, Column::ProductivityPrivate, year)?;
    Some(private - smallholder)
}

pub fn cluster_tally(rows: &[Observation], kind: ClusterKind) -> Vec<ClusterTally> {
    let mut groups: BTreeMap<Option<i32>, (usize, BTreeSet<String>)> = BTreeMap::new();
    for o in rows {
        let e = groups.entry(o.cluster(kind)).or_default();
        e.0 += 1;
        e.1.insert(o.key());
    }
    groups
        .into_iter()
        .map(|(cluster, (observations, districts))| ClusterTally {
            cluster,
            observations,
            districts: districts.len(),
        })
        .collect()
}

pub fn yearly_means(rows: &[Observation], columns: &[Column]) -> Vec<YearlyMean> {
    let mut by_year: BTreeMap<i32, Vec<&Observation>> = BTreeMap::new();
    for o in rows {
        by_year.entry(o.year).or_default().push(o);
    }
    by_year
        .into_iter()
        .map(|(year, group)| YearlyMean {
            year,
            values: columns
                .iter()
                .map(|c| (*c, mean(group.iter().map(|o| o.measure(*c)))))
                .collect(),
        })
        .collect()
}

/// Total production per sector; missing values add nothing.
pub fn sector_totals(rows: &[Observation]) -> Vec<SectorTotal> {
    Sector::ALL
        .iter()
        .map(|s| SectorTotal {
            sector: *s,
            total: rows
                .iter()
                .filter_map(|o| o.measure(s.production()))
                .sum(),
        })
        .collect()
}

/// Private/smallholder productivity ratio where both sectors operate.
pub fn productivity_ratios(rows: &[Observation]) -> Vec<RatioRecord> {
    let mut out: Vec<RatioRecord> = rows
        .iter()
        .filter_map(|o| match (o.productivity_smallholder, o.productivity_private) {
            (Some(s), Some(p)) if s > 0.0 => Some(RatioRecord {
                district: o.district.clone(),
                year: o.year,
                ratio: p / s,
            }),
            _ => None,
        })
        .collect();
    out.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap_or(Ordering::Equal));
    out
}

/// The `n` largest rows by a column; rows missing the value are left out.
pub fn top_n(rows: &[Observation], column: Column, n: usize) -> Vec<Observation> {
    let mut present: Vec<(f64, &Observation)> = rows
        .iter()
        .filter_map(|o| o.measure(column).map(|v| (v, o)))
        .collect();
    present.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.district.cmp(&b.1.district))
    });
    present.into_iter().take(n).map(|(_, o)| o.clone()).collect()
}

/// Both sectors' production summed over `year`. `None` when no row has a
/// production figure.
pub fn total_production_of(rows: &[Observation], year: Option<i32>) -> Option<f64> {
    rows.iter()
        .filter(|o| year.map_or(true, |y| o.year == y))
        .filter_map(|o| o.total_production())
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Distinct districts with non-zero production in either sector.
pub fn active_districts(rows: &[Observation]) -> usize {
    rows.iter()
        .filter(|o| o.is_producing())
        .map(|o| o.key())
        .collect::<HashSet<_>>()
        .len()
}

/// Display names of the `n` districts with the largest cumulative value of a
/// column across all years. Districts without any value are left out.
pub fn top_cumulative_districts(rows: &[Observation], column: Column, n: usize) -> Vec<String> {
    let mut sums: BTreeMap<String, (String, f64)> = BTreeMap::new();
    for o in rows {
        if let Some(v) = o.measure(column) {
            let e = sums.entry(o.key()).or_insert_with(|| (o.district.clone(), 0.0));
            e.1 += v;
        }
    }
    let mut ranked: Vec<(String, f64)> = sums.into_values().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.into_iter().take(n).map(|(d, _)| d).collect()
}

/// Rows with a positive value in `column`, largest first.
pub fn positive_desc(rows: &[Observation], column: Column) -> Vec<Observation> {
    let positive: Vec<Observation> = rows
        .iter()
        .filter(|o| o.measure(column).map_or(false, |v| v > 0.0))
        .cloned()
        .collect();
    sorted_desc(&positive, column)
}

/// Rows sorted descending by a column, missing values last.
pub fn sorted_desc(rows: &[Observation], column: Column) -> Vec<Observation> {
    let mut out = rows.to_vec();
    out.sort_by(|a, b| match (a.measure(column), b.measure(column)) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::observation;

    fn production(district: &str, points: &[(i32, f64)]) -> Vec<Observation> {
        points
            .iter()
            .map(|(y, v)| {
                let mut o = observation(district, *y);
                o.production_smallholder = Some(*v);
                o
            })
            .collect()
    }

    fn growth(rows: &[Observation]) -> GrowthRecord {
        let refs: Vec<&Observation> = rows.iter().collect();
        district_growth(&refs, Sector::Smallholder, Measure::Production).unwrap()
    }

    #[test]
    fn cianjur_doubles_over_seven_years() {
        let g = growth(&production("CIANJUR", &[(2017, 5000.0), (2024, 10000.0)]));
        assert_eq!(g.total_growth_pct, 100.0);
        assert_eq!(g.years_span, 7);
        assert!((g.annualized_growth_pct - 14.2857).abs() < 1e-3);
        assert!(!g.insufficient_range);
    }

    #[test]
    fn bogor_zero_to_zero_is_no_growth() {
        let g = growth(&production("BOGOR", &[(2017, 0.0), (2024, 0.0)]));
        assert_eq!(g.total_growth_pct, 0.0);
        assert_eq!(g.annualized_growth_pct, 0.0);
    }

    #[test]
    fn starting_from_zero_reports_the_sentinel() {
        let g = growth(&production("X", &[(2017, 0.0), (2024, 20.0)]));
        assert_eq!(g.total_growth_pct, FROM_ZERO_GROWTH_PCT);
        assert!((g.annualized_growth_pct - 100.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn endpoints_ignore_row_order_and_middle_years() {
        let g = growth(&production(
            "GARUT",
            &[(2020, 1.0), (2024, 150.0), (2017, 200.0), (2019, 9999.0)],
        ));
        assert_eq!((g.start_year, g.end_year), (2017, 2024));
        assert_eq!(g.total_growth_pct, -25.0);
        assert_eq!(g.annualized_growth_pct, g.total_growth_pct / 7.0);
    }

    #[test]
    fn single_year_is_flagged_insufficient() {
        let g = growth(&production("KOTA BANJAR", &[(2020, 50.0)]));
        assert!(g.insufficient_range);
        assert_eq!(g.years_span, 1);
        assert_eq!(g.total_growth_pct, 0.0);
        assert_eq!(g.annualized_growth_pct, 0.0);
    }

    #[test]
    fn growth_table_is_sorted_by_annual_rate() {
        let mut rows = production("A", &[(2017, 100.0), (2024, 110.0)]);
        rows.extend(production("B", &[(2017, 100.0), (2024, 300.0)]));
        rows.extend(production("C", &[(2017, 100.0), (2024, 50.0)]));
        let table = growth_table(&rows, &[], &[Sector::Smallholder], Measure::Production);
        let order: Vec<&str> = table.iter().map(|g| g.district.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        for g in &table {
            assert_eq!(g.annualized_growth_pct, g.total_growth_pct / g.years_span.max(1) as f64);
        }
    }

    #[test]
    fn growth_table_covers_each_requested_sector_and_district() {
        let mut rows = production("A", &[(2017, 100.0), (2024, 200.0)]);
        rows.extend(production("b ", &[(2017, 100.0), (2024, 200.0)]));
        let table = growth_table(
            &rows,
            &["B".to_string()],
            &Sector::ALL,
            Measure::Production,
        );
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|g| g.district.trim() == "b"));
        // Private production is missing everywhere: zero to zero.
        let private = table.iter().find(|g| g.sector == Sector::Private).unwrap();
        assert_eq!(private.total_growth_pct, 0.0);
    }

    #[test]
    fn top_growth_keeps_whole_districts() {
        let mut rows = production("A", &[(2017, 100.0), (2024, 110.0)]);
        rows.extend(production("B", &[(2017, 100.0), (2024, 300.0)]));
        rows.extend(production("C", &[(2017, 100.0), (2024, 50.0)]));
        let table = growth_table(&rows, &[], &Sector::ALL, Measure::Production);
        let top = top_growth_districts(&table, 2);
        assert_eq!(top.len(), 4);
        assert!(top.iter().all(|g| g.district != "C"));
    }

    #[test]
    fn mean_excludes_missing_and_reports_no_data() {
        let mut a = observation("A", 2020);
        a.productivity_smallholder = Some(1000.0);
        let mut b = observation("B", 2020);
        b.productivity_smallholder = None;
        let mut c = observation("C", 2021);
        c.productivity_smallholder = Some(2000.0);
        let rows = vec![a, b, c];
        assert_eq!(mean_of(&rows, Column::ProductivitySmallholder, Some(2020)), Some(1000.0));
        assert_eq!(mean_of(&rows, Column::ProductivitySmallholder, None), Some(1500.0));
        assert_eq!(mean_of(&rows, Column::ProductivityPrivate, None), None);
        assert_eq!(mean_of(&rows, Column::ProductivitySmallholder, Some(2030)), None);
        assert_eq!(productivity_gap(&rows, None), None);
    }

    #[test]
    fn cluster_tally_sums_to_row_count() {
        let mut rows = Vec::new();
        for (d, y, c) in [
            ("A", 2020, Some(1)),
            ("A", 2021, Some(1)),
            ("B", 2020, Some(2)),
            ("C", 2020, None),
            ("a ", 2022, Some(2)),
        ] {
            let mut o = observation(d, y);
            o.productivity_cluster = c;
            rows.push(o);
        }
        let tally = cluster_tally(&rows, ClusterKind::Productivity);
        let total: usize = tally.iter().map(|t| t.observations).sum();
        assert_eq!(total, rows.len());
        let distinct: HashSet<String> = rows.iter().map(|o| o.key()).collect();
        assert!(tally.iter().all(|t| t.districts <= distinct.len()));
        let two = tally.iter().find(|t| t.cluster == Some(2)).unwrap();
        assert_eq!((two.observations, two.districts), (2, 2));
        let one = tally.iter().find(|t| t.cluster == Some(1)).unwrap();
        assert_eq!((one.observations, one.districts), (2, 1));

        let year_2020 = rows_for_year(&rows, Some(2020));
        let per_year: usize = cluster_tally(&year_2020, ClusterKind::Productivity)
            .iter()
            .map(|t| t.observations)
            .sum();
        assert_eq!(per_year, 3);
    }

    #[test]
    fn ratios_require_both_sectors() {
        let mut a = observation("A", 2020);
        a.productivity_smallholder = Some(1000.0);
        a.productivity_private = Some(1500.0);
        let mut b = observation("B", 2020);
        b.productivity_private = Some(1500.0);
        let mut c = observation("C", 2020);
        c.productivity_smallholder = Some(1000.0);
        c.productivity_private = Some(3000.0);
        let ratios = productivity_ratios(&[a, b, c]);
        assert_eq!(ratios.len(), 2);
        assert_eq!(ratios[0].district, "C");
        assert_eq!(ratios[1].ratio, 1.5);
    }

    #[test]
    fn yearly_means_keep_a_no_data_state_per_column() {
        let mut a = observation("A", 2017);
        a.productivity_smallholder = Some(800.0);
        let mut b = observation("B", 2017);
        b.productivity_smallholder = Some(1200.0);
        let means = yearly_means(
            &[a, b],
            &[Column::ProductivitySmallholder, Column::ProductivityPrivate],
        );
        assert_eq!(means.len(), 1);
        assert_eq!(means[0].values[0], (Column::ProductivitySmallholder, Some(1000.0)));
        assert_eq!(means[0].values[1], (Column::ProductivityPrivate, None));
    }

    #[test]
    fn top_n_skips_missing_and_sector_totals_sum() {
        let mut rows = production("A", &[(2020, 10.0)]);
        rows.extend(production("B", &[(2020, 30.0)]));
        rows.push(observation("C", 2020));
        rows[0].production_private = Some(5.0);
        let top = top_n(&rows, Column::ProductionSmallholder, 5);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].district, "B");
        let totals = sector_totals(&rows);
        assert_eq!(totals[0].total, 40.0);
        assert_eq!(totals[1].total, 5.0);
        let sorted = sorted_desc(&rows, Column::ProductionSmallholder);
        assert_eq!(sorted.last().unwrap().district, "C");
    }

    #[test]
    fn year_totals_keep_a_no_data_state() {
        let mut rows = production("A", &[(2020, 10.0), (2021, 7.0)]);
        rows[0].production_private = Some(5.0);
        rows.push(observation("B", 2020));
        assert_eq!(total_production_of(&rows, Some(2020)), Some(15.0));
        assert_eq!(total_production_of(&rows, None), Some(22.0));
        assert_eq!(total_production_of(&rows, Some(2030)), None);
        assert_eq!(active_districts(&rows_for_year(&rows, Some(2020))), 1);
    }

    #[test]
    fn cumulative_ranking_merges_spellings() {
        let mut rows = production("Kota Bogor", &[(2017, 50.0)]);
        rows.extend(production("KOTA BOGOR", &[(2018, 60.0)]));
        rows.extend(production("GARUT", &[(2017, 100.0)]));
        rows.extend(production("DEPOK", &[(2017, 1.0)]));
        rows.push(observation("CIMAHI", 2017));
        let top = top_cumulative_districts(&rows, Column::ProductionSmallholder, 2);
        assert_eq!(top, vec!["Kota Bogor".to_string(), "GARUT".to_string()]);
        let all = top_cumulative_districts(&rows, Column::ProductionSmallholder, 10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn positive_desc_drops_zero_and_missing() {
        let mut rows = production("A", &[(2020, 0.0)]);
        rows.extend(production("B", &[(2020, 3.0)]));
        rows.extend(production("C", &[(2020, 9.0)]));
        rows.push(observation("D", 2020));
        let ranked = positive_desc(&rows, Column::ProductionSmallholder);
        let names: Vec<&str> = ranked.iter().map(|o| o.district.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);
    }

    #[test]
    fn district_filter_matches_normalized_names() {
        let rows = vec![observation("Kabupaten Bandung ", 2020), observation("KOTA BOGOR", 2020)];
        let picked = rows_for_districts(&rows, &["kabupaten bandung".to_string()]);
        assert_eq!(picked.len(), 1);
    }
}
