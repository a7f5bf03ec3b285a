//! Performance table: one row per (month, product category).

use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    #[serde(alias = "bulan")]
    pub month: u32,
    #[serde(alias = "Categori Produk")]
    pub category: String,
    #[serde(deserialize_with = "blank_as_zero")]
    pub prior_year_revenue: f64,
    #[serde(deserialize_with = "blank_as_zero")]
    pub current_year_revenue: f64,
    #[serde(alias = "Target Tahun Ini", deserialize_with = "blank_as_zero")]
    pub target: f64,
}

fn blank_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    cleaned.parse().map_err(serde::de::Error::custom)
}

/// Figures for one calendar month, summed over categories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MonthFigures {
    pub month: u32,
    pub prior_year_revenue: f64,
    pub current_year_revenue: f64,
    pub target: f64,
}

pub fn load_performance(path: &Path) -> Result<Vec<PerformanceRecord>, AppError> {
    let file = File::open(path).map_err(|err| {
        AppError::InvalidInput(format!(
            "cannot open performance data {}: {err}",
            path.display()
        ))
    })?;
    read_performance(file)
}

/// Revenue columns are named after their year in older exports
/// ("Kinerja 2024", "Kinerja 2025"); the earlier year is the prior year.
pub fn read_performance<R: Read>(source: R) -> Result<Vec<PerformanceRecord>, AppError> {
    let mut reader = csv::Reader::from_reader(source);
    let headers = normalize_headers(reader.headers()?);
    reader.set_headers(headers);

    let mut records = Vec::new();
    for row in reader.deserialize::<PerformanceRecord>() {
        let record = row?;
        if !(1..=12).contains(&record.month) {
            return Err(AppError::InvalidInput(format!(
                "month {} out of range for category {}",
                record.month, record.category
            )));
        }
        records.push(record);
    }
    Ok(records)
}

fn normalize_headers(headers: &csv::StringRecord) -> csv::StringRecord {
    let mut yearly: Vec<(i32, usize)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let year = name.trim().strip_prefix("Kinerja ")?.trim().parse().ok()?;
            Some((year, idx))
        })
        .collect();
    yearly.sort();

    let mut names: Vec<String> = headers.iter().map(|name| name.trim().to_string()).collect();
    if let [(_, prior), (_, current)] = yearly.as_slice() {
        names[*prior] = "prior_year_revenue".to_string();
        names[*current] = "current_year_revenue".to_string();
    }
    csv::StringRecord::from(names)
}

/// Splits rows into (excluding, including) views of the disbursement set.
pub fn partition(
    records: &[PerformanceRecord],
    disbursement: &[String],
) -> (Vec<PerformanceRecord>, Vec<PerformanceRecord>) {
    let excluded: HashSet<&str> = disbursement.iter().map(String::as_str).collect();
    let excluding = records
        .iter()
        .filter(|record| !excluded.contains(record.category.as_str()))
        .cloned()
        .collect();
    (excluding, records.to_vec())
}

pub fn only_categories(records: &[PerformanceRecord], categories: &[String]) -> Vec<PerformanceRecord> {
    let wanted: HashSet<&str> = categories.iter().map(String::as_str).collect();
    records
        .iter()
        .filter(|record| wanted.contains(record.category.as_str()))
        .cloned()
        .collect()
}

fn category_rank(category: &str) -> u32 {
    category
        .split('.')
        .next()
        .and_then(|prefix| prefix.trim().parse().ok())
        .unwrap_or(999)
}

/// Distinct categories ordered by their leading number ("7. LOANS").
pub fn sorted_categories(records: &[PerformanceRecord]) -> Vec<String> {
    let unique: BTreeSet<&str> = records.iter().map(|record| record.category.as_str()).collect();
    let mut categories: Vec<String> = unique.into_iter().map(str::to_string).collect();
    categories.sort_by(|a, b| category_rank(a).cmp(&category_rank(b)).then_with(|| a.cmp(b)));
    categories
}

/// Category selection applied to both views.
#[derive(Clone, Debug, Default)]
pub struct CategoryFilter {
    pub selected: Vec<String>,
}

pub struct PerformanceViews {
    pub excluding: Vec<PerformanceRecord>,
    pub including: Vec<PerformanceRecord>,
}

impl CategoryFilter {
    /// An empty selection keeps everything. Otherwise the excluding view keeps
    /// the selection and the including view keeps the selection plus the
    /// disbursement categories.
    pub fn apply(&self, records: &[PerformanceRecord], disbursement: &[String]) -> PerformanceViews {
        let (excluding, including) = partition(records, disbursement);
        if self.selected.is_empty() {
            return PerformanceViews {
                excluding,
                including,
            };
        }
        let mut with_disbursement = self.selected.clone();
        with_disbursement.extend(disbursement.iter().cloned());
        PerformanceViews {
            excluding: only_categories(&excluding, &self.selected),
            including: only_categories(&including, &with_disbursement),
        }
    }
}

/// Always twelve entries, January first.
pub fn monthly_totals(records: &[PerformanceRecord]) -> Vec<MonthFigures> {
    let mut months: Vec<MonthFigures> = (1..=12)
        .map(|month| MonthFigures {
            month,
            ..Default::default()
        })
        .collect();
    for record in records {
        let slot = &mut months[(record.month - 1) as usize];
        slot.prior_year_revenue += record.prior_year_revenue;
        slot.current_year_revenue += record.current_year_revenue;
        slot.target += record.target;
    }
    months
}

/// Rows as CSV text, for prompts.
pub fn to_csv_text(records: &[PerformanceRecord]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::Io(err.into_error()))?;
    String::from_utf8(bytes).map_err(|err| AppError::InvalidInput(err.to_string()))
}

#[cfg(test)]
pub(crate) fn record(month: u32, category: &str, prior: f64, current: f64, target: f64) -> PerformanceRecord {
    PerformanceRecord {
        month,
        category: category.to_string(),
        prior_year_revenue: prior,
        current_year_revenue: current,
        target,
    }
}
