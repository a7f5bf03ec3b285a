use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::performance::PerformanceRecord;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub ytd_total: f64,
    pub ytd_target: f64,
    pub ytd_achievement: f64,
    pub mtd_total: f64,
    pub mtd_target: f64,
    pub mtd_achievement: f64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct MetricsReport {
    pub as_of: NaiveDate,
    pub excluding: Metrics,
    pub including: Metrics,
}

/// Percentage of target reached; 0 when there is no positive target.
pub fn achievement(total: f64, target: f64) -> f64 {
    if target > 0.0 {
        total / target * 100.0
    } else {
        0.0
    }
}

pub fn compute_metrics(records: &[PerformanceRecord], as_of: NaiveDate) -> Metrics {
    let month = as_of.month();
    let mut metrics = Metrics::default();
    for record in records {
        metrics.ytd_total += record.current_year_revenue;
        metrics.ytd_target += record.target;
        if record.month == month {
            metrics.mtd_total += record.current_year_revenue;
            metrics.mtd_target += record.target;
        }
    }
    metrics.ytd_achievement = achievement(metrics.ytd_total, metrics.ytd_target);
    metrics.mtd_achievement = achievement(metrics.mtd_total, metrics.mtd_target);
    metrics
}

pub fn metrics_report(
    excluding: &[PerformanceRecord],
    including: &[PerformanceRecord],
    as_of: NaiveDate,
) -> MetricsReport {
    MetricsReport {
        as_of,
        excluding: compute_metrics(excluding, as_of),
        including: compute_metrics(including, as_of),
    }
}

/// Days and working days left in the current month and year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days_to_end_of_month: i64,
    pub total_days_month: i64,
    pub workdays_to_end_of_month: i64,
    pub total_workdays_month: i64,
    pub days_to_end_of_year: i64,
    pub total_days_year: i64,
    pub workdays_to_end_of_year: i64,
    pub total_workdays_year: i64,
}

fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Monday to Friday dates in `from..=to`.
pub fn workdays_between(from: NaiveDate, to: NaiveDate) -> i64 {
    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as i64
}

impl Countdown {
    pub fn as_of(today: NaiveDate) -> Self {
        let month_start = today.with_day(1).unwrap_or(today);
        let month_end = end_of_month(today);
        let year_start = today.with_ordinal(1).unwrap_or(today);
        let year_end = NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today);

        Self {
            days_to_end_of_month: (month_end - today).num_days(),
            total_days_month: (month_end - month_start).num_days() + 1,
            workdays_to_end_of_month: workdays_between(today, month_end),
            total_workdays_month: workdays_between(month_start, month_end),
            days_to_end_of_year: (year_end - today).num_days(),
            total_days_year: (year_end - year_start).num_days() + 1,
            workdays_to_end_of_year: workdays_between(today, year_end),
            total_workdays_year: workdays_between(year_start, year_end),
        }
    }
}
