//! Year-end revenue forecast and target redistribution.
//!
//! The forecast fits ordinary least squares of monthly revenue against a
//! linear time index plus calendar-month indicators (January is the reference
//! level) over the prior year and the reported part of the current year, then
//! predicts the months that have not been reported yet.
//!
//! Redistribution spreads the gap between year-to-date target and actual over
//! the open months, weighted by each month's share of the open target.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::metrics::achievement;
use crate::performance::MonthFigures;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?")
}

/// Solves min ||Xb - y|| through the normal equations.
///
/// Gauss-Jordan elimination with partial pivoting; a column that turns out to
/// be linearly dependent on earlier ones gets coefficient 0, which still
/// yields a least-squares solution.
pub fn least_squares(design: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>, AppError> {
    if design.len() != y.len() {
        return Err(AppError::InvalidInput(format!(
            "design has {} rows but response has {}",
            design.len(),
            y.len()
        )));
    }
    let Some(width) = design.first().map(Vec::len) else {
        return Err(AppError::InsufficientData(
            "no observations to fit".to_string(),
        ));
    };
    if design.iter().any(|row| row.len() != width) {
        return Err(AppError::InvalidInput("ragged design matrix".to_string()));
    }

    // Augmented [X'X | X'y].
    let mut a = vec![vec![0.0; width + 1]; width];
    for (row, target) in design.iter().zip(y) {
        for i in 0..width {
            for j in 0..width {
                a[i][j] += row[i] * row[j];
            }
            a[i][width] += row[i] * target;
        }
    }

    let scale = (0..width).map(|i| a[i][i].abs()).fold(1.0_f64, f64::max);
    let tolerance = scale * 1e-10;
    let mut pivot_of = vec![None; width];
    let mut next_row = 0;

    for col in 0..width {
        if next_row == width {
            break;
        }
        let (best, magnitude) = (next_row..width)
            .map(|r| (r, a[r][col].abs()))
            .fold((next_row, -1.0), |acc, item| if item.1 > acc.1 { item } else { acc });
        if magnitude < tolerance {
            continue;
        }
        a.swap(next_row, best);

        let pivot = a[next_row][col];
        for value in a[next_row].iter_mut() {
            *value /= pivot;
        }
        for r in 0..width {
            if r == next_row {
                continue;
            }
            let factor = a[r][col];
            if factor == 0.0 {
                continue;
            }
            for c in 0..=width {
                let delta = factor * a[next_row][c];
                a[r][c] -= delta;
            }
        }
        pivot_of[col] = Some(next_row);
        next_row += 1;
    }

    Ok(pivot_of
        .iter()
        .map(|pivot| pivot.map_or(0.0, |row| a[row][width]))
        .collect())
}

/// Revenue = intercept + slope * t + offset[month].
#[derive(Clone, Debug, Serialize)]
pub struct TrendSeasonalModel {
    pub intercept: f64,
    pub slope: f64,
    /// Offsets for February..December relative to January.
    pub seasonal: [f64; 11],
}

fn regressors(t: u32, month: u32, with_trend: bool) -> Vec<f64> {
    let mut row = Vec::with_capacity(13);
    row.push(1.0);
    if with_trend {
        row.push(f64::from(t));
    }
    row.extend((2..=12).map(|m| if m == month { 1.0 } else { 0.0 }));
    row
}

impl TrendSeasonalModel {
    /// Fits `(t, month, revenue)` observations.
    pub fn fit(observations: &[(u32, u32, f64)]) -> Result<Self, AppError> {
        Self::fit_with(observations, true)
    }

    /// Month offsets only, slope fixed at 0. A single year has one
    /// observation per month, so the trend cannot be told apart from them.
    pub fn fit_seasonal(observations: &[(u32, u32, f64)]) -> Result<Self, AppError> {
        Self::fit_with(observations, false)
    }

    fn fit_with(observations: &[(u32, u32, f64)], with_trend: bool) -> Result<Self, AppError> {
        let design: Vec<Vec<f64>> = observations
            .iter()
            .map(|(t, month, _)| regressors(*t, *month, with_trend))
            .collect();
        let y: Vec<f64> = observations.iter().map(|(_, _, revenue)| *revenue).collect();
        let coefficients = least_squares(&design, &y)?;

        let (slope, first_offset) = if with_trend {
            (coefficients[1], 2)
        } else {
            (0.0, 1)
        };
        let mut seasonal = [0.0; 11];
        seasonal.copy_from_slice(&coefficients[first_offset..first_offset + 11]);
        Ok(Self {
            intercept: coefficients[0],
            slope,
            seasonal,
        })
    }

    pub fn predict(&self, t: u32, month: u32) -> f64 {
        let offset = if (2..=12).contains(&month) {
            self.seasonal[(month - 2) as usize]
        } else {
            0.0
        };
        self.intercept + self.slope * f64::from(t) + offset
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TimelinePoint {
    pub year: i32,
    pub month: u32,
    pub label: String,
    /// 1..=12 for the prior year, 13..=24 for the current year.
    pub t: u32,
    pub actual: f64,
    pub target: Option<f64>,
    pub fitted: Option<f64>,
    pub forecast: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ForecastReport {
    pub year: i32,
    pub through_month: u32,
    pub model: TrendSeasonalModel,
    pub timeline: Vec<TimelinePoint>,
    pub actual_to_date: f64,
    pub forecast_remaining: f64,
    pub projected_total: f64,
    pub target_total: f64,
    pub projected_achievement: f64,
}

fn ensure_twelve(monthly: &[MonthFigures]) -> Result<(), AppError> {
    let ordered = monthly
        .iter()
        .enumerate()
        .all(|(idx, figures)| figures.month == idx as u32 + 1);
    if monthly.len() != 12 || !ordered {
        return Err(AppError::InvalidInput(
            "expected twelve monthly figures starting in January".to_string(),
        ));
    }
    Ok(())
}

fn ensure_month(label: &str, month: u32) -> Result<(), AppError> {
    if month > 12 {
        return Err(AppError::InvalidInput(format!(
            "{label} must be between 0 and 12, got {month}"
        )));
    }
    Ok(())
}

/// Forecasts the months after `through_month` of `year`.
///
/// `monthly` holds the twelve aggregated months; prior-year revenue, current
/// revenue and current target come from the same entry.
pub fn forecast(
    monthly: &[MonthFigures],
    year: i32,
    through_month: u32,
) -> Result<ForecastReport, AppError> {
    ensure_twelve(monthly)?;
    ensure_month("through month", through_month)?;

    let mut observations: Vec<(u32, u32, f64)> = monthly
        .iter()
        .map(|figures| (figures.month, figures.month, figures.prior_year_revenue))
        .collect();
    observations.extend(
        monthly
            .iter()
            .filter(|figures| figures.month <= through_month)
            .map(|figures| (12 + figures.month, figures.month, figures.current_year_revenue)),
    );
    let model = if through_month == 0 {
        TrendSeasonalModel::fit_seasonal(&observations)?
    } else {
        TrendSeasonalModel::fit(&observations)?
    };
    debug!(
        observations = observations.len(),
        intercept = model.intercept,
        slope = model.slope,
        "fitted trend and seasonality"
    );

    let mut timeline = Vec::with_capacity(24);
    for figures in monthly {
        let t = figures.month;
        timeline.push(TimelinePoint {
            year: year - 1,
            month: figures.month,
            label: format!("{} {}", month_name(figures.month), year - 1),
            t,
            actual: figures.prior_year_revenue,
            target: None,
            fitted: Some(model.predict(t, figures.month)),
            forecast: None,
        });
    }
    for figures in monthly {
        let t = 12 + figures.month;
        let reported = figures.month <= through_month;
        let prediction = model.predict(t, figures.month);
        timeline.push(TimelinePoint {
            year,
            month: figures.month,
            label: format!("{} {}", month_name(figures.month), year),
            t,
            actual: figures.current_year_revenue,
            target: Some(figures.target),
            fitted: reported.then_some(prediction),
            forecast: (!reported).then_some(prediction),
        });
    }

    let actual_to_date: f64 = monthly
        .iter()
        .filter(|figures| figures.month <= through_month)
        .map(|figures| figures.current_year_revenue)
        .sum();
    let forecast_remaining: f64 = timeline.iter().filter_map(|point| point.forecast).sum();
    let projected_total = actual_to_date + forecast_remaining;
    let target_total: f64 = monthly.iter().map(|figures| figures.target).sum();

    Ok(ForecastReport {
        year,
        through_month,
        model,
        timeline,
        actual_to_date,
        forecast_remaining,
        projected_total,
        target_total,
        projected_achievement: achievement(projected_total, target_total),
    })
}

/// Projection once the disbursement categories are added back.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct InclusiveProjection {
    pub disbursement_actual: f64,
    pub disbursement_forecast: f64,
    pub projected_total: f64,
    pub target_total: f64,
    pub projected_achievement: f64,
}

/// Disbursement revenue is not modelled; its open months use a manual figure.
pub fn project_including(
    report: &ForecastReport,
    disbursement: &[MonthFigures],
    manual_forecast: f64,
) -> InclusiveProjection {
    let disbursement_actual: f64 = disbursement
        .iter()
        .filter(|figures| figures.month <= report.through_month)
        .map(|figures| figures.current_year_revenue)
        .sum();
    let disbursement_target: f64 = disbursement.iter().map(|figures| figures.target).sum();
    let projected_total = report.projected_total + disbursement_actual + manual_forecast;
    let target_total = report.target_total + disbursement_target;
    InclusiveProjection {
        disbursement_actual,
        disbursement_forecast: manual_forecast,
        projected_total,
        target_total,
        projected_achievement: achievement(projected_total, target_total),
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct OpenMonth {
    pub month: u32,
    pub original_target: f64,
    pub weight: f64,
    pub share: f64,
    pub adjusted_target: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Redistribution {
    pub cutoff_month: u32,
    pub ytd_target: f64,
    pub ytd_actual: f64,
    /// Positive when behind target; negative when ahead.
    pub shortfall: f64,
    pub open_target_total: f64,
    pub months: Vec<OpenMonth>,
    /// Remaining targets were lowered because the year is ahead of target.
    pub over_achieved: bool,
}

/// Spreads the year-to-date gap through `cutoff_month` over the later months.
pub fn redistribute(monthly: &[MonthFigures], cutoff_month: u32) -> Result<Redistribution, AppError> {
    ensure_twelve(monthly)?;
    ensure_month("cutoff month", cutoff_month)?;

    let (closed, open): (Vec<&MonthFigures>, Vec<&MonthFigures>) = monthly
        .iter()
        .partition(|figures| figures.month <= cutoff_month);
    let ytd_target: f64 = closed.iter().map(|figures| figures.target).sum();
    let ytd_actual: f64 = closed.iter().map(|figures| figures.current_year_revenue).sum();
    let shortfall = ytd_target - ytd_actual;
    let open_target_total: f64 = open.iter().map(|figures| figures.target).sum();

    // Weights are undefined without open target; nothing moves.
    let months = open
        .iter()
        .map(|figures| {
            let weight = if open_target_total > 0.0 {
                figures.target / open_target_total
            } else {
                0.0
            };
            let share = weight * shortfall;
            OpenMonth {
                month: figures.month,
                original_target: figures.target,
                weight,
                share,
                adjusted_target: figures.target + share,
            }
        })
        .collect();

    let over_achieved = shortfall < 0.0 && open_target_total > 0.0;
    if over_achieved {
        warn!(
            cutoff_month,
            shortfall, "year-to-date actual exceeds target; remaining targets are lowered"
        );
    }

    Ok(Redistribution {
        cutoff_month,
        ytd_target,
        ytd_actual,
        shortfall,
        open_target_total,
        months,
        over_achieved,
    })
}
