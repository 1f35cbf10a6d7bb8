//! Sales forecasting
//!
//! Three families of models, all small enough to fit in-process:
//!
//! - [`LinearFit`]: ordinary least squares, used for daily product and seller
//!   predictions and for the long five-year trend.
//! - [`holt`]: Holt's linear exponential smoothing for six months ahead.
//! - [`damped_trend`]: exponential smoothing with a damped trend for one year
//!   ahead.
//!
//! Smoothing parameters are picked by grid search on one-step-ahead squared
//! error. Intervals are 90% bands from the residual standard deviation.
//!
//! # Example
//!
//! ```
//! use matrix_shared::analytics::forecast::{forecast_daily, DailyPoint};
//! use chrono::NaiveDate;
//!
//! let day = |d| NaiveDate::from_ymd_opt(2025, 6, d).unwrap();
//! let history = vec![
//!     DailyPoint { date: day(1), quantity: 1.0, revenue: 10.0 },
//!     DailyPoint { date: day(2), quantity: 2.0, revenue: 20.0 },
//!     DailyPoint { date: day(3), quantity: 3.0, revenue: 30.0 },
//! ];
//!
//! let forecast = forecast_daily(&history, 2, day(3));
//! assert_eq!(forecast.predictions[0].quantity, 4.0);
//! assert_eq!(forecast.predictions[1].revenue, 50.0);
//! assert_eq!(forecast.confidence, 1.0);
//! ```

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::growth::{add_months, round2};

/// z-score for a two-sided 90% interval
const Z_90: f64 = 1.645;

/// Damping factor for the one-year model
pub const DAMPING: f64 = 0.98;

/// Forecasting error
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ForecastError {
    #[error("No historical data available for forecasting")]
    NoHistory,

    #[error("Invalid horizon: {0}")]
    InvalidHorizon(String),
}

/// Least-squares line `y = intercept + slope × x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination on the training data
    pub r_squared: f64,
}

impl LinearFit {
    /// Fits a line through the points
    ///
    /// Returns `None` for empty input. A single point, or points sharing one
    /// x value, produce a flat line through the mean.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len().min(ys.len());
        if n == 0 {
            return None;
        }

        let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
        let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

        let (mut sxx, mut sxy) = (0.0, 0.0);
        for (x, y) in xs[..n].iter().zip(&ys[..n]) {
            sxx += (x - mean_x).powi(2);
            sxy += (x - mean_x) * (y - mean_y);
        }

        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        let intercept = mean_y - slope * mean_x;

        let mut fit = LinearFit {
            slope,
            intercept,
            r_squared: 0.0,
        };
        fit.r_squared = if n < 2 { 0.0 } else { fit.score(&xs[..n], &ys[..n]) };

        Some(fit)
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// R² of the line on the given points
    ///
    /// Constant targets score 1 when predicted exactly and 0 otherwise.
    pub fn score(&self, xs: &[f64], ys: &[f64]) -> f64 {
        let mean_y = ys.iter().sum::<f64>() / ys.len() as f64;
        let ss_tot: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
        let ss_res: f64 = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (y - self.predict(*x)).powi(2))
            .sum();

        if ss_tot == 0.0 {
            return if ss_res < 1e-12 { 1.0 } else { 0.0 };
        }
        1.0 - ss_res / ss_tot
    }

    /// Standard deviation of the residuals
    fn residual_std(&self, xs: &[f64], ys: &[f64]) -> f64 {
        let residuals: Vec<f64> = xs.iter().zip(ys).map(|(x, y)| y - self.predict(*x)).collect();
        std_dev(&residuals)
    }
}

/// Daily observation of units and revenue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub quantity: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrediction {
    #[serde(with = "day_format")]
    pub date: NaiveDate,
    pub quantity: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub predictions: Vec<DailyPrediction>,
    pub total_predicted_sales: f64,
    pub total_predicted_revenue: f64,
    /// Mean R² of the quantity and revenue fits
    pub confidence: f64,
}

mod day_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(serde::de::Error::custom)
    }
}

/// Projects daily quantity and revenue `days` days past the last observation
///
/// The x axis is days since the first observation. Predictions are clipped
/// at zero and rounded to two decimals. Without history every prediction is
/// zero, dates start the day after `today`, and confidence is 0.
pub fn forecast_daily(history: &[DailyPoint], days: u32, today: NaiveDate) -> DailyForecast {
    let (Some(first), Some(last)) = (history.first(), history.last()) else {
        let predictions = (1..=days)
            .map(|i| DailyPrediction {
                date: today + Duration::days(i as i64),
                quantity: 0.0,
                revenue: 0.0,
            })
            .collect();
        return DailyForecast {
            predictions,
            total_predicted_sales: 0.0,
            total_predicted_revenue: 0.0,
            confidence: 0.0,
        };
    };

    let xs: Vec<f64> = history
        .iter()
        .map(|p| (p.date - first.date).num_days() as f64)
        .collect();
    let quantities: Vec<f64> = history.iter().map(|p| p.quantity).collect();
    let revenues: Vec<f64> = history.iter().map(|p| p.revenue).collect();

    // Both fits exist: history is non-empty
    let quantity_fit = LinearFit::fit(&xs, &quantities).unwrap_or(LinearFit {
        slope: 0.0,
        intercept: 0.0,
        r_squared: 0.0,
    });
    let revenue_fit = LinearFit::fit(&xs, &revenues).unwrap_or(quantity_fit);

    let last_x = (last.date - first.date).num_days();
    let predictions: Vec<DailyPrediction> = (1..=days as i64)
        .map(|offset| {
            let x = (last_x + offset) as f64;
            DailyPrediction {
                date: last.date + Duration::days(offset),
                quantity: round2(quantity_fit.predict(x).max(0.0)),
                revenue: round2(revenue_fit.predict(x).max(0.0)),
            }
        })
        .collect();

    DailyForecast {
        total_predicted_sales: round2(predictions.iter().map(|p| p.quantity).sum()),
        total_predicted_revenue: round2(predictions.iter().map(|p| p.revenue).sum()),
        confidence: round2((quantity_fit.r_squared + revenue_fit.r_squared) / 2.0),
        predictions,
    }
}

/// Monthly revenue, keyed by the first day of the month
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthPoint {
    pub month: NaiveDate,
    pub revenue: f64,
}

/// Builds a dense `months`-long series ending at `last_month`
///
/// Months missing from `points` are zero; points outside the range are
/// ignored.
pub fn zero_fill_months(points: &[MonthPoint], last_month: NaiveDate, months: u32) -> Vec<MonthPoint> {
    let first_month = add_months(last_month, 1 - months as i32);
    (0..months as i32)
        .map(|i| {
            let month = add_months(first_month, i);
            let revenue = points
                .iter()
                .filter(|p| p.month == month)
                .map(|p| p.revenue)
                .sum();
            MonthPoint { month, revenue }
        })
        .collect()
}

/// "Low Confidence" when more than half the months had no revenue
pub fn confidence_label(history: &[MonthPoint]) -> &'static str {
    if zero_month_share(history) > 50.0 {
        "Low Confidence"
    } else {
        "Normal Confidence"
    }
}

/// Percentage of months with zero revenue
pub fn zero_month_share(history: &[MonthPoint]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let zeros = history.iter().filter(|p| p.revenue == 0.0).count();
    zeros as f64 / history.len() as f64 * 100.0
}

/// One forecast month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub month: NaiveDate,
    pub revenue: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Forecast horizon offered to sellers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "6-month")]
    SixMonths,
    #[serde(rename = "1-year")]
    OneYear,
    #[serde(rename = "5-year")]
    FiveYears,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::SixMonths, Horizon::OneYear, Horizon::FiveYears];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::SixMonths => "6-month",
            Horizon::OneYear => "1-year",
            Horizon::FiveYears => "5-year",
        }
    }

    /// Number of monthly steps
    pub fn months(&self) -> usize {
        match self {
            Horizon::SixMonths => 6,
            Horizon::OneYear => 12,
            Horizon::FiveYears => 60,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Horizon::SixMonths => "Holt Linear Smoothing",
            Horizon::OneYear => "Damped Trend Smoothing",
            Horizon::FiveYears => "Linear Trend Projection",
        }
    }

    /// Multiplier applied to a product's history for top-product projections
    fn projection_multiplier(&self) -> Option<f64> {
        match self {
            Horizon::SixMonths => None,
            Horizon::OneYear => Some(1.2),
            Horizon::FiveYears => Some(2.0),
        }
    }
}

impl std::str::FromStr for Horizon {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6-month" => Ok(Horizon::SixMonths),
            "1-year" => Ok(Horizon::OneYear),
            "5-year" => Ok(Horizon::FiveYears),
            other => Err(ForecastError::InvalidHorizon(other.to_string())),
        }
    }
}

/// Forecast for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon: Horizon,
    pub method: String,
    pub points: Vec<ForecastPoint>,
    pub total_revenue: f64,
    pub confidence_level: u8,
    pub confidence_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Fitted smoothing state
#[derive(Debug, Clone, Copy, PartialEq)]
struct Smoothed {
    level: f64,
    trend: f64,
    sse: f64,
    residual_std: f64,
}

/// Runs trend smoothing with fixed parameters
///
/// `phi = 1` is Holt's method; `phi < 1` damps the trend.
fn smooth(series: &[f64], alpha: f64, beta: f64, phi: f64) -> Smoothed {
    let mut level = series[0];
    let mut trend = if series.len() > 1 { series[1] - series[0] } else { 0.0 };
    let mut residuals = Vec::with_capacity(series.len().saturating_sub(1));

    for &y in &series[1..] {
        let forecast = level + phi * trend;
        residuals.push(y - forecast);

        let previous_level = level;
        level = alpha * y + (1.0 - alpha) * (previous_level + phi * trend);
        trend = beta * (level - previous_level) + (1.0 - beta) * phi * trend;
    }

    Smoothed {
        level,
        trend,
        sse: residuals.iter().map(|r| r * r).sum(),
        residual_std: std_dev(&residuals),
    }
}

/// Grid search over (alpha, beta) in steps of 0.1
fn fit_smoothing(series: &[f64], phi: f64) -> Smoothed {
    let grid: Vec<f64> = (1..=9).map(|i| i as f64 / 10.0).collect();
    let mut best = smooth(series, 0.5, 0.1, phi);

    for &alpha in &grid {
        for &beta in &grid {
            let candidate = smooth(series, alpha, beta, phi);
            if candidate.sse < best.sse {
                best = candidate;
            }
        }
    }

    best
}

/// Holt's linear trend smoothing
pub fn holt(series: &[f64], steps: usize) -> Result<Vec<(f64, f64, f64)>, ForecastError> {
    smoothing_forecast(series, steps, 1.0)
}

/// Exponential smoothing with a damped trend
pub fn damped_trend(series: &[f64], steps: usize) -> Result<Vec<(f64, f64, f64)>, ForecastError> {
    smoothing_forecast(series, steps, DAMPING)
}

fn smoothing_forecast(
    series: &[f64],
    steps: usize,
    phi: f64,
) -> Result<Vec<(f64, f64, f64)>, ForecastError> {
    if series.is_empty() {
        return Err(ForecastError::NoHistory);
    }

    let state = fit_smoothing(series, phi);
    let mut damp_sum = 0.0;

    Ok((1..=steps)
        .map(|h| {
            damp_sum += phi.powi(h as i32);
            let mean = state.level + damp_sum * state.trend;
            let spread = Z_90 * state.residual_std * (h as f64).sqrt();
            (mean, mean - spread, mean + spread)
        })
        .collect())
}

/// OLS trend on the month index
pub fn linear_trend(series: &[f64], steps: usize) -> Result<Vec<(f64, f64, f64)>, ForecastError> {
    let xs: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let fit = LinearFit::fit(&xs, series).ok_or(ForecastError::NoHistory)?;
    let spread = Z_90 * fit.residual_std(&xs, series);

    Ok((0..steps)
        .map(|h| {
            let mean = fit.predict((series.len() + h) as f64);
            (mean, mean - spread, mean + spread)
        })
        .collect())
}

/// Forecasts monthly revenue for a horizon from a zero-filled history
///
/// # Errors
///
/// `ForecastError::NoHistory` when the history is empty or has no revenue
/// in any month.
pub fn forecast_months(history: &[MonthPoint], horizon: Horizon) -> Result<Forecast, ForecastError> {
    let last = history.last().ok_or(ForecastError::NoHistory)?;
    if history.iter().all(|p| p.revenue == 0.0) {
        return Err(ForecastError::NoHistory);
    }

    let series: Vec<f64> = history.iter().map(|p| p.revenue).collect();
    let steps = horizon.months();

    let raw = match horizon {
        Horizon::SixMonths => holt(&series, steps)?,
        Horizon::OneYear => damped_trend(&series, steps)?,
        Horizon::FiveYears => linear_trend(&series, steps)?,
    };

    let points: Vec<ForecastPoint> = raw
        .into_iter()
        .enumerate()
        .map(|(i, (mean, lower, upper))| ForecastPoint {
            month: add_months(last.month, i as i32 + 1),
            revenue: round2(mean.max(0.0)),
            lower_bound: round2(lower.max(0.0)),
            upper_bound: round2(upper.max(0.0)),
        })
        .collect();

    let warning = (horizon == Horizon::FiveYears).then(|| {
        format!(
            "Highly speculative – based on {} months of history.",
            history.len()
        )
    });

    Ok(Forecast {
        horizon,
        method: horizon.method().to_string(),
        total_revenue: round2(points.iter().map(|p| p.revenue).sum()),
        points,
        confidence_level: 90,
        confidence_label: confidence_label(history).to_string(),
        warning,
    })
}

/// One product's monthly history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductHistory {
    pub product_id: uuid::Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    pub product_price: f64,
    pub product_category: String,
    /// `(revenue, units)` per month with sales, oldest first
    pub months: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProjection {
    pub product_id: uuid::Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    pub product_price: f64,
    pub product_category: String,
    pub total_revenue: f64,
    pub total_units: f64,
    pub avg_monthly_revenue: f64,
    pub avg_monthly_units: f64,
    pub growth_rate: f64,
}

/// Growth from the first to the last month with sales, in percent
///
/// Zero with fewer than two months or no first-month revenue.
pub fn first_to_last_growth(months: &[(f64, f64)]) -> f64 {
    match (months.first(), months.last()) {
        (Some(first), Some(last)) if months.len() >= 2 && first.0 > 0.0 => {
            (last.0 / first.0 - 1.0) * 100.0
        }
        _ => 0.0,
    }
}

/// Ranks products by projected revenue for a horizon
///
/// The six-month view reports history as is. Longer horizons scale it by
/// the product's growth factor (clamped to 0.5..=2.0) and a horizon
/// multiplier.
pub fn project_products(
    products: &[ProductHistory],
    horizon: Horizon,
    limit: usize,
) -> Vec<ProductProjection> {
    let mut projections: Vec<ProductProjection> = products
        .iter()
        .filter(|p| !p.months.is_empty())
        .map(|p| {
            let total_revenue: f64 = p.months.iter().map(|m| m.0).sum();
            let total_units: f64 = p.months.iter().map(|m| m.1).sum();
            let count = p.months.len() as f64;
            let growth_rate = first_to_last_growth(&p.months);

            let scale = horizon
                .projection_multiplier()
                .map(|multiplier| (1.0 + growth_rate / 100.0).clamp(0.5, 2.0) * multiplier)
                .unwrap_or(1.0);

            ProductProjection {
                product_id: p.product_id,
                product_name: p.product_name.clone(),
                product_image: p.product_image.clone(),
                product_price: p.product_price,
                product_category: p.product_category.clone(),
                total_revenue: round2(total_revenue * scale),
                total_units: round2(total_units * scale),
                avg_monthly_revenue: round2(total_revenue / count * scale),
                avg_monthly_units: round2(total_units / count * scale),
                growth_rate: round2(growth_rate),
            }
        })
        .collect();

    projections.sort_by(|a, b| b.total_revenue.total_cmp(&a.total_revenue));
    projections.truncate(limit);
    projections
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
