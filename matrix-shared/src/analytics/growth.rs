//! Reporting periods and growth rates

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Percentage change from `previous` to `current`
///
/// When `previous` is zero the change is 100 if anything was sold, else 0.
/// Otherwise the change is rounded to two decimals.
///
/// # Example
///
/// ```
/// use matrix_shared::analytics::growth::calculate_growth;
///
/// assert_eq!(calculate_growth(150.0, 100.0), 50.0);
/// assert_eq!(calculate_growth(10.0, 0.0), 100.0);
/// assert_eq!(calculate_growth(0.0, 0.0), 0.0);
/// ```
pub fn calculate_growth(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    round2((current - previous) / previous * 100.0)
}

/// Rounds to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Shifts a month start by `months` (negative goes back)
pub fn add_months(month: NaiveDate, months: i32) -> NaiveDate {
    let index = month.year() * 12 + month.month0() as i32 + months;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or(month)
}

/// Period accepted by `GET /api/statistics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
    Year,
    /// Anything unrecognized: the trailing 30 days
    Trailing30,
}

impl StatsPeriod {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "day" => StatsPeriod::Day,
            "week" => StatsPeriod::Week,
            "month" => StatsPeriod::Month,
            "year" => StatsPeriod::Year,
            _ => StatsPeriod::Trailing30,
        }
    }

    /// Start of the period containing `now`
    ///
    /// Weeks start on Monday. All boundaries are UTC midnights except the
    /// trailing window, which is exactly 30 days before `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        match self {
            StatsPeriod::Day => midnight(today),
            StatsPeriod::Week => {
                midnight(today - Duration::days(today.weekday().num_days_from_monday() as i64))
            }
            StatsPeriod::Month => midnight(month_start(today)),
            StatsPeriod::Year => midnight(today.with_ordinal(1).unwrap_or(today)),
            StatsPeriod::Trailing30 => now - Duration::days(30),
        }
    }
}

/// Period accepted by the seller overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewPeriod {
    Today,
    Week,
    Month,
    Quarter,
    Year,
    All,
}

impl std::str::FromStr for OverviewPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "today" => Ok(OverviewPeriod::Today),
            "week" => Ok(OverviewPeriod::Week),
            "month" => Ok(OverviewPeriod::Month),
            "quarter" => Ok(OverviewPeriod::Quarter),
            "year" => Ok(OverviewPeriod::Year),
            "all" => Ok(OverviewPeriod::All),
            other => Err(format!("Invalid period: {}", other)),
        }
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Window of the same length immediately before this one
    pub fn previous(&self) -> Window {
        let length = self.end - self.start;
        Window {
            start: self.start - length,
            end: self.start,
        }
    }
}

impl OverviewPeriod {
    /// Window from the start of the period to the end of today
    pub fn window(&self, now: DateTime<Utc>) -> Window {
        let today = now.date_naive();
        let start_day = match self {
            OverviewPeriod::Today => today,
            OverviewPeriod::Week => {
                today - Duration::days(today.weekday().num_days_from_monday() as i64)
            }
            OverviewPeriod::Month => month_start(today),
            OverviewPeriod::Quarter => {
                let first_month = (today.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(today.year(), first_month, 1).unwrap_or(today)
            }
            OverviewPeriod::Year => today.with_ordinal(1).unwrap_or(today),
            OverviewPeriod::All => NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(today),
        };

        Window {
            start: midnight(start_day),
            end: midnight(today + Duration::days(1)),
        }
    }
}

/// Compounding growth applied to each projected month of the outlook
pub const OUTLOOK_GROWTH: [f64; 3] = [0.05, 0.08, 0.12];

/// Projection base when the last actual month had no revenue
pub const OUTLOOK_FALLBACK_BASE: f64 = 1000.0;

/// One month of the statistics revenue outlook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlookMonth {
    /// e.g. "Mar 2025"
    pub period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_revenue: Option<f64>,
    pub predicted_revenue: f64,
    pub growth_rate: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
}

/// Actual months followed by three projected ones
///
/// `actuals` are `(month, revenue)` pairs, oldest first. Actual rows carry a
/// ±10% band. Projections start the month after `current_month` and
/// compound [`OUTLOOK_GROWTH`] on the last actual revenue with a ±20% band.
pub fn revenue_outlook(actuals: &[(NaiveDate, f64)], current_month: NaiveDate) -> Vec<OutlookMonth> {
    let label = |month: NaiveDate| month.format("%b %Y").to_string();

    let mut outlook: Vec<OutlookMonth> = actuals
        .iter()
        .map(|(month, revenue)| OutlookMonth {
            period: label(*month),
            actual_revenue: Some(round2(*revenue)),
            predicted_revenue: round2(*revenue),
            growth_rate: 0.0,
            confidence_low: round2(revenue * 0.9),
            confidence_high: round2(revenue * 1.1),
        })
        .collect();

    let mut base = match actuals.last() {
        Some((_, revenue)) if *revenue > 0.0 => *revenue,
        _ => OUTLOOK_FALLBACK_BASE,
    };

    for (i, growth) in OUTLOOK_GROWTH.iter().enumerate() {
        base *= 1.0 + growth;
        outlook.push(OutlookMonth {
            period: label(add_months(current_month, i as i32 + 1)),
            actual_revenue: None,
            predicted_revenue: round2(base),
            growth_rate: *growth,
            confidence_low: round2(base * 0.8),
            confidence_high: round2(base * 1.2),
        });
    }

    outlook
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_calculate_growth() {
        assert_eq!(calculate_growth(0.0, 0.0), 0.0);
        assert_eq!(calculate_growth(5.0, 0.0), 100.0);
        assert_eq!(calculate_growth(50.0, 100.0), -50.0);
        assert_eq!(calculate_growth(1.0, 3.0), -66.67);
    }

    #[test]
    fn test_stats_period_parse() {
        assert_eq!(StatsPeriod::parse("WEEK"), StatsPeriod::Week);
        assert_eq!(StatsPeriod::parse("decade"), StatsPeriod::Trailing30);
    }

    #[test]
    fn test_stats_period_start() {
        // Thursday
        let now = at(2025, 5, 15, 13);

        assert_eq!(StatsPeriod::Day.start(now), at(2025, 5, 15, 0));
        assert_eq!(StatsPeriod::Week.start(now), at(2025, 5, 12, 0));
        assert_eq!(StatsPeriod::Month.start(now), at(2025, 5, 1, 0));
        assert_eq!(StatsPeriod::Year.start(now), at(2025, 1, 1, 0));
        assert_eq!(StatsPeriod::Trailing30.start(now), at(2025, 4, 15, 13));
    }

    #[test]
    fn test_overview_window_and_previous() {
        let now = at(2025, 8, 20, 9);
        let window = OverviewPeriod::Quarter.window(now);

        assert_eq!(window.start, at(2025, 7, 1, 0));
        assert_eq!(window.end, at(2025, 8, 21, 0));

        let previous = window.previous();
        assert_eq!(previous.end, window.start);
        assert_eq!(previous.end - previous.start, window.end - window.start);
    }

    #[test]
    fn test_overview_period_from_str() {
        assert_eq!("all".parse::<OverviewPeriod>().unwrap(), OverviewPeriod::All);
        assert!("fortnight".parse::<OverviewPeriod>().is_err());
    }

    #[test]
    fn test_add_months() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(add_months(jan, -1), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(add_months(jan, 14), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(
            month_start(NaiveDate::from_ymd_opt(2025, 2, 17).unwrap()),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_revenue_outlook_compounds_from_last_actual() {
        let march = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let actuals = vec![
            (NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 500.0),
            (NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(), 1000.0),
        ];

        let outlook = revenue_outlook(&actuals, march);
        assert_eq!(outlook.len(), 5);

        assert_eq!(outlook[0].period, "Jan 2025");
        assert_eq!(outlook[0].actual_revenue, Some(500.0));
        assert_eq!(outlook[0].confidence_low, 450.0);
        assert_eq!(outlook[0].confidence_high, 550.0);

        assert_eq!(outlook[2].period, "Apr 2025");
        assert_eq!(outlook[2].actual_revenue, None);
        assert_eq!(outlook[2].predicted_revenue, 1050.0);
        assert_eq!(outlook[2].growth_rate, 0.05);
        assert_eq!(outlook[0].growth_rate, 0.0);
        assert_eq!(outlook[3].predicted_revenue, 1134.0);
        assert_eq!(outlook[4].period, "Jun 2025");
        assert_eq!(outlook[4].confidence_low, round2(1134.0 * 1.12 * 0.8));
    }

    #[test]
    fn test_revenue_outlook_falls_back_without_sales() {
        let march = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let actuals = vec![(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(), 0.0)];

        let outlook = revenue_outlook(&actuals, march);
        assert_eq!(outlook[1].predicted_revenue, 1050.0);

        assert_eq!(revenue_outlook(&[], march)[0].predicted_revenue, 1050.0);
    }
}
