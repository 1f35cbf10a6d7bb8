//! Seller dashboard reshaping
//!
//! Turns daily revenue predictions and catalog data into the buckets and
//! scores the seller dashboard charts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Dashboard timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "6months")]
    SixMonths,
    #[serde(rename = "1year")]
    OneYear,
    #[serde(rename = "5years")]
    FiveYears,
}

impl Timeframe {
    /// Days of daily predictions requested for the timeframe
    pub fn days(&self) -> u32 {
        match self {
            Timeframe::SixMonths => 180,
            Timeframe::OneYear => 365,
            Timeframe::FiveYears => 1825,
        }
    }

    /// Bucket count, bucket length in days, and label prefix
    fn buckets(&self) -> (usize, usize, &'static str) {
        match self {
            Timeframe::FiveYears => (5, 365, "Year "),
            Timeframe::OneYear => (4, 90, "Q"),
            Timeframe::SixMonths => (6, 30, "Month "),
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::OneYear
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6months" => Ok(Timeframe::SixMonths),
            "1year" => Ok(Timeframe::OneYear),
            "5years" => Ok(Timeframe::FiveYears),
            other => Err(format!("Invalid timeframe: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAmount {
    pub period: String,
    pub amount: f64,
}

impl PeriodAmount {
    fn no_data() -> Self {
        Self {
            period: "No Data".to_string(),
            amount: 0.0,
        }
    }
}

/// Sums daily values into timeframe buckets
///
/// Stops at the first bucket starting past the data; the last bucket may be
/// partial. Empty input yields a single "No Data" bucket.
///
/// # Example
///
/// ```
/// use matrix_shared::analytics::dashboard::{group_predictions, Timeframe};
///
/// let daily = vec![1.0; 100];
/// let quarters = group_predictions(&daily, Timeframe::OneYear);
///
/// assert_eq!(quarters.len(), 2);
/// assert_eq!(quarters[0].period, "Q1");
/// assert_eq!(quarters[0].amount, 90.0);
/// assert_eq!(quarters[1].amount, 10.0);
/// ```
pub fn group_predictions(values: &[f64], timeframe: Timeframe) -> Vec<PeriodAmount> {
    let (count, length, prefix) = timeframe.buckets();

    let result: Vec<PeriodAmount> = (0..count)
        .map(|i| i * length)
        .take_while(|start| *start < values.len())
        .enumerate()
        .map(|(i, start)| {
            let end = (start + length).min(values.len());
            PeriodAmount {
                period: format!("{}{}", prefix, i + 1),
                amount: values[start..end].iter().sum(),
            }
        })
        .collect();

    if result.is_empty() {
        vec![PeriodAmount::no_data()]
    } else {
        result
    }
}

/// Rounds half-way values up, so -2.5 becomes -2
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Second-half mean against first-half mean, as a rounded percentage
///
/// Zero for fewer than two values or when the first half averages zero.
pub fn growth_rate(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let (first, second) = values.split_at(values.len() / 2);
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;

    let first_mean = mean(first);
    if first_mean == 0.0 {
        return 0.0;
    }

    round_half_up((mean(second) - first_mean) / first_mean * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub percentage: f64,
}

/// Share of products per category
///
/// Empty categories count as "Uncategorized". With no products the result
/// is a single "No Data" entry at 100%.
pub fn category_distribution<'a, I>(categories: I) -> Vec<CategoryShare>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;

    for category in categories {
        let name = if category.trim().is_empty() {
            "Uncategorized"
        } else {
            category
        };
        *counts.entry(name.to_string()).or_default() += 1;
        total += 1;
    }

    if total == 0 {
        return vec![CategoryShare {
            category: "No Data".to_string(),
            percentage: 100.0,
        }];
    }

    counts
        .into_iter()
        .map(|(category, count)| CategoryShare {
            category,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect()
}

/// Confidence as a whole percentage
pub fn success_probability(confidence: f64) -> i64 {
    round_half_up(confidence * 100.0) as i64
}

/// Score for the product at `rank` (0-based) in the performance chart
///
/// Zero confidence is treated as no confidence.
pub fn performance_score(confidence: Option<f64>, rank: usize) -> i64 {
    let base = match confidence {
        Some(c) if c != 0.0 => success_probability(c),
        _ => 50,
    };
    base - 5 * rank as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductScore {
    pub product: String,
    pub score: i64,
}

/// Performance scores for products in display order
pub fn product_performance<'a, I>(names: I, confidence: Option<f64>) -> Vec<ProductScore>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .enumerate()
        .map(|(rank, name)| ProductScore {
            product: name.to_string(),
            score: performance_score(confidence, rank),
        })
        .collect()
}

/// Suggestions shown under the forecast
pub fn recommendations(top_product: Option<&str>, growth: f64) -> Vec<String> {
    let mut tips = vec![
        "Keep your best sellers in stock ahead of peak season".to_string(),
        "Bundle slower items with popular products".to_string(),
        "Review pricing against similar products in your category".to_string(),
        "Add detailed sizing and photos to reduce returns".to_string(),
    ];

    if let Some(name) = top_product {
        tips[0] = format!("Keep \"{}\" in stock ahead of peak season", name);
    }

    if growth < 0.0 {
        tips.push("Sales are trending down: consider a promotion".to_string());
    }

    tips
}

/// Combined dashboard payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerDashboard {
    pub timeframe: Timeframe,
    pub revenue_forecasts: Vec<PeriodAmount>,
    pub growth_rate: f64,
    pub product_performance: Vec<ProductScore>,
    pub success_probability: i64,
    pub category_distribution: Vec<CategoryShare>,
    pub recommendations: Vec<String>,
}

impl SellerDashboard {
    /// Builds the dashboard from daily revenue predictions and the catalog
    ///
    /// `products` are `(name, category)` pairs in display order.
    pub fn build(
        timeframe: Timeframe,
        daily_revenue: &[f64],
        confidence: f64,
        products: &[(String, String)],
    ) -> Self {
        let growth = growth_rate(daily_revenue);

        Self {
            timeframe,
            revenue_forecasts: group_predictions(daily_revenue, timeframe),
            growth_rate: growth,
            product_performance: product_performance(
                products.iter().map(|(name, _)| name.as_str()),
                Some(confidence),
            ),
            success_probability: success_probability(confidence),
            category_distribution: category_distribution(
                products.iter().map(|(_, category)| category.as_str()),
            ),
            recommendations: recommendations(products.first().map(|(name, _)| name.as_str()), growth),
        }
    }
}
