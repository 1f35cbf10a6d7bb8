/// Sales predictions and seller forecasts
///
/// # Endpoints
///
/// - `GET /api/predictions/sales/:product_id?days=30` - Daily product forecast
/// - `GET /api/predictions/sales/seller/:seller_id?days=30` - Daily seller forecast
/// - `GET /api/seller/predictions/:horizon` - Monthly forecast (`6-month`, `1-year`, `5-year`)
/// - `GET /api/seller/predictions/summary` - All three horizons and history stats
/// - `GET /api/seller/predictions/top-products/:horizon?limit=10`
/// - `GET /api/seller/dashboard?timeframe=6months|1year|5years`
///
/// Daily forecasts fit a least-squares line to the last 90 days of completed
/// orders. Monthly forecasts use the last `PREDICTION_HISTORY_MONTHS`
/// calendar months before the current one, zero-filled.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Duration, NaiveDate, Utc};
use matrix_shared::{
    analytics::{
        dashboard::{SellerDashboard, Timeframe},
        forecast::{
            confidence_label, forecast_daily, forecast_months, project_products, zero_fill_months,
            zero_month_share, DailyForecast, DailyPoint, Forecast, Horizon, MonthPoint,
            ProductHistory, ProductProjection,
        },
        growth::{add_months, month_start, round2},
    },
    auth::{
        authorization::{require_any_role, require_owner_or_role, require_self_or_role},
        middleware::AuthContext,
    },
    models::{
        product::Product,
        statistics::{
            day_bounds, DailySales, DailyScope, ProductMonthlySales, SalesBasis, SalesStats,
        },
        user::Role,
    },
    pricing::as_f64,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Days of daily history behind a daily forecast
const DAILY_HISTORY_DAYS: i64 = 90;

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 1825;

const DEFAULT_TOP_PRODUCTS: usize = 10;
const MAX_TOP_PRODUCTS: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopProductsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub timeframe: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductSalesPrediction {
    pub product_id: Uuid,
    pub product_name: String,
    #[serde(flatten)]
    pub forecast: DailyForecast,
}

#[derive(Debug, Serialize)]
pub struct ProductBrief {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct SellerSalesPrediction {
    pub seller_id: Uuid,
    #[serde(flatten)]
    pub forecast: DailyForecast,
    pub products: Vec<ProductBrief>,
}

#[derive(Debug, Serialize)]
pub struct HistoryStats {
    pub months: usize,
    pub total_revenue: f64,
    pub avg_monthly_revenue: f64,
    pub zero_month_percentage: f64,
    pub confidence_label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ForecastSummary {
    pub seller_id: Uuid,
    pub forecasts: Vec<Forecast>,
    pub history: HistoryStats,
}

#[derive(Debug, Serialize)]
pub struct TopProductsResponse {
    pub horizon: Horizon,
    pub products: Vec<ProductProjection>,
}

fn clamp_days(days: Option<u32>) -> u32 {
    days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
}

fn daily_points(rows: &[DailySales]) -> Vec<DailyPoint> {
    rows.iter()
        .map(|row| DailyPoint {
            date: row.day,
            quantity: row.quantity as f64,
            revenue: as_f64(row.revenue),
        })
        .collect()
}

/// Fits the last 90 days of completed sales and projects `days` ahead
async fn daily_forecast(state: &AppState, scope: DailyScope, days: u32) -> ApiResult<DailyForecast> {
    let today = Utc::now().date_naive();
    let since = day_bounds(today - Duration::days(DAILY_HISTORY_DAYS)).0;

    let rows = SalesStats::daily(&state.db, scope, since).await?;
    Ok(forecast_daily(&daily_points(&rows), days, today))
}

/// First day of the last month included in monthly history
fn last_history_month(today: NaiveDate) -> NaiveDate {
    add_months(month_start(today), -1)
}

/// Zero-filled monthly revenue of a seller
async fn monthly_history(state: &AppState, seller_id: Uuid) -> ApiResult<Vec<MonthPoint>> {
    let months = state.config.predictions.history_months;
    let last_month = last_history_month(Utc::now().date_naive());
    let first_month = add_months(last_month, 1 - months as i32);

    let rows = SalesStats::monthly(
        &state.db,
        Some(seller_id),
        SalesBasis::Booked,
        day_bounds(first_month).0,
    )
    .await?;

    let points: Vec<MonthPoint> = rows
        .iter()
        .map(|row| MonthPoint {
            month: row.month,
            revenue: as_f64(row.revenue),
        })
        .collect();

    Ok(zero_fill_months(&points, last_month, months))
}

fn history_stats(history: &[MonthPoint]) -> HistoryStats {
    let total: f64 = history.iter().map(|p| p.revenue).sum();
    let avg = if history.is_empty() {
        0.0
    } else {
        total / history.len() as f64
    };

    HistoryStats {
        months: history.len(),
        total_revenue: round2(total),
        avg_monthly_revenue: round2(avg),
        zero_month_percentage: round2(zero_month_share(history)),
        confidence_label: confidence_label(history),
    }
}

/// Groups per-product monthly rows into histories, oldest month first
///
/// Months after `last_month` are dropped.
fn product_histories(rows: &[ProductMonthlySales], last_month: NaiveDate) -> Vec<ProductHistory> {
    let mut grouped: BTreeMap<Uuid, (ProductHistory, BTreeMap<NaiveDate, (f64, f64)>)> =
        BTreeMap::new();

    for row in rows.iter().filter(|row| row.month <= last_month) {
        let (_, months) = grouped.entry(row.product_id).or_insert_with(|| {
            (
                ProductHistory {
                    product_id: row.product_id,
                    product_name: row.name.clone(),
                    product_image: row.image_url.clone(),
                    product_price: as_f64(row.price),
                    product_category: row.category.clone(),
                    months: Vec::new(),
                },
                BTreeMap::new(),
            )
        });
        let month = months.entry(row.month).or_insert((0.0, 0.0));
        month.0 += as_f64(row.revenue);
        month.1 += row.units as f64;
    }

    grouped
        .into_values()
        .map(|(mut history, months)| {
            history.months = months.into_values().collect();
            history
        })
        .collect()
}

/// Caller must be a seller or superadmin to use the seller views
fn require_seller(auth: &AuthContext) -> ApiResult<()> {
    require_any_role(auth, &[Role::Seller, Role::Superadmin])?;
    Ok(())
}

/// Daily forecast for one product
///
/// # Errors
///
/// - `403`: caller neither owns the product nor is a superadmin
/// - `404`: unknown product
pub async fn product_sales_prediction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<ProductSalesPrediction>> {
    let product = Product::find_by_id(&state.db, product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    require_owner_or_role(&auth, product.seller_id, &[Role::Superadmin])?;

    let forecast = daily_forecast(&state, DailyScope::Product(product.id), clamp_days(query.days)).await?;

    Ok(Json(ProductSalesPrediction {
        product_id: product.id,
        product_name: product.name,
        forecast,
    }))
}

/// Daily forecast over all of a seller's items
pub async fn seller_sales_prediction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(seller_id): Path<Uuid>,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<SellerSalesPrediction>> {
    require_self_or_role(&auth, seller_id, &[Role::Admin, Role::Superadmin])?;

    let forecast = daily_forecast(&state, DailyScope::Seller(seller_id), clamp_days(query.days)).await?;
    let products = Product::list_by_seller(&state.db, seller_id)
        .await?
        .into_iter()
        .map(|p| ProductBrief {
            id: p.id,
            name: p.name,
            category: p.category,
            price: p.price,
        })
        .collect();

    Ok(Json(SellerSalesPrediction {
        seller_id,
        forecast,
        products,
    }))
}

/// Monthly revenue forecast of the caller for one horizon
///
/// # Errors
///
/// - `400`: unknown horizon
/// - `404`: no revenue in the history window
pub async fn forecast(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(horizon): Path<String>,
) -> ApiResult<Json<Forecast>> {
    require_seller(&auth)?;
    let horizon: Horizon = horizon.parse()?;

    let history = monthly_history(&state, auth.user_id).await?;
    let forecast = forecast_months(&history, horizon)?;

    tracing::debug!(
        seller_id = %auth.user_id,
        horizon = horizon.as_str(),
        total = forecast.total_revenue,
        "Forecast computed"
    );

    Ok(Json(forecast))
}

pub async fn forecast_summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ForecastSummary>> {
    require_seller(&auth)?;

    let history = monthly_history(&state, auth.user_id).await?;
    let forecasts = Horizon::ALL
        .iter()
        .map(|horizon| forecast_months(&history, *horizon))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ForecastSummary {
        seller_id: auth.user_id,
        forecasts,
        history: history_stats(&history),
    }))
}

/// Products ranked by projected revenue for a horizon
pub async fn top_products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(horizon): Path<String>,
    Query(query): Query<TopProductsQuery>,
) -> ApiResult<Json<TopProductsResponse>> {
    require_seller(&auth)?;
    let horizon: Horizon = horizon.parse()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_PRODUCTS)
        .clamp(1, MAX_TOP_PRODUCTS);

    let months = state.config.predictions.history_months;
    let last_month = last_history_month(Utc::now().date_naive());
    let first_month = add_months(last_month, 1 - months as i32);

    let rows = SalesStats::product_monthly(&state.db, auth.user_id, day_bounds(first_month).0).await?;
    let histories = product_histories(&rows, last_month);

    Ok(Json(TopProductsResponse {
        horizon,
        products: project_products(&histories, horizon, limit),
    }))
}

/// Dashboard for the caller built from a daily forecast over the timeframe
///
/// # Errors
///
/// `400` for an unknown timeframe.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<SellerDashboard>> {
    require_seller(&auth)?;

    let timeframe = match query.timeframe.as_deref() {
        Some(raw) => raw.parse::<Timeframe>().map_err(ApiError::BadRequest)?,
        None => Timeframe::default(),
    };

    let forecast = daily_forecast(&state, DailyScope::Seller(auth.user_id), timeframe.days()).await?;
    let daily_revenue: Vec<f64> = forecast.predictions.iter().map(|p| p.revenue).collect();

    let products: Vec<(String, String)> = Product::list_by_seller(&state.db, auth.user_id)
        .await?
        .into_iter()
        .map(|p| (p.name, p.category))
        .collect();

    Ok(Json(SellerDashboard::build(
        timeframe,
        &daily_revenue,
        forecast.confidence,
        &products,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(product_id: Uuid, month: NaiveDate, revenue: i64) -> ProductMonthlySales {
        ProductMonthlySales {
            product_id,
            name: "Trail Runner".to_string(),
            category: "Footwear".to_string(),
            image_url: None,
            price: Decimal::new(5000, 2),
            month,
            revenue: Decimal::from(revenue),
            units: revenue / 50,
        }
    }

    #[test]
    fn test_last_history_month_is_previous_month() {
        assert_eq!(last_history_month(day(2025, 3, 17)), day(2025, 2, 1));
        assert_eq!(last_history_month(day(2025, 1, 1)), day(2024, 12, 1));
    }

    #[test]
    fn test_clamp_days() {
        assert_eq!(clamp_days(None), 30);
        assert_eq!(clamp_days(Some(0)), 1);
        assert_eq!(clamp_days(Some(10_000)), MAX_DAYS);
    }

    #[test]
    fn test_product_histories_groups_and_orders_months() {
        let shoe = Uuid::new_v4();
        let rows = vec![
            row(shoe, day(2025, 2, 1), 200),
            row(shoe, day(2025, 1, 1), 100),
            row(shoe, day(2025, 3, 1), 400),
        ];

        let histories = product_histories(&rows, day(2025, 2, 1));
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].product_price, 50.0);
        assert_eq!(histories[0].months, vec![(100.0, 2.0), (200.0, 4.0)]);
    }

    #[test]
    fn test_history_stats() {
        let history = vec![
            MonthPoint { month: day(2025, 1, 1), revenue: 0.0 },
            MonthPoint { month: day(2025, 2, 1), revenue: 300.0 },
        ];

        let stats = history_stats(&history);
        assert_eq!(stats.months, 2);
        assert_eq!(stats.total_revenue, 300.0);
        assert_eq!(stats.avg_monthly_revenue, 150.0);
        assert_eq!(stats.zero_month_percentage, 50.0);
        assert_eq!(stats.confidence_label, "Normal Confidence");
    }
}
