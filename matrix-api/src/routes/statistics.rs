/// Sales statistics for sellers and admins
///
/// # Endpoints
///
/// - `GET /api/statistics?period=&seller_id=` - Totals, top products, categories
/// - `GET /api/statistics/predictions?seller_id=` - Six actual and three projected months
/// - `GET /api/statistics/history?days=&seller_id=` - Daily snapshots
/// - `GET /api/statistics/overview?period=&seller_id=` - Current vs previous window
///
/// Sellers see their own numbers. Admins see the platform, or one seller
/// when `seller_id` is given. Buyers are refused.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Duration, NaiveDate, Utc};
use matrix_shared::{
    analytics::{
        forecast::{zero_fill_months, MonthPoint},
        growth::{
            add_months, calculate_growth, month_start, revenue_outlook, round2, OutlookMonth,
            OverviewPeriod, StatsPeriod,
        },
    },
    auth::middleware::AuthContext,
    models::{
        product::Product,
        statistics::{
            day_bounds, CategoryStat, SalesBasis, SalesStats, StatisticsSnapshot, StatusCount,
        },
    },
    pricing::{as_f64, seller_earnings},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOP_LIMIT: i64 = 5;

/// Actual months shown before the projection
const OUTLOOK_ACTUAL_MONTHS: u32 = 6;

/// Months in the overview revenue series
const OVERVIEW_MONTHS: u32 = 12;

const DEFAULT_HISTORY_DAYS: i64 = 30;
const MAX_HISTORY_DAYS: i64 = 365;

/// Margin reported when the window had no revenue
const EMPTY_PROFIT_MARGIN: f64 = 30.0;

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub period: Option<String>,
    pub seller_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SellerQuery {
    pub seller_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
    pub seller_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TopProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub sales_count: i32,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub period: StatsPeriod,
    pub seller_id: Option<Uuid>,
    pub total_revenue: Decimal,
    pub total_orders: i64,
    pub total_products: i64,
    pub avg_order_value: Decimal,
    pub top_products: Vec<TopProduct>,
    pub top_categories: Vec<CategoryStat>,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub seller_id: Option<Uuid>,
    pub predictions: Vec<OutlookMonth>,
}

#[derive(Debug, Serialize)]
pub struct MonthRevenue {
    pub month: String,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub period: OverviewPeriod,
    pub seller_id: Option<Uuid>,
    pub total_revenue: Decimal,
    pub total_orders: i64,
    pub avg_order_value: Decimal,
    pub revenue_growth: f64,
    pub orders_growth: f64,
    pub profit: Decimal,
    pub profit_margin: f64,
    pub status_distribution: Vec<StatusCount>,
    pub monthly_revenue: Vec<MonthRevenue>,
}

/// Seller whose numbers the caller may read; None means the whole platform
///
/// # Errors
///
/// `403` for buyers, and for sellers asking about someone else.
pub fn resolve_scope(auth: &AuthContext, requested: Option<Uuid>) -> ApiResult<Option<Uuid>> {
    if auth.is_admin() {
        return Ok(requested);
    }

    if !auth.is_seller() {
        return Err(ApiError::forbidden());
    }

    match requested {
        Some(id) if id != auth.user_id => Err(ApiError::forbidden()),
        _ => Ok(Some(auth.user_id)),
    }
}

/// Seller earnings and their share of revenue in percent
fn profit_and_margin(revenue: Decimal) -> (Decimal, f64) {
    if revenue <= Decimal::ZERO {
        return (Decimal::ZERO, EMPTY_PROFIT_MARGIN);
    }
    let profit = seller_earnings(revenue);
    (profit, round2(as_f64(profit) / as_f64(revenue) * 100.0))
}

pub async fn get_statistics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<Json<StatisticsResponse>> {
    let seller_id = resolve_scope(&auth, query.seller_id)?;
    let period = StatsPeriod::parse(query.period.as_deref().unwrap_or("month"));
    let start = period.start(Utc::now());

    let totals = SalesStats::totals(&state.db, seller_id, SalesBasis::Booked, Some(start), None).await?;
    let total_products = Product::count(&state.db, seller_id).await?;
    let top_categories = SalesStats::top_categories(&state.db, seller_id, TOP_LIMIT).await?;

    let top_products = Product::top_selling(&state.db, seller_id, TOP_LIMIT)
        .await?
        .into_iter()
        .map(|p| TopProduct {
            revenue: p.price * Decimal::from(p.sales_count),
            id: p.id,
            name: p.name,
            price: p.price,
            sales_count: p.sales_count,
        })
        .collect();

    Ok(Json(StatisticsResponse {
        period,
        seller_id,
        total_revenue: totals.revenue,
        total_orders: totals.orders,
        total_products,
        avg_order_value: totals.avg_order_value(),
        top_products,
        top_categories,
    }))
}

/// Revenue of the six months before the current one plus three projected
pub async fn get_predictions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SellerQuery>,
) -> ApiResult<Json<PredictionsResponse>> {
    let seller_id = resolve_scope(&auth, query.seller_id)?;

    let current_month = month_start(Utc::now().date_naive());
    let last_month = add_months(current_month, -1);
    let first_month = add_months(current_month, -(OUTLOOK_ACTUAL_MONTHS as i32));

    let monthly = SalesStats::monthly(
        &state.db,
        seller_id,
        SalesBasis::Booked,
        day_bounds(first_month).0,
    )
    .await?;

    let points: Vec<MonthPoint> = monthly
        .iter()
        .map(|m| MonthPoint {
            month: m.month,
            revenue: as_f64(m.revenue),
        })
        .collect();
    let actuals: Vec<(NaiveDate, f64)> = zero_fill_months(&points, last_month, OUTLOOK_ACTUAL_MONTHS)
        .into_iter()
        .map(|p| (p.month, p.revenue))
        .collect();

    Ok(Json(PredictionsResponse {
        seller_id,
        predictions: revenue_outlook(&actuals, current_month),
    }))
}

/// Daily snapshots written by the worker, oldest first
pub async fn get_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<StatisticsSnapshot>>> {
    let seller_id = resolve_scope(&auth, query.seller_id)?;
    let days = query
        .days
        .unwrap_or(DEFAULT_HISTORY_DAYS)
        .clamp(1, MAX_HISTORY_DAYS);
    let since = Utc::now().date_naive() - Duration::days(days);

    Ok(Json(StatisticsSnapshot::history(&state.db, seller_id, since).await?))
}

/// Current window against the window of the same length before it
///
/// # Errors
///
/// `400` for an unknown period.
pub async fn get_overview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<Json<OverviewResponse>> {
    let seller_id = resolve_scope(&auth, query.seller_id)?;
    let period: OverviewPeriod = query
        .period
        .as_deref()
        .unwrap_or("month")
        .parse()
        .map_err(ApiError::BadRequest)?;

    let now = Utc::now();
    let window = period.window(now);
    let previous_window = window.previous();

    let current = SalesStats::totals(
        &state.db,
        seller_id,
        SalesBasis::Booked,
        Some(window.start),
        Some(window.end),
    )
    .await?;
    let previous = SalesStats::totals(
        &state.db,
        seller_id,
        SalesBasis::Booked,
        Some(previous_window.start),
        Some(previous_window.end),
    )
    .await?;

    let status_distribution =
        SalesStats::status_distribution(&state.db, seller_id, Some(window.start)).await?;

    let last_month = month_start(now.date_naive());
    let first_month = add_months(last_month, 1 - OVERVIEW_MONTHS as i32);
    let monthly = SalesStats::monthly(
        &state.db,
        seller_id,
        SalesBasis::Booked,
        day_bounds(first_month).0,
    )
    .await?;
    let points: Vec<MonthPoint> = monthly
        .iter()
        .map(|m| MonthPoint {
            month: m.month,
            revenue: as_f64(m.revenue),
        })
        .collect();
    let monthly_revenue = zero_fill_months(&points, last_month, OVERVIEW_MONTHS)
        .into_iter()
        .map(|p| MonthRevenue {
            month: p.month.format("%b %Y").to_string(),
            revenue: round2(p.revenue),
        })
        .collect();

    let (profit, profit_margin) = profit_and_margin(current.revenue);

    Ok(Json(OverviewResponse {
        period,
        seller_id,
        total_revenue: current.revenue,
        total_orders: current.orders,
        avg_order_value: current.avg_order_value(),
        revenue_growth: calculate_growth(as_f64(current.revenue), as_f64(previous.revenue)),
        orders_growth: calculate_growth(current.orders as f64, previous.orders as f64),
        profit,
        profit_margin,
        status_distribution,
        monthly_revenue,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_shared::models::user::Role;

    #[test]
    fn test_resolve_scope() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let seller = AuthContext::new(me, Role::Seller);
        assert_eq!(resolve_scope(&seller, None).unwrap(), Some(me));
        assert_eq!(resolve_scope(&seller, Some(me)).unwrap(), Some(me));
        assert!(matches!(
            resolve_scope(&seller, Some(other)),
            Err(ApiError::Forbidden(_))
        ));

        let admin = AuthContext::new(me, Role::Admin);
        assert_eq!(resolve_scope(&admin, None).unwrap(), None);
        assert_eq!(resolve_scope(&admin, Some(other)).unwrap(), Some(other));

        let buyer = AuthContext::new(me, Role::Buyer);
        assert!(matches!(resolve_scope(&buyer, None), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn test_profit_and_margin() {
        assert_eq!(profit_and_margin(Decimal::ZERO), (Decimal::ZERO, 30.0));

        let (profit, margin) = profit_and_margin(Decimal::new(20000, 2));
        assert_eq!(profit, Decimal::new(18000, 2));
        assert_eq!(margin, 90.0);
    }
}
