//! Sales analytics
//!
//! Pure computations over aggregates loaded by `models::statistics`:
//!
//! - `growth`: reporting periods and growth percentages
//! - `forecast`: daily and monthly revenue forecasting
//! - `dashboard`: reshaping forecasts into seller dashboard charts
//!
//! Nothing here touches the database, so every function is unit tested
//! with plain vectors.

pub mod dashboard;
pub mod forecast;
pub mod growth;
