use crate::types::{Forecast, Waypoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

pub type WeatherResult<T> = Result<T, WeatherError>;

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Quarter-hourly forecast for every waypoint of `route` on `date`
    async fn fetch_forecast(&self, route: &[Waypoint], date: NaiveDate) -> WeatherResult<Forecast>;

    fn provider_name(&self) -> &'static str;
}
