use crate::config::OpenMeteoConfig;
use crate::provider::{ForecastProvider, WeatherError, WeatherResult};
use crate::types::{Forecast, Timeline, WeatherSample, Waypoint};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const MINUTELY_FIELDS: [&str; 5] = [
    "precipitation",
    "temperature_2m",
    "wind_speed_10m",
    "wind_direction_10m",
    "weather_code",
];

pub const HOURLY_FIELDS: [&str; 1] = ["precipitation_probability"];

#[derive(Deserialize, Default)]
struct ApiSeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(flatten)]
    values: HashMap<String, Vec<Option<f64>>>,
}

impl ApiSeries {
    fn value(&self, field: &str, index: usize) -> f64 {
        self.values
            .get(field)
            .and_then(|series| series.get(index).copied().flatten())
            .unwrap_or(0.0)
    }
}

#[derive(Deserialize)]
struct ApiForecast {
    minutely_15: Option<ApiSeries>,
    hourly: Option<ApiSeries>,
}

/// Forecast date and the sorted route it was fetched for
type CacheKey = (NaiveDate, String);

pub struct OpenMeteoProvider {
    http_client: reqwest::Client,
    config: OpenMeteoConfig,
    cache: Mutex<HashMap<CacheKey, Forecast>>,
}

impl OpenMeteoProvider {
    pub fn new(config: OpenMeteoConfig) -> WeatherResult<Self> {
        config
            .validate()
            .map_err(|message| WeatherError::InvalidConfig { message })?;

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let http_client = builder.build().map_err(|e| WeatherError::InvalidConfig {
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            http_client,
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_default_config() -> WeatherResult<Self> {
        Self::new(OpenMeteoConfig::default())
    }

    pub fn config(&self) -> &OpenMeteoConfig {
        &self.config
    }

    pub fn build_url(&self, route: &[Waypoint], date: NaiveDate) -> String {
        let latitudes = route
            .iter()
            .map(|w| w.latitude.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let longitudes = route
            .iter()
            .map(|w| w.longitude.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let date = date.format("%Y-%m-%d");

        format!(
            "{}/v1/forecast?latitude={}&longitude={}&hourly={}&minutely_15={}&start_date={}&end_date={}&timezone=UTC&models={}",
            self.config.base_url.trim_end_matches('/'),
            latitudes,
            longitudes,
            HOURLY_FIELDS.join(","),
            MINUTELY_FIELDS.join(","),
            date,
            date,
            self.config.model
        )
    }

    fn cache_key(route: &[Waypoint], date: NaiveDate) -> CacheKey {
        let mut points: Vec<String> = route
            .iter()
            .map(|w| format!("{}@{},{}", w.name, w.latitude, w.longitude))
            .collect();
        points.sort();
        (date, points.join(";"))
    }

    /// Cache `forecast`, dropping entries for days before its own
    fn remember(&self, key: CacheKey, forecast: Forecast) {
        if let Ok(mut cache) = self.cache.lock() {
            let date = key.0;
            cache.retain(|(day, _), _| *day >= date);
            cache.insert(key, forecast);
        }
    }

    async fn fetch_batch(&self, route: &[Waypoint], date: NaiveDate) -> WeatherResult<Vec<serde_json::Value>> {
        let url = self.build_url(route, date);
        let attempts = self.config.max_retries;
        let mut attempt = 1;

        loop {
            info!("[batch] API call attempt {}/{}: {}", attempt, attempts, url);

            match self.request(&url).await {
                Ok(body) => return Self::split_batch(body, route.len()),
                Err(e) if attempt < attempts => {
                    warn!("[batch] API call failed ({}/{}): {}", attempt, attempts, e);
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("[batch] API call failed ({}/{}): {}", attempt, attempts, e);
                    return Err(e);
                }
            }
        }
    }

    async fn request(&self, url: &str) -> WeatherResult<serde_json::Value> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                WeatherError::ServiceUnavailable {
                    message: "Request timeout".to_string(),
                }
            } else if e.is_connect() {
                WeatherError::ServiceUnavailable {
                    message: "Cannot connect to Open-Meteo".to_string(),
                }
            } else {
                WeatherError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(WeatherError::ServiceUnavailable {
                message: format!("Open-Meteo returned {}: {}", status, error_text),
            });
        }

        Ok(response.json().await?)
    }

    /// The API answers a multi-point query with one object per point, and a
    /// single-point query with a bare object.
    fn split_batch(body: serde_json::Value, expected: usize) -> WeatherResult<Vec<serde_json::Value>> {
        match body {
            serde_json::Value::Array(items) if items.len() == expected => Ok(items),
            serde_json::Value::Array(items) => Err(WeatherError::UnexpectedResponse {
                message: format!("expected {} forecasts, got {}", expected, items.len()),
            }),
            object @ serde_json::Value::Object(_) if expected == 1 => Ok(vec![object]),
            _ => Err(WeatherError::UnexpectedResponse {
                message: "unexpected API response format for multi-point forecast".to_string(),
            }),
        }
    }

    fn parse_time(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
            .ok()?;
        Some(Utc.from_utc_datetime(&naive).with_timezone(tz))
    }

    fn start_of_hour(t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        t.with_minute(0)?.with_second(0)?.with_nanosecond(0)
    }

    /// Convert one point's raw payload into a local-time timeline
    pub fn parse_timeline(raw: serde_json::Value, tz: &Tz) -> WeatherResult<Timeline> {
        let forecast: ApiForecast = serde_json::from_value(raw)?;
        let minutely = forecast
            .minutely_15
            .ok_or_else(|| WeatherError::UnexpectedResponse {
                message: "missing minutely_15 series".to_string(),
            })?;

        let mut hourly_probability = HashMap::new();
        if let Some(hourly) = &forecast.hourly {
            for (index, raw_time) in hourly.time.iter().enumerate() {
                if let Some(hour) = Self::parse_time(raw_time, tz) {
                    hourly_probability.insert(hour, hourly.value(HOURLY_FIELDS[0], index));
                }
            }
        }

        let mut timeline = Timeline::new();
        for (index, raw_time) in minutely.time.iter().enumerate() {
            let Some(at) = Self::parse_time(raw_time, tz) else {
                debug!("Skipping unparseable timestamp {}", raw_time);
                continue;
            };

            let precipitation_probability = Self::start_of_hour(&at)
                .and_then(|hour| hourly_probability.get(&hour).copied())
                .unwrap_or(0.0);

            let sample = WeatherSample {
                precipitation: round2(minutely.value("precipitation", index)),
                temperature_2m: round2(minutely.value("temperature_2m", index)),
                wind_speed_10m: round2(minutely.value("wind_speed_10m", index)),
                wind_direction_10m: round2(minutely.value("wind_direction_10m", index)),
                weather_code: minutely.value("weather_code", index).round().clamp(0.0, 255.0) as u8,
                precipitation_probability,
            };
            timeline.insert(at, sample);
        }

        Ok(timeline)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    async fn fetch_forecast(&self, route: &[Waypoint], date: NaiveDate) -> WeatherResult<Forecast> {
        let key = Self::cache_key(route, date);
        if let Some(cached) = self.cache.lock().ok().and_then(|cache| cache.get(&key).cloned()) {
            info!("[cache] Using cached forecast for {}", date);
            return Ok(cached);
        }

        let raw = self.fetch_batch(route, date).await?;

        let mut forecast = Forecast::new();
        for (waypoint, payload) in route.iter().zip(raw) {
            let timeline = match Self::parse_timeline(payload, &self.config.timezone) {
                Ok(timeline) => timeline,
                Err(e) => {
                    error!("Failed to process forecast for {}: {}", waypoint.name, e);
                    Timeline::new()
                }
            };
            forecast.insert(waypoint.name.clone(), timeline);
        }

        self.remember(key, forecast.clone());

        Ok(forecast)
    }

    fn provider_name(&self) -> &'static str {
        "open-meteo"
    }
}
