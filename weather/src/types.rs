use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Inclusive compass range in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionRange {
    pub min: f64,
    pub max: f64,
}

impl DirectionRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, degrees: f64) -> bool {
        self.min <= degrees && degrees <= self.max
    }
}

/// A point on the ride where the forecast is sampled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Wind directions that do not hinder the rider here. `None` means any
    /// direction is acceptable.
    pub favourable_wind: Option<DirectionRange>,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            favourable_wind: None,
        }
    }

    pub fn with_favourable_wind(mut self, min: f64, max: f64) -> Self {
        self.favourable_wind = Some(DirectionRange::new(min, max));
        self
    }

    /// Whether the wind at `degrees` is acceptable at this waypoint
    pub fn wind_direction_ok(&self, degrees: f64) -> bool {
        self.favourable_wind
            .map(|range| range.contains(degrees))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// mm over the quarter hour
    pub precipitation: f64,
    /// °C
    pub temperature_2m: f64,
    /// km/h
    pub wind_speed_10m: f64,
    /// degrees
    pub wind_direction_10m: f64,
    pub weather_code: u8,
    /// percent, from the hourly series
    pub precipitation_probability: f64,
}

impl WeatherSample {
    pub fn summary(&self, name: &str) -> String {
        format!(
            "{}: {} mm | {} km/h | {}° | Dir {}°",
            name,
            self.precipitation,
            self.wind_speed_10m,
            self.temperature_2m,
            self.wind_direction_10m
        )
    }
}

pub type Timeline = BTreeMap<DateTime<Tz>, WeatherSample>;

/// Forecast timelines keyed by waypoint name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    points: HashMap<String, Timeline>,
}

impl Forecast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, timeline: Timeline) {
        self.points.insert(name.into(), timeline);
    }

    pub fn timeline(&self, name: &str) -> Option<&Timeline> {
        self.points.get(name)
    }

    pub fn sample(&self, name: &str, at: &DateTime<Tz>) -> Option<&WeatherSample> {
        self.points.get(name).and_then(|timeline| timeline.get(at))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Brussels;

    #[test]
    fn test_direction_range_is_inclusive() {
        let range = DirectionRange::new(270.0, 360.0);
        assert!(range.contains(270.0));
        assert!(range.contains(360.0));
        assert!(range.contains(300.5));
        assert!(!range.contains(269.9));
    }

    #[test]
    fn test_waypoint_without_range_accepts_any_wind() {
        let mons = Waypoint::new("Mons", 50.4541, 3.9523);
        assert!(mons.wind_direction_ok(0.0));
        assert!(mons.wind_direction_ok(181.0));

        let tournai = Waypoint::new("Tournai", 50.6071, 3.3893).with_favourable_wind(270.0, 360.0);
        assert!(!tournai.wind_direction_ok(90.0));
    }

    #[test]
    fn test_sample_summary() {
        let sample = WeatherSample {
            precipitation: 0.1,
            temperature_2m: 12.5,
            wind_speed_10m: 18.0,
            wind_direction_10m: 250.0,
            weather_code: 3,
            precipitation_probability: 20.0,
        };
        assert_eq!(
            sample.summary("E42"),
            "E42: 0.1 mm | 18 km/h | 12.5° | Dir 250°"
        );
    }

    #[test]
    fn test_forecast_lookup_by_instant() {
        let at = Brussels.with_ymd_and_hms(2025, 5, 6, 8, 15, 0).unwrap();
        let mut timeline = Timeline::new();
        timeline.insert(at, WeatherSample::default());

        let mut forecast = Forecast::new();
        forecast.insert("Mons", timeline);

        let same_instant = chrono::Utc
            .with_ymd_and_hms(2025, 5, 6, 6, 15, 0)
            .unwrap()
            .with_timezone(&Brussels);
        assert!(forecast.sample("Mons", &same_instant).is_some());
        assert!(forecast.sample("Tournai", &at).is_none());
        assert_eq!(forecast.len(), 1);
    }
}
