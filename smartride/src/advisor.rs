//! Picks the departure and return times with the least weather risk.
//!
//! Each ride is sampled at its waypoints, fifteen minutes apart. A candidate
//! departure gets the worst risk and discomfort seen along the route, for
//! each gear level, and the best candidate is chosen per level. Morning and
//! evening results are then combined into a round trip that uses the same
//! gear both ways.

use crate::notification::{Notification, NotificationKind, NotificationManager};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use tracing::{debug, error, info};
use weather::{describe, Forecast, ForecastProvider, Language, Waypoint};

/// Time between two consecutive waypoints and between two departure slots
pub const SLOT_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RideMode {
    /// Home to campus
    Morning,
    /// Campus to home
    Evening,
}

impl RideMode {
    pub fn route(&self) -> Vec<Waypoint> {
        match self {
            RideMode::Morning => vec![
                Waypoint::new("Tournai", 50.6071, 3.3893).with_favourable_wind(270.0, 360.0),
                Waypoint::new("E42", 50.549, 3.525).with_favourable_wind(270.0, 360.0),
                Waypoint::new("E42bis", 50.474, 3.742).with_favourable_wind(180.0, 360.0),
                Waypoint::new("Mons", 50.4541, 3.9523),
            ],
            RideMode::Evening => vec![
                Waypoint::new("Mons", 50.4541, 3.9523).with_favourable_wind(45.0, 135.0),
                Waypoint::new("E42bis", 50.474, 3.742).with_favourable_wind(90.0, 180.0),
                Waypoint::new("E42", 50.549, 3.525).with_favourable_wind(90.0, 180.0),
                Waypoint::new("Tournai", 50.6071, 3.3893),
            ],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RideMode::Morning => "Departure",
            RideMode::Evening => "Return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GearLevel {
    Summer,
    MidSeason,
    Winter,
}

impl GearLevel {
    pub const ALL: [GearLevel; 3] = [GearLevel::Summer, GearLevel::MidSeason, GearLevel::Winter];

    /// Temperature in °C at which this gear is comfortable
    pub fn ideal_temperature(&self) -> f64 {
        match self {
            GearLevel::Summer => 22.0,
            GearLevel::MidSeason => 14.0,
            GearLevel::Winter => 10.0,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            GearLevel::Summer => "summer gear",
            GearLevel::MidSeason => "mid-season gear",
            GearLevel::Winter => "winter gear",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub morning_latest_departure: NaiveTime,
    pub morning_max_early: Duration,
    pub evening_first_departure: NaiveTime,
    pub evening_max_late: Duration,
    pub trip_duration: Duration,
    /// Evaluate a single gear level instead of all of them
    pub gear: Option<GearLevel>,
    /// mm per quarter hour
    pub max_acceptable_rain: f64,
    /// km/h
    pub max_acceptable_wind_speed: f64,
    /// km/h, when blowing from a favourable direction
    pub max_tolerated_wind_with_good_direction: f64,
    /// °C
    pub min_acceptable_temperature: f64,
    pub risk_score_tolerance: f64,
    pub risk_score_threshold: f64,
    pub banned_wmo_codes: BTreeSet<u8>,
    pub language: Language,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            morning_latest_departure: NaiveTime::from_hms_opt(9, 45, 0).unwrap_or(NaiveTime::MIN),
            morning_max_early: Duration::minutes(45),
            evening_first_departure: NaiveTime::from_hms_opt(11, 30, 0).unwrap_or(NaiveTime::MIN),
            evening_max_late: Duration::minutes(30),
            trip_duration: Duration::minutes(45),
            gear: None,
            max_acceptable_rain: 0.2,
            max_acceptable_wind_speed: 25.0,
            max_tolerated_wind_with_good_direction: 35.0,
            min_acceptable_temperature: 6.0,
            risk_score_tolerance: 0.15,
            risk_score_threshold: 0.5,
            banned_wmo_codes: [45, 48, 55, 56, 57, 65, 66, 67, 75, 77, 81, 82, 86, 95, 96, 99]
                .into_iter()
                .collect(),
            language: Language::En,
        }
    }
}

impl AdvisorConfig {
    pub fn with_morning_latest_departure(mut self, time: NaiveTime) -> Self {
        self.morning_latest_departure = time;
        self
    }

    pub fn with_evening_first_departure(mut self, time: NaiveTime) -> Self {
        self.evening_first_departure = time;
        self
    }

    pub fn with_trip_duration(mut self, trip_duration: Duration) -> Self {
        self.trip_duration = trip_duration;
        self
    }

    pub fn with_gear(mut self, gear: GearLevel) -> Self {
        self.gear = Some(gear);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    fn gear_levels(&self) -> Vec<GearLevel> {
        match self.gear {
            Some(level) => vec![level],
            None => GearLevel::ALL.to_vec(),
        }
    }

    /// Hazard score in `[0, 1]` for riding through `waypoint` in `sample`
    pub fn compute_risk(&self, sample: &weather::WeatherSample, waypoint: &Waypoint) -> f64 {
        if self.banned_wmo_codes.contains(&sample.weather_code) {
            return 1.0;
        }

        let direction_ok = waypoint.wind_direction_ok(sample.wind_direction_10m);
        let mut score: f64 = 0.0;

        if sample.wind_speed_10m > self.max_acceptable_wind_speed
            && (!direction_ok || sample.wind_speed_10m > self.max_tolerated_wind_with_good_direction)
        {
            score += 0.6;
        }
        if sample.precipitation > self.max_acceptable_rain {
            score += 0.6;
        }
        if sample.temperature_2m < self.min_acceptable_temperature {
            score += 0.6;
        }

        score.min(1.0)
    }

    /// Departure slots for `mode`, never earlier than `now` rounded up to the
    /// next quarter hour. Window bounds off the quarter-hour grid are pulled
    /// inside it: the morning latest departure down, the evening first
    /// departure up.
    pub fn departure_slots(&self, mode: RideMode, now: &DateTime<Tz>) -> Vec<DateTime<Tz>> {
        let Some(now) = round_up_to_slot(now) else {
            return Vec::new();
        };
        let tz = now.timezone();
        let today = now.date_naive();
        let at = |time: NaiveTime| tz.from_local_datetime(&today.and_time(time)).earliest();

        let (start, end) = match mode {
            RideMode::Morning => {
                let Some(latest) = at(self.morning_latest_departure).and_then(|t| round_down_to_slot(&t))
                else {
                    return Vec::new();
                };
                ((latest - self.morning_max_early).max(now), latest)
            }
            RideMode::Evening => {
                let Some(earliest) = at(self.evening_first_departure).and_then(|t| round_up_to_slot(&t))
                else {
                    return Vec::new();
                };
                (earliest.max(now), earliest + self.evening_max_late)
            }
        };

        let mut slots = Vec::new();
        let mut slot = start;
        while slot <= end {
            slots.push(slot);
            slot += Duration::minutes(SLOT_MINUTES);
        }
        slots
    }

    /// Score every departure slot for each gear level. Slots where any
    /// waypoint lacks data are skipped.
    pub fn evaluate(
        &self,
        mode: RideMode,
        forecast: &Forecast,
        route: &[Waypoint],
        slots: &[DateTime<Tz>],
    ) -> Vec<GearOption> {
        let mut options = Vec::new();

        for level in self.gear_levels() {
            let candidates: Vec<Candidate> = slots
                .iter()
                .filter_map(|departure| self.score_departure(forecast, route, *departure, level))
                .collect();

            match select_best(mode, &candidates, self.risk_score_tolerance) {
                Some(best) => options.push(GearOption {
                    level,
                    candidates,
                    best,
                }),
                None => debug!("No candidate for {:?} with {}", mode, level.description()),
            }
        }

        options
    }

    fn score_departure(
        &self,
        forecast: &Forecast,
        route: &[Waypoint],
        departure: DateTime<Tz>,
        level: GearLevel,
    ) -> Option<Candidate> {
        let mut risk: f64 = 0.0;
        let mut discomfort: f64 = 0.0;

        for (index, waypoint) in route.iter().enumerate() {
            let at = departure + Duration::minutes(SLOT_MINUTES * index as i64);
            let sample = forecast.sample(&waypoint.name, &at)?;
            risk = risk.max(self.compute_risk(sample, waypoint));
            discomfort = discomfort.max(compute_discomfort(sample, level));
        }

        Some(Candidate {
            departure,
            risk,
            discomfort,
            refused: risk > self.risk_score_threshold || discomfort > self.risk_score_threshold,
        })
    }
}

fn round_down_to_slot(at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let truncated = at.with_second(0)?.with_nanosecond(0)?;
    let remainder = i64::from(truncated.minute()) % SLOT_MINUTES;
    Some(truncated - Duration::minutes(remainder))
}

fn round_up_to_slot(at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let floor = round_down_to_slot(at)?;
    if floor == *at {
        Some(floor)
    } else {
        Some(floor + Duration::minutes(SLOT_MINUTES))
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// How unpleasant the ride is in `level` gear, in `[0, 1]`
pub fn compute_discomfort(sample: &weather::WeatherSample, level: GearLevel) -> f64 {
    let temperature_penalty = (sample.temperature_2m - level.ideal_temperature()).abs() / 20.0;
    let rain_penalty = (sample.precipitation / 1.5).min(1.0);
    let wind_penalty = ((sample.wind_speed_10m - 15.0) / 25.0).max(0.0);
    (temperature_penalty + rain_penalty + wind_penalty).min(1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub departure: DateTime<Tz>,
    pub risk: f64,
    pub discomfort: f64,
    pub refused: bool,
}

impl Candidate {
    pub fn score(&self) -> f64 {
        self.risk + self.discomfort
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GearOption {
    pub level: GearLevel,
    pub candidates: Vec<Candidate>,
    pub best: Candidate,
}

/// Lowest combined score wins; among candidates within `tolerance` of it the
/// morning ride prefers the latest departure and the evening ride the
/// earliest.
pub fn select_best(mode: RideMode, candidates: &[Candidate], tolerance: f64) -> Option<Candidate> {
    let best_score = candidates
        .iter()
        .map(|c| round3(c.score()))
        .min_by(|a, b| a.total_cmp(b))?;

    let close = candidates
        .iter()
        .filter(|c| (round3(c.score()) - best_score).abs() <= tolerance);

    let chosen = match mode {
        RideMode::Morning => close.max_by_key(|c| c.departure),
        RideMode::Evening => close.min_by_key(|c| c.departure),
    };
    chosen.cloned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub level: GearLevel,
    pub morning: Candidate,
    pub evening: Candidate,
    pub total_risk: f64,
    pub total_discomfort: f64,
    pub refused: bool,
}

/// Best morning/evening pair that shares a gear level
pub fn combine_same_gear(morning: &[GearOption], evening: &[GearOption]) -> Option<RoundTrip> {
    morning
        .iter()
        .filter_map(|m| {
            let e = evening.iter().find(|e| e.level == m.level)?;
            Some(RoundTrip {
                level: m.level,
                morning: m.best.clone(),
                evening: e.best.clone(),
                total_risk: m.best.risk + e.best.risk,
                total_discomfort: m.best.discomfort + e.best.discomfort,
                refused: m.best.refused || e.best.refused,
            })
        })
        .min_by(|a, b| {
            round3(a.total_risk + a.total_discomfort)
                .total_cmp(&round3(b.total_risk + b.total_discomfort))
        })
}

/// Forecast and scored options for one ride
#[derive(Debug, Clone)]
pub struct RideForecast {
    pub mode: RideMode,
    pub route: Vec<Waypoint>,
    pub forecast: Forecast,
    pub options: Vec<GearOption>,
}

impl RideForecast {
    /// Option for `gear`, or the one whose best candidate scores lowest
    pub fn option(&self, gear: Option<GearLevel>) -> Option<&GearOption> {
        match gear {
            Some(level) => self.options.iter().find(|o| o.level == level),
            None => self
                .options
                .iter()
                .min_by(|a, b| a.best.score().total_cmp(&b.best.score())),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub struct RideWeatherAdvisor<'a> {
    config: AdvisorConfig,
    provider: &'a dyn ForecastProvider,
    notifications: &'a NotificationManager,
    now: DateTime<Tz>,
}

impl<'a> RideWeatherAdvisor<'a> {
    pub fn new(
        config: AdvisorConfig,
        provider: &'a dyn ForecastProvider,
        notifications: &'a NotificationManager,
        now: DateTime<Tz>,
    ) -> Self {
        Self {
            config,
            provider,
            notifications,
            now,
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    fn forecast_date(&self) -> String {
        self.now.format("%A %d %B %Y").to_string()
    }

    async fn notify(&self, notification: Notification) {
        let kind = notification.kind;
        if let Err(e) = self.notifications.send(notification).await {
            error!("Failed to send {:?} notification: {}", kind, e);
        }
    }

    /// Fetch the forecast for `mode` and score its departures. A failed fetch
    /// is reported to Discord and yields `None`.
    pub async fn run_forecast(&self, mode: RideMode) -> Option<RideForecast> {
        let route = mode.route();
        let forecast = match self
            .provider
            .fetch_forecast(&route, self.now.date_naive())
            .await
        {
            Ok(forecast) => forecast,
            Err(e) => {
                error!("Forecast for {:?} ride failed: {}", mode, e);
                self.notify(
                    Notification::new(NotificationKind::WeatherApiError)
                        .with_field("Error", e.to_string()),
                )
                .await;
                return None;
            }
        };

        let slots = self.config.departure_slots(mode, &self.now);
        let options = self.config.evaluate(mode, &forecast, &route, &slots);
        info!(
            "{:?} ride: {} slot(s), {} gear option(s)",
            mode,
            slots.len(),
            options.len()
        );

        Some(RideForecast {
            mode,
            route,
            forecast,
            options,
        })
    }

    pub fn round_trip_notification(&self, round_trip: &RoundTrip) -> Notification {
        if round_trip.refused {
            return Notification::new(NotificationKind::NoRoundTripDeparture);
        }

        let date = self.forecast_date();
        let title = format!("🏍️ Round-trip Forecast — {}", date);
        let description = format!(
            "Here is the round-trip weather forecast for **{}**.\n\
             Recommended gear: **{}**.\n\n\
             **Departure at {}** — Risk: {:.2}, Discomfort: {:.2}\n\
             **Return at {}** — Risk: {:.2}, Discomfort: {:.2}",
            date,
            round_trip.level.description(),
            round_trip.morning.departure.format("%H:%M"),
            round_trip.morning.risk,
            round_trip.morning.discomfort,
            round_trip.evening.departure.format("%H:%M"),
            round_trip.evening.risk,
            round_trip.evening.discomfort,
        );

        Notification::new(NotificationKind::RoundTripDeparture)
            .with_title(title)
            .with_description(description)
    }

    /// Detailed per-slot report for one ride
    pub fn ride_notification(&self, ride: &RideForecast, gear: Option<GearLevel>) -> Notification {
        let Some(option) = ride.option(gear) else {
            return Notification::new(NotificationKind::NoClearDepartureFound);
        };

        let fields = option.candidates.iter().map(|candidate| {
            let departure = candidate.departure;
            let arrival = departure + self.config.trip_duration;
            let prefix = if candidate.departure == option.best.departure && !candidate.refused {
                "🟢 "
            } else if candidate.refused {
                "🔴 "
            } else {
                "🟡 "
            };

            let lines: Vec<String> = ride
                .route
                .iter()
                .enumerate()
                .filter_map(|(index, waypoint)| {
                    let at = departure + Duration::minutes(SLOT_MINUTES * index as i64);
                    let sample = ride.forecast.sample(&waypoint.name, &at)?;
                    let wind_note = match waypoint.favourable_wind {
                        Some(range) if range.contains(sample.wind_direction_10m) => " ✅",
                        Some(_) => " ❌",
                        None => "",
                    };
                    Some(format!("{}{}", sample.summary(&waypoint.name), wind_note))
                })
                .collect();

            (
                format!(
                    "{}{} → {} (risk={:.2}, discomfort={:.2})",
                    prefix,
                    departure.format("%H:%M"),
                    arrival.format("%H:%M"),
                    candidate.risk,
                    candidate.discomfort
                ),
                lines.join("\n"),
            )
        });

        let worst_code = ride
            .route
            .iter()
            .enumerate()
            .filter_map(|(index, waypoint)| {
                let at = option.best.departure + Duration::minutes(SLOT_MINUTES * index as i64);
                ride.forecast.sample(&waypoint.name, &at)
            })
            .map(|sample| sample.weather_code)
            .max()
            .unwrap_or(0);
        let info = describe(worst_code, self.config.language);

        let date = self.forecast_date();
        Notification::new(NotificationKind::BestDeparture)
            .with_title(format!("{} {} Forecast — {}", info.emoji, ride.mode.label(), date))
            .with_description(format!(
                "Here is the detailed weather analysis to help you choose the best time to ride on **{}**.\n\
                 Recommended time assumes you're wearing **{}**.\n\
                 The most significant condition expected during the ride: **{}**.",
                date,
                option.level.description(),
                capitalize(info.description)
            ))
            .with_fields(fields.collect::<Vec<_>>())
    }

    /// Forecast both rides and post the round-trip summary and details
    pub async fn run_and_notify_day(&self) {
        let morning = self.run_forecast(RideMode::Morning).await;
        let evening = self.run_forecast(RideMode::Evening).await;

        let round_trip = match (&morning, &evening) {
            (Some(m), Some(e)) => combine_same_gear(&m.options, &e.options),
            _ => None,
        };

        let gear = match &round_trip {
            Some(round_trip) => {
                info!(
                    "Round trip with {}: {} / {}",
                    round_trip.level.description(),
                    round_trip.morning.departure.format("%H:%M"),
                    round_trip.evening.departure.format("%H:%M")
                );
                self.notify(self.round_trip_notification(round_trip)).await;
                Some(round_trip.level)
            }
            None => None,
        };

        for ride in [morning, evening].iter().flatten() {
            self.notify(self.ride_notification(ride, gear)).await;
        }
    }
}
