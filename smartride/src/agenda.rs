//! Class agenda lookup from an iCalendar feed.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AgendaError {
    #[error("Failed to fetch ICS: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Failed to fetch ICS: server returned {status}")]
    Status { status: u16 },

    #[error("Invalid {property} value '{value}'")]
    InvalidDate { property: String, value: String },
}

pub type AgendaResult<T> = Result<T, AgendaError>;

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: Option<String>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub cancelled: bool,
}

/// A content line split into name, parameters and value
struct Property<'a> {
    name: String,
    params: Vec<(String, &'a str)>,
    value: &'a str,
}

impl<'a> Property<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let colon = line.find(':')?;
        let (head, value) = (&line[..colon], &line[colon + 1..]);
        let mut parts = head.split(';');
        let name = parts.next()?.trim().to_ascii_uppercase();
        let params = parts
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                Some((key.trim().to_ascii_uppercase(), value.trim_matches('"')))
            })
            .collect();
        Some(Self {
            name,
            params,
            value: value.trim(),
        })
    }

    fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }
}

/// Join folded lines (RFC 5545 section 3.1)
fn unfold(raw: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(continuation) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(continuation);
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

fn localize(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

/// Parse a DATE or DATE-TIME value. Floating times and dates are taken in
/// `default_tz`; `TZID` overrides it when it names a known zone.
fn parse_date_value(property: &Property<'_>, default_tz: &Tz) -> AgendaResult<DateTime<Tz>> {
    let invalid = || AgendaError::InvalidDate {
        property: property.name.clone(),
        value: property.value.to_string(),
    };
    let value = property.value;

    if property.param("VALUE") == Some("DATE") || value.len() == 8 {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| invalid())?;
        return localize(date.and_time(NaiveTime::MIN), default_tz).ok_or_else(invalid);
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
        return Ok(Utc.from_utc_datetime(&naive).with_timezone(default_tz));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    let tz = property
        .param("TZID")
        .and_then(|tzid| tzid.parse::<Tz>().ok())
        .unwrap_or(*default_tz);
    localize(naive, &tz)
        .map(|dt| dt.with_timezone(default_tz))
        .ok_or_else(invalid)
}

/// Extract every VEVENT, expressed in `tz`. Events without a start are
/// ignored; a missing end means the event ends when it starts.
pub fn parse_events(ics: &str, tz: &Tz) -> AgendaResult<Vec<CalendarEvent>> {
    let mut events = Vec::new();
    let mut in_event = false;
    let mut start = None;
    let mut end = None;
    let mut summary = None;
    let mut cancelled = false;

    for line in unfold(ics) {
        let Some(property) = Property::parse(&line) else {
            continue;
        };

        match (property.name.as_str(), in_event) {
            ("BEGIN", _) if property.value.eq_ignore_ascii_case("VEVENT") => {
                in_event = true;
                start = None;
                end = None;
                summary = None;
                cancelled = false;
            }
            ("END", true) if property.value.eq_ignore_ascii_case("VEVENT") => {
                in_event = false;
                if let Some(start) = start.take() {
                    events.push(CalendarEvent {
                        summary: summary.take(),
                        start,
                        end: end.take().unwrap_or(start),
                        cancelled,
                    });
                }
            }
            ("DTSTART", true) => start = Some(parse_date_value(&property, tz)?),
            ("DTEND", true) => end = Some(parse_date_value(&property, tz)?),
            ("SUMMARY", true) => summary = Some(property.value.to_string()),
            ("STATUS", true) => cancelled = property.value.eq_ignore_ascii_case("CANCELLED"),
            _ => {}
        }
    }

    Ok(events)
}

/// Start of the first and end of the last non-cancelled event overlapping
/// `date`, both clipped to that day.
pub fn first_and_last_class(
    events: &[CalendarEvent],
    date: NaiveDate,
    tz: &Tz,
) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let day_start = localize(date.and_time(NaiveTime::MIN), tz)?;
    let day_end = localize(date.and_hms_micro_opt(23, 59, 59, 999_999)?, tz)?;

    let overlapping = events
        .iter()
        .filter(|event| !event.cancelled)
        .filter(|event| event.start <= day_end && event.end >= day_start);

    let mut first: Option<DateTime<Tz>> = None;
    let mut last: Option<DateTime<Tz>> = None;
    for event in overlapping {
        let start = event.start.max(day_start);
        let end = event.end.min(day_end);
        first = Some(first.map_or(start, |current| current.min(start)));
        last = Some(last.map_or(end, |current| current.max(end)));
    }

    first.zip(last)
}

/// Fetches the agenda feed over HTTP
pub struct AgendaClient {
    http_client: reqwest::Client,
    url: String,
    timezone: Tz,
}

impl AgendaClient {
    pub fn new(url: impl Into<String>, timezone: Tz, user_agent: Option<&str>) -> AgendaResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent.to_string());
        }

        Ok(Self {
            http_client: builder.build()?,
            url: url.into(),
            timezone,
        })
    }

    pub async fn fetch_events(&self) -> AgendaResult<Vec<CalendarEvent>> {
        debug!("Fetching agenda from {}", self.url);
        let response = self.http_client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgendaError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let events = parse_events(&body, &self.timezone)?;
        info!("Agenda contains {} events", events.len());
        Ok(events)
    }

    pub async fn first_and_last_class(
        &self,
        date: NaiveDate,
    ) -> AgendaResult<Option<(DateTime<Tz>, DateTime<Tz>)>> {
        let events = self.fetch_events().await?;
        Ok(first_and_last_class(&events, date, &self.timezone))
    }
}
