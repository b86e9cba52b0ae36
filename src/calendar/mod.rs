//! Calendar event submission.
//!
//! Turns caller-supplied event fields into the provider's event resource and
//! posts it with a bearer token. Times are wall-clock values; the only zone
//! information is the explicit offset and/or IANA zone carried by the input
//! or the configured defaults.

mod client;

pub use client::CalendarClient;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;


/// Summary used when the caller gives no title
pub const DEFAULT_SUMMARY: &str = "Event";

/// Calendar submission errors
#[derive(Debug, Error)]
pub enum CalendarError {
    /// Missing or malformed event fields; nothing was sent
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Provider rejected the access token (HTTP 401)
    #[error("calendar provider rejected the access token")]
    Unauthorized,

    /// Any other non-2xx response
    #[error("calendar provider returned {status}: {body}")]
    ProviderError { status: u16, body: String },

    /// Network failure, timeout, or unreadable response
    #[error("calendar request failed: {0}")]
    TransportError(#[from] reqwest::Error),
}

/// Event fields as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventInput {
    pub title: Option<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    pub description: Option<String>,
    pub color_id: Option<String>,
    /// Appended verbatim to both datetimes, e.g. `-04:00` or `Z`
    pub utc_offset: Option<String>,
    /// IANA zone name sent alongside both datetimes
    pub time_zone: Option<String>,
}

/// Zone settings applied when the caller names neither an offset nor a zone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneDefaults {
    pub utc_offset: Option<String>,
    pub time_zone: Option<String>,
}

/// Provider event resource (the subset this relay writes)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventResource {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// The part of the provider's create response we read
#[derive(Debug, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
}

impl EventInput {
    /// Check required fields and formats without building anything.
    pub fn validate(&self) -> Result<(), CalendarError> {
        require("date", &self.date)?;
        require("start", &self.start_time)?;
        require("end", &self.end_time)?;

        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|_| {
            CalendarError::InvalidInput(format!("date '{}' is not YYYY-MM-DD", self.date))
        })?;
        parse_time("start", &self.start_time)?;
        parse_time("end", &self.end_time)?;

        if let Some(offset) = non_empty(&self.utc_offset) {
            validate_offset(offset)?;
        }
        Ok(())
    }

    /// Build the provider resource, applying `defaults` only when the input
    /// carries no zone information of its own.
    pub fn to_resource(&self, defaults: &ZoneDefaults) -> Result<EventResource, CalendarError> {
        self.validate()?;

        let (utc_offset, time_zone) =
            if non_empty(&self.utc_offset).is_none() && non_empty(&self.time_zone).is_none() {
                (non_empty(&defaults.utc_offset), non_empty(&defaults.time_zone))
            } else {
                (non_empty(&self.utc_offset), non_empty(&self.time_zone))
            };

        let at = |time: &str| EventDateTime {
            date_time: format!("{}T{}:00{}", self.date, time, utc_offset.unwrap_or("")),
            time_zone: time_zone.map(str::to_string),
        };

        Ok(EventResource {
            summary: non_empty(&self.title).unwrap_or(DEFAULT_SUMMARY).to_string(),
            description: self.description.clone().unwrap_or_default(),
            start: at(&self.start_time),
            end: at(&self.end_time),
            color_id: non_empty(&self.color_id).map(str::to_string),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn require(field: &str, value: &str) -> Result<(), CalendarError> {
    if value.trim().is_empty() {
        return Err(CalendarError::InvalidInput(format!("missing {}", field)));
    }
    Ok(())
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, CalendarError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| CalendarError::InvalidInput(format!("{} '{}' is not HH:MM", field, value)))
}

// "Z" or ±HH:MM
pub(crate) fn validate_offset(offset: &str) -> Result<(), CalendarError> {
    if offset == "Z" {
        return Ok(());
    }
    let invalid = || CalendarError::InvalidInput(format!("utc offset '{}' is not ±HH:MM or Z", offset));
    let rest = offset
        .strip_prefix('+')
        .or_else(|| offset.strip_prefix('-'))
        .ok_or_else(invalid)?;
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let two_digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return Err(invalid());
    }
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    Ok(())
}
