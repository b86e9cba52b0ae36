use super::{CalendarError, CreatedEvent, EventInput, EventResource, ZoneDefaults};
use crate::config::CalendarConfig;
use reqwest::StatusCode;

/// Client for the provider's event-creation endpoint
#[derive(Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    api_base: String,
    calendar_id: String,
    zone_defaults: ZoneDefaults,
}

impl CalendarClient {
    pub fn new(http: reqwest::Client, config: &CalendarConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            zone_defaults: ZoneDefaults {
                utc_offset: config.default_utc_offset.clone(),
                time_zone: config.default_time_zone.clone(),
            },
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&self.calendar_id)
        )
    }

    /// Validate `input`, build the event resource and submit it.
    ///
    /// Returns the provider-assigned event id.
    pub async fn create_event(&self, access_token: &str, input: &EventInput) -> Result<String, CalendarError> {
        let resource = input.to_resource(&self.zone_defaults)?;
        self.submit(access_token, &resource).await
    }

    /// Submit an already-built event resource.
    pub async fn submit(&self, access_token: &str, resource: &EventResource) -> Result<String, CalendarError> {
        tracing::debug!(
            calendar_id = %self.calendar_id,
            start = %resource.start.date_time,
            "Creating calendar event"
        );

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(resource)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("Calendar provider rejected access token");
            return Err(CalendarError::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(status = %status, "Calendar provider returned error");
            return Err(CalendarError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedEvent = response.json().await?;
        tracing::info!(event_id = %created.id, "Calendar event created");
        Ok(created.id)
    }
}
