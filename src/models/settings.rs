use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::provider::Channel;

/// Per-tenant notification preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub tenant_id: String,
    pub whatsapp_enabled: bool,
    pub sms_enabled: bool,
    pub primary_channel: Channel,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,

    /// IANA zone name used to evaluate quiet hours.
    pub timezone: String,

    /// Falls back to the deployment-wide threshold when unset.
    pub materiality_threshold: Option<f64>,
}

impl NotificationSettings {
    pub fn defaults_for(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            whatsapp_enabled: true,
            sms_enabled: true,
            primary_channel: Channel::WhatsApp,
            quiet_hours_start: None,
            quiet_hours_end: None,
            timezone: "UTC".to_string(),
            materiality_threshold: None,
        }
    }

    pub fn with_quiet_hours(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.quiet_hours_start = Some(start);
        self.quiet_hours_end = Some(end);
        self
    }

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::WhatsApp => self.whatsapp_enabled,
            Channel::Sms => self.sms_enabled,
        }
    }

    /// Primary first, then the other channel.
    pub fn channel_preference(&self) -> [Channel; 2] {
        [self.primary_channel, self.primary_channel.other()]
    }

    pub fn quiet_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        self.quiet_hours_start.zip(self.quiet_hours_end)
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                tenant_id = %self.tenant_id,
                timezone = %self.timezone,
                "Unknown timezone, evaluating quiet hours in UTC"
            );
            Tz::UTC
        })
    }
}
