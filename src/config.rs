use std::env;

use crate::models::TimeOfDay;
use crate::services::guard::BookingPolicy;
use crate::services::slots;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Empty disables the bootstrap admin.
    pub admin_token: String,
    pub slot_duration_minutes: u16,
    /// 0 disables the look-ahead limit.
    pub max_advance_days: i64,
    pub lights_on_hour: u16,
    pub notify_webhook_url: Option<String>,
    pub notify_webhook_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "pitchbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_default(),
            slot_duration_minutes: env::var("SLOT_DURATION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            max_advance_days: env::var("MAX_ADVANCE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            lights_on_hour: env::var("LIGHTS_ON_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|h| *h <= 24)
                .unwrap_or(18),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            notify_webhook_secret: env::var("NOTIFY_WEBHOOK_SECRET").unwrap_or_default(),
        }
    }

    /// Rejects settings that would make every request fail later on.
    pub fn validate(&self) -> anyhow::Result<()> {
        slots::validate_slot_duration(self.slot_duration_minutes)
            .map_err(|e| anyhow::anyhow!("SLOT_DURATION_MINUTES: {}", e.user_message()))?;
        if self.max_advance_days < 0 {
            anyhow::bail!("MAX_ADVANCE_DAYS cannot be negative");
        }
        Ok(())
    }

    pub fn booking_policy(&self) -> BookingPolicy {
        BookingPolicy {
            max_advance_days: self.max_advance_days,
            lights_on: TimeOfDay::saturating(self.lights_on_hour * 60),
        }
    }
}
