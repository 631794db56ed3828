use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::errors::CoreError;
use crate::models::settings::MarketHoursConfig;

/// Regular trading session of the quoted exchange, evaluated in its own time zone.
#[derive(Debug, Clone)]
pub struct MarketHours {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    weekdays_only: bool,
}

impl MarketHours {
    pub fn new(config: &MarketHoursConfig) -> Result<Self, CoreError> {
        let open = config.open_clock()?;
        let close = config.close_clock()?;
        if open >= close {
            return Err(CoreError::Config(format!(
                "Market open ({open}) must be before close ({close})"
            )));
        }
        Ok(Self {
            tz: config.tz()?,
            open,
            close,
            weekdays_only: config.weekdays_only,
        })
    }

    /// Whether `at` falls inside the session (open inclusive, close exclusive).
    #[must_use]
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);

        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let time = local.time();
        time >= self.open && time < self.close
    }
}
