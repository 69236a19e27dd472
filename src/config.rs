use chrono::{NaiveDate, Weekday};
use config::ConfigError;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SCORE_FEED_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard";

#[derive(Debug, Clone)]
pub struct Config {
    /// Unset runs the in-memory store (development only)
    pub database_url: Option<String>,
    pub bind_address: String,
    pub score_feed_url: String,
    pub feed_timeout_secs: u64,
    pub season: i32,
    /// Tuesday before week 1
    pub season_start_date: NaiveDate,
    pub regular_season_weeks: i32,
    pub scheduler_enabled: bool,
    pub settle_weekday: Weekday,
    pub settle_hour: u32,
    pub live_poll_interval_secs: u64,
    pub rate_limit_per_minute: u32,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            bind_address: var("BIND_ADDRESS", "0.0.0.0:8080"),
            score_feed_url: var("SCORE_FEED_URL", DEFAULT_SCORE_FEED_URL),
            feed_timeout_secs: parse("FEED_TIMEOUT_SECS", &var("FEED_TIMEOUT_SECS", "10"))?,
            season: parse("SEASON", &var("SEASON", "2026"))?,
            season_start_date: parse("SEASON_START_DATE", &var("SEASON_START_DATE", "2026-09-08"))?,
            regular_season_weeks: parse("REGULAR_SEASON_WEEKS", &var("REGULAR_SEASON_WEEKS", "18"))?,
            scheduler_enabled: parse("SCHEDULER_ENABLED", &var("SCHEDULER_ENABLED", "false"))?,
            settle_weekday: Weekday::from_str(&var("SETTLE_WEEKDAY", "tue"))
                .map_err(|_| ConfigError::Message("SETTLE_WEEKDAY must be a weekday name".to_string()))?,
            settle_hour: parse("SETTLE_HOUR", &var("SETTLE_HOUR", "10"))?,
            live_poll_interval_secs: parse("LIVE_POLL_INTERVAL_SECS", &var("LIVE_POLL_INTERVAL_SECS", "300"))?,
            rate_limit_per_minute: parse("RATE_LIMIT_PER_MINUTE", &var("RATE_LIMIT_PER_MINUTE", "60"))?,
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS", "")
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.settle_hour > 23 {
            return Err(ConfigError::Message("SETTLE_HOUR must be 0-23".to_string()));
        }
        if !(1..=25).contains(&self.regular_season_weeks) {
            return Err(ConfigError::Message("REGULAR_SEASON_WEEKS must be 1-25".to_string()));
        }
        if self.feed_timeout_secs == 0 || self.live_poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "FEED_TIMEOUT_SECS and LIVE_POLL_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_secs(self.live_poll_interval_secs)
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Message(format!("{} has an invalid value: {:?}", key, raw)))
}
