//! Kitchen scheduling configuration.
//!
//! Invalid configuration is fatal at load time; nothing downstream
//! re-validates at request time.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SlotWindow;

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "KITCHEN_SLOTS_CONFIG";

/// Prefix for scalar overrides read by [`KitchenConfig::from_env`].
pub const ENV_PREFIX: &str = "KITCHEN_SLOTS_";

/// Upper bound for every retention setting (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

/// Upper bound for slot length, prep buffer and visibility lead, in minutes.
pub const MAX_WINDOW_MINS: u32 = 24 * 60;

/// Daily opening window, expressed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    /// First instant orders may be scheduled into.
    #[serde(with = "hhmm")]
    pub opens_at: NaiveTime,
    /// Slots must end at or before this time.
    #[serde(with = "hhmm")]
    pub closes_at: NaiveTime,
}

impl BusinessHours {
    /// Opening instant on `day`.
    pub fn open_on(&self, day: NaiveDate) -> DateTime<Utc> {
        day.and_time(self.opens_at).and_utc()
    }

    /// Closing instant on `day`.
    pub fn close_on(&self, day: NaiveDate) -> DateTime<Utc> {
        day.and_time(self.closes_at).and_utc()
    }

    /// Whether the whole slot lies inside business hours of `trading_day`.
    pub fn admits(&self, window: &SlotWindow, trading_day: NaiveDate) -> bool {
        window.start >= self.open_on(trading_day) && window.end <= self.close_on(trading_day)
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
            closes_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
        }
    }
}

/// Root configuration for slot scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitchenConfig {
    /// Slot width in minutes.
    pub slot_duration_mins: u32,
    /// Minimum time left before a slot ends for it to be offered.
    pub prep_buffer_mins: u32,
    /// How long before its slot an order becomes visible to production.
    pub visibility_lead_mins: u32,
    /// Business hours in UTC.
    #[serde(flatten)]
    pub hours: BusinessHours,
    /// Max capacity seeded into the store when it holds none.
    pub default_max_capacity: i64,
    /// Hard cap on slots examined per admission.
    pub max_attempts: u32,
    /// Retries of the same slot after a transient store failure.
    pub store_retry_attempts: u32,
    /// Base backoff between store retries.
    pub retry_base_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    pub retry_max_jitter_ms: u64,
    /// Slots abandoned because of store failures before admission gives up.
    pub store_failure_budget: u32,
    /// I/O timeout applied to every store call.
    pub store_timeout_ms: u64,
    /// Retention of slot loads, membership and reverse associations.
    pub state_ttl_secs: u64,
    /// Retention of a slot's disabled flag.
    pub disabled_ttl_secs: u64,
    /// Interval of the background visibility promoter.
    pub promote_interval_ms: u64,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            slot_duration_mins: 15,
            prep_buffer_mins: 8,
            visibility_lead_mins: 30,
            hours: BusinessHours::default(),
            default_max_capacity: 10_000,
            max_attempts: 100,
            store_retry_attempts: 3,
            retry_base_delay_ms: 25,
            retry_max_jitter_ms: 25,
            store_failure_budget: 3,
            store_timeout_ms: 2_000,
            state_ttl_secs: 7_200,
            disabled_ttl_secs: 86_400,
            promote_interval_ms: 1_000,
        }
    }
}

impl KitchenConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.slot_duration_mins == 0 {
            return Err("slot_duration_mins must be greater than 0".into());
        }
        let windows = [
            ("slot_duration_mins", self.slot_duration_mins),
            ("prep_buffer_mins", self.prep_buffer_mins),
            ("visibility_lead_mins", self.visibility_lead_mins),
        ];
        for (name, value) in windows {
            if value > MAX_WINDOW_MINS {
                return Err(format!("{name} must not exceed {MAX_WINDOW_MINS} minutes"));
            }
        }
        if self.default_max_capacity <= 0 {
            return Err("default_max_capacity must be greater than 0".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.store_timeout_ms == 0 {
            return Err("store_timeout_ms must be greater than 0".into());
        }
        if self.state_ttl_secs == 0 {
            return Err("state_ttl_secs must be greater than 0".into());
        }
        if self.disabled_ttl_secs == 0 {
            return Err("disabled_ttl_secs must be greater than 0".into());
        }
        if self.state_ttl_secs > MAX_TTL_SECS || self.disabled_ttl_secs > MAX_TTL_SECS {
            return Err(format!("retention must not exceed {MAX_TTL_SECS} seconds"));
        }
        if self.promote_interval_ms == 0 {
            return Err("promote_interval_ms must be greater than 0".into());
        }
        if self.hours.closes_at <= self.hours.opens_at {
            return Err(format!(
                "closes_at ({}) must be later than opens_at ({})",
                self.hours.closes_at.format("%H:%M"),
                self.hours.opens_at.format("%H:%M")
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment.
    ///
    /// Reads `.env` if present, then the JSON file named by
    /// [`CONFIG_PATH_ENV`] (defaults when unset), then applies
    /// `KITCHEN_SLOTS_*` scalar overrides, then validates.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read `{path}`: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error in `{path}`: {e}"))?
            }
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `KITCHEN_SLOTS_<FIELD>` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_num(&get("SLOT_DURATION_MINS"), "SLOT_DURATION_MINS", &mut self.slot_duration_mins)?;
        override_num(&get("PREP_BUFFER_MINS"), "PREP_BUFFER_MINS", &mut self.prep_buffer_mins)?;
        override_num(
            &get("VISIBILITY_LEAD_MINS"),
            "VISIBILITY_LEAD_MINS",
            &mut self.visibility_lead_mins,
        )?;
        override_num(&get("MAX_CAPACITY"), "MAX_CAPACITY", &mut self.default_max_capacity)?;
        override_num(&get("MAX_ATTEMPTS"), "MAX_ATTEMPTS", &mut self.max_attempts)?;
        override_num(&get("STORE_TIMEOUT_MS"), "STORE_TIMEOUT_MS", &mut self.store_timeout_ms)?;
        override_num(&get("STATE_TTL_SECS"), "STATE_TTL_SECS", &mut self.state_ttl_secs)?;

        if let Some(raw) = get("OPENS_AT") {
            self.hours.opens_at = hhmm::parse(&raw)?;
        }
        if let Some(raw) = get("CLOSES_AT") {
            self.hours.closes_at = hhmm::parse(&raw)?;
        }
        Ok(())
    }

    /// Slot width.
    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_duration_mins))
    }

    /// Minimum preparation buffer.
    pub fn prep_buffer(&self) -> Duration {
        Duration::minutes(i64::from(self.prep_buffer_mins))
    }

    /// Pre-visibility lead time.
    pub fn visibility_lead(&self) -> Duration {
        Duration::minutes(i64::from(self.visibility_lead_mins))
    }

    /// Retention of cached slot state.
    pub fn state_ttl(&self) -> Duration {
        seconds(self.state_ttl_secs)
    }

    /// Retention of a disabled flag.
    pub fn disabled_ttl(&self) -> Duration {
        seconds(self.disabled_ttl_secs)
    }

    /// Store I/O timeout.
    pub const fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }

    /// Promoter tick interval.
    pub const fn promote_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.promote_interval_ms)
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn override_num<T>(raw: &Option<String>, name: &str, target: &mut T) -> Result<(), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = raw {
        *target = value
            .trim()
            .parse()
            .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))?;
    }
    Ok(())
}

/// `"HH:MM"` (de)serialization for [`NaiveTime`].
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(raw.trim(), FORMAT)
            .map_err(|e| format!("invalid time `{raw}` (expected HH:MM): {e}"))
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
