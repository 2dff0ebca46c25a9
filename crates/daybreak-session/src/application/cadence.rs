//! When a session's episodes start.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// How often a session starts an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Once a day at a fixed UTC time.
    Daily {
        /// Start time of day (UTC).
        at: NaiveTime,
    },
    /// At a fixed interval; used for compressed simulation runs.
    Every(#[serde(with = "secs")] Duration),
}

impl Default for Cadence {
    fn default() -> Self {
        Self::Daily {
            at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
        }
    }
}

impl Cadence {
    /// Time from `now` until the next trigger.
    #[must_use]
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Every(interval) => *interval,
            Self::Daily { at } => {
                let today = now.date_naive().and_time(*at).and_utc();
                let next = if today > now {
                    today
                } else {
                    today + chrono::Duration::days(1)
                };
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }

    /// Whether the cadence can drive a timer.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Every(interval) => !interval.is_zero(),
            Self::Daily { .. } => true,
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
