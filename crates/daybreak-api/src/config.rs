//! Server configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use daybreak_episode::EpisodeConfig;
use daybreak_generation::{JobKind, RetryPolicy};
use daybreak_session::Cadence;
use daybreak_voting::{NoConsensusPolicy, VotingPolicy};

use crate::error::AppError;

/// How episodes are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// One episode per day at the configured start time.
    Scheduled,
    /// Short fixed-interval cycles for playtesting.
    Simulation,
    /// Episodes start only through the trigger endpoint.
    Manual,
}

impl FromStr for GameMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "simulation" => Ok(Self::Simulation),
            "manual" => Ok(Self::Manual),
            other => Err(AppError::Config(format!(
                "GAME_MODE must be scheduled, simulation or manual, got {other:?}"
            ))),
        }
    }
}

/// Everything the binary reads at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// `PostgreSQL` URL. Events stay in memory when absent.
    pub database_url: Option<String>,
    /// How episodes are started.
    pub mode: GameMode,
    /// Daily start time (UTC) in scheduled mode.
    pub daily_start: NaiveTime,
    /// Vote window in scheduled and manual modes.
    pub vote_window: Duration,
    /// Cycle length in simulation mode.
    pub simulation_cycle: Duration,
    /// Vote window in simulation mode.
    pub simulation_vote_window: Duration,
    /// Bound on each generation job.
    pub job_timeout: Duration,
    /// Generation retry policy.
    pub retry: RetryPolicy,
    /// Tally resolution policy.
    pub voting: VotingPolicy,
    /// OpenAI-compatible chat completions endpoint.
    pub llm_base_url: Option<String>,
    /// Media generation endpoint.
    pub media_service_url: Option<String>,
    /// Webhook receiving player notifications.
    pub notify_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            database_url: None,
            mode: GameMode::Scheduled,
            daily_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            vote_window: Duration::from_secs(12 * 60 * 60),
            simulation_cycle: Duration::from_secs(60),
            simulation_vote_window: Duration::from_secs(30),
            job_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
            voting: VotingPolicy::default(),
            llm_base_url: None,
            media_service_url: None,
            notify_webhook_url: None,
        }
    }
}

impl Config {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a variable is present but invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults for
    /// absent keys.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let daily_start = match non_empty("DAILY_START_TIME") {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| {
                AppError::Config(format!("DAILY_START_TIME must be HH:MM: {e}"))
            })?,
            None => defaults.daily_start,
        };

        let no_consensus = match non_empty("NO_CONSENSUS_POLICY").as_deref().map(str::trim) {
            None | Some("hold_course") => NoConsensusPolicy::HoldCourse,
            Some("first_choice") => NoConsensusPolicy::FirstChoice,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "NO_CONSENSUS_POLICY must be hold_course or first_choice, got {other:?}"
                )));
            }
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(&non_empty, "RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay: millis_or(&non_empty, "RETRY_BASE_DELAY_MS", defaults.retry.base_delay)?,
            ..defaults.retry
        };
        if retry.max_attempts == 0 {
            return Err(AppError::Config("RETRY_MAX_ATTEMPTS must be at least 1".to_owned()));
        }

        Ok(Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse_or(&non_empty, "PORT", defaults.port)?,
            database_url: non_empty("DATABASE_URL"),
            mode: parse_or(&non_empty, "GAME_MODE", defaults.mode)?,
            daily_start,
            vote_window: secs_or(&non_empty, "VOTE_WINDOW_SECS", defaults.vote_window)?,
            simulation_cycle: secs_or(&non_empty, "SIMULATION_CYCLE_SECS", defaults.simulation_cycle)?,
            simulation_vote_window: secs_or(
                &non_empty,
                "SIMULATION_VOTE_WINDOW_SECS",
                defaults.simulation_vote_window,
            )?,
            job_timeout: secs_or(&non_empty, "JOB_TIMEOUT_SECS", defaults.job_timeout)?,
            retry,
            voting: VotingPolicy {
                min_participation: parse_or(
                    &non_empty,
                    "MIN_PARTICIPATION",
                    defaults.voting.min_participation,
                )?,
                no_consensus,
            },
            llm_base_url: non_empty("LLM_BASE_URL"),
            media_service_url: non_empty("MEDIA_SERVICE_URL"),
            notify_webhook_url: non_empty("NOTIFY_WEBHOOK_URL"),
        })
    }

    /// The cadence new sessions are scheduled on, or `None` in manual mode.
    #[must_use]
    pub fn cadence(&self) -> Option<Cadence> {
        match self.mode {
            GameMode::Scheduled => Some(Cadence::Daily {
                at: self.daily_start,
            }),
            GameMode::Simulation => Some(Cadence::Every(self.simulation_cycle)),
            GameMode::Manual => None,
        }
    }

    /// Episode settings for the configured mode. Media is only requested
    /// when a media service is configured.
    #[must_use]
    pub fn episode_config(&self) -> EpisodeConfig {
        let vote_window = match self.mode {
            GameMode::Simulation => self.simulation_vote_window,
            GameMode::Scheduled | GameMode::Manual => self.vote_window,
        };
        let media_kinds = if self.media_service_url.is_some() {
            JobKind::MEDIA.to_vec()
        } else {
            Vec::new()
        };
        EpisodeConfig {
            vote_window,
            job_timeout: self.job_timeout,
            media_kinds,
            ..EpisodeConfig::default()
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, AppError> {
    let secs = parse_or(lookup, key, default.as_secs())?;
    if secs == 0 {
        return Err(AppError::Config(format!("{key} must be positive")));
    }
    Ok(Duration::from_secs(secs))
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, AppError> {
    let millis = parse_or(lookup, key, u64::try_from(default.as_millis()).unwrap_or(u64::MAX))?;
    Ok(Duration::from_millis(millis))
}
