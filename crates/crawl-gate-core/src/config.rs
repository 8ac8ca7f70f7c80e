use std::time::Duration;

use crate::error::AppError;

/// Default upper bound applied to delays declared by robots.txt.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default product token for robots.txt matching and the HTTP User-Agent.
pub const DEFAULT_USER_AGENT: &str = "crawl-gate";

/// Configuration for how a crawl-delay is chosen for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Explicit delay that takes precedence over robots.txt.
    pub delay: Option<Duration>,
    /// Cap applied to robots.txt `Crawl-delay` values.
    pub max_delay: Duration,
    pub user_agent: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            delay: None,
            max_delay: DEFAULT_MAX_DELAY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl GateConfig {
    /// Read configuration from environment variables.
    ///
    /// - `CRAWL_DELAY_SECS` (optional, overrides robots.txt)
    /// - `CRAWL_DELAY_MAX_SECS` (optional, defaults to 60)
    /// - `CRAWL_USER_AGENT` (optional, defaults to `crawl-gate`)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let delay = match lookup("CRAWL_DELAY_SECS") {
            None => None,
            Some(raw) => Some(parse_delay_secs(&raw).map_err(|e| {
                AppError::ConfigError(format!("Invalid CRAWL_DELAY_SECS: {e}"))
            })?),
        };

        let max_delay = match lookup("CRAWL_DELAY_MAX_SECS") {
            None => DEFAULT_MAX_DELAY,
            Some(raw) => parse_delay_secs(&raw).map_err(|e| {
                AppError::ConfigError(format!("Invalid CRAWL_DELAY_MAX_SECS: {e}"))
            })?,
        };

        let user_agent = match lookup("CRAWL_USER_AGENT") {
            None => DEFAULT_USER_AGENT.to_string(),
            Some(raw) if raw.trim().is_empty() => {
                return Err(AppError::ConfigError(
                    "CRAWL_USER_AGENT must not be empty".into(),
                ));
            }
            Some(raw) => raw.trim().to_string(),
        };

        Ok(Self {
            delay,
            max_delay,
            user_agent,
        })
    }

    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Resolve the delay to use for a target.
    ///
    /// The explicit delay wins; otherwise the robots.txt value, capped at
    /// `max_delay`; otherwise no delay.
    pub fn effective_delay(&self, declared: Option<Duration>) -> Option<Duration> {
        self.delay.or_else(|| declared.map(|d| d.min(self.max_delay)))
    }
}

/// Parse a delay given in (possibly fractional) seconds.
///
/// Zero is accepted. Negative, non-finite, and non-numeric values are
/// rejected.
pub fn parse_delay_secs(raw: &str) -> Result<Duration, AppError> {
    let trimmed = raw.trim();
    let secs: f64 = trimmed
        .parse()
        .map_err(|_| AppError::ConfigError(format!("'{trimmed}' is not a number of seconds")))?;
    if secs.is_sign_negative() && secs != 0.0 {
        return Err(AppError::ConfigError(format!(
            "'{trimmed}' is negative; delays must be zero or more seconds"
        )));
    }
    Duration::try_from_secs_f64(secs.abs())
        .map_err(|_| AppError::ConfigError(format!("'{trimmed}' is not a representable delay")))
}
