//! Rate-limit detection for subagent loops

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::Duration;

use super::types::{SubagentConfig, MIN_RETRY_AFTER};

static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|rate limit|too many requests").expect("valid rate limit regex")
});

static RETRY_AFTER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry[-_ ]?after[:\s]+(\d+)").expect("valid retry-after regex")
});

/// A provider error that asked us to slow down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
    pub message: String,
    pub retry_after: Duration,
}

impl fmt::Display for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RateLimited {}

pub fn is_rate_limit_message(message: &str) -> bool {
    RATE_LIMIT_PATTERN.is_match(message)
}

/// Seconds named in the message, else the default, clamped to the allowed range
pub fn retry_after(message: &str, config: &SubagentConfig) -> Duration {
    let requested = RETRY_AFTER_PATTERN
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(config.default_retry_after);
    requested.clamp(MIN_RETRY_AFTER, config.max_retry_after.max(MIN_RETRY_AFTER))
}

/// Classify a stream error message
pub fn detect(message: &str, config: &SubagentConfig) -> Option<RateLimited> {
    is_rate_limit_message(message).then(|| RateLimited {
        message: message.to_string(),
        retry_after: retry_after(message, config),
    })
}
