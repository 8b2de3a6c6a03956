//! Bounded retry with exponential backoff for page requests.
//!
//! A page request moves through an explicit state machine:
//!
//! ```text
//! Idle -> Requesting -> Succeeded
//!             |  ^
//!             v  |
//!           Backoff          (transient failure, attempts left)
//!             |
//!             v
//!           Failed           (attempts exhausted, or the request was rejected)
//! ```
//!
//! [`FetchState::advance`] is the pure transition function; the client owns the
//! actual I/O and sleeping.

use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Timeouts, dropped connections, 5xx, 408 and 429.
    Transient,
    /// Any other 4xx: the same request would fail the same way.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration, attempt: u32 },
    DoNotRetry { reason: String },
}

/// Retry configuration.
///
/// Delay before retry `n` (1-indexed attempt that just failed) is
/// `min(base_delay * multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` includes the initial attempt and is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No waiting between attempts. Mostly useful against local mock servers.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn should_retry(&self, failure: FailureType, attempt: u32) -> RetryDecision {
        if failure == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempt),
            attempt: attempt + 1,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

pub fn classify_status(status: u16) -> FailureType {
    match status {
        408 | 429 => FailureType::Transient,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

pub fn classify_reqwest(error: &reqwest::Error) -> FailureType {
    if let Some(status) = error.status() {
        return classify_status(status.as_u16());
    }
    if error.is_builder() || error.is_redirect() {
        FailureType::Permanent
    } else {
        FailureType::Transient
    }
}

/// Result of one HTTP attempt, as seen by the state machine.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(String),
    Transient(String),
    Rejected { status: u16, body: String },
}

#[derive(Debug)]
pub enum FetchState {
    Idle,
    Requesting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration, reason: String },
    Succeeded(String),
    Failed(FetchError),
}

impl FetchState {
    /// Transition on an attempt outcome. Only meaningful in `Requesting`;
    /// other states ignore the outcome and step forward on their own.
    /// `Requesting` without an outcome fails, so every non-terminal state
    /// makes progress.
    pub fn advance(self, outcome: Option<AttemptOutcome>, policy: &RetryPolicy, url: &str) -> FetchState {
        match (self, outcome) {
            (FetchState::Idle, _) => FetchState::Requesting { attempt: 1 },
            (FetchState::Backoff { attempt, .. }, _) => FetchState::Requesting {
                attempt: attempt + 1,
            },
            (FetchState::Requesting { .. }, Some(AttemptOutcome::Success(body))) => {
                FetchState::Succeeded(body)
            }
            (FetchState::Requesting { .. }, Some(AttemptOutcome::Rejected { status, body })) => {
                FetchState::Failed(FetchError::Rejected {
                    url: url.to_string(),
                    status,
                    body,
                })
            }
            (FetchState::Requesting { attempt }, Some(AttemptOutcome::Transient(reason))) => {
                match policy.should_retry(FailureType::Transient, attempt) {
                    RetryDecision::Retry { delay, .. } => FetchState::Backoff {
                        attempt,
                        delay,
                        reason,
                    },
                    RetryDecision::DoNotRetry { .. } => FetchState::Failed(FetchError::Unavailable {
                        url: url.to_string(),
                        attempts: attempt,
                        reason,
                    }),
                }
            }
            (FetchState::Requesting { attempt }, None) => FetchState::Failed(FetchError::Unavailable {
                url: url.to_string(),
                attempts: attempt,
                reason: "request finished without an outcome".to_string(),
            }),
            (state @ (FetchState::Succeeded(_) | FetchState::Failed(_)), _) => state,
        }
    }
}
