//! Restart policy and backoff

use super::config::BackoffConfig;
use super::state::CrashCause;
use crate::service::{RestartPolicy, ServiceDefinition};
use rand::Rng;
use std::time::Duration;

/// Whether a service with `policy` is restarted after `cause`
pub fn should_restart(policy: RestartPolicy, cause: &CrashCause) -> bool {
    match policy {
        RestartPolicy::Never => false,
        RestartPolicy::Always => true,
        RestartPolicy::OnFailure => cause.is_failure(),
    }
}

/// Exponential backoff for one service
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    max_retries: u32,
    jitter: f64,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            initial: config.initial,
            max: config.max,
            factor: config.factor.max(1.0),
            max_retries: config.max_retries,
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// Backoff for a service, applying its overrides
    pub fn for_service(config: &BackoffConfig, service: &ServiceDefinition) -> Self {
        let mut backoff = Self::new(config);
        if let Some(delay) = service.restart_delay {
            backoff.initial = delay;
        }
        if let Some(max_retries) = service.max_restarts {
            backoff.max_retries = max_retries;
        }
        backoff
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.factor.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        let spread = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * spread).min(self.max.as_secs_f64()))
    }

    /// Whether `attempts` consecutive failures exhaust the retry budget
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts > self.max_retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
