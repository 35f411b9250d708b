//! Supervisor tunables

use std::time::Duration;

/// Exponential restart backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first restart
    pub initial: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Growth factor per consecutive failure
    pub factor: f64,
    /// Consecutive failed starts allowed before giving up
    pub max_retries: u32,
    /// Random spread applied to each delay, as a fraction (0.1 = ±10%)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            max_retries: 5,
            jitter: 0.1,
        }
    }
}

/// Supervisor configuration
///
/// Per-service values in a
/// [`ServiceDefinition`](crate::service::ServiceDefinition) take precedence.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time a service gets to report healthy after launch
    pub start_timeout: Duration,
    /// Time the whole deployment gets
    pub deploy_timeout: Duration,
    /// Time a service gets to stop before it is killed
    pub stop_grace_period: Duration,
    /// Interval between health probes
    pub health_interval: Duration,
    /// Consecutive failed probes before a running service counts as crashed
    pub health_retries: u32,
    /// Services allowed to start at the same time
    pub max_concurrent_starts: usize,
    /// Restart backoff
    pub backoff: BackoffConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(60),
            deploy_timeout: Duration::from_secs(300),
            stop_grace_period: Duration::from_secs(10),
            health_interval: Duration::from_secs(1),
            health_retries: 3,
            max_concurrent_starts: num_cpus::get(),
            backoff: BackoffConfig::default(),
        }
    }
}
