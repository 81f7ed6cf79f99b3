//! Gateway configuration: endpoint classes, circuit and rate parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logical class of a marketplace endpoint.
///
/// Circuit parameters differ per class: a flaky metrics endpoint should
/// not open the same circuit that protects mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// Read lookups (questions, items, profiles).
    Read,
    /// State-changing calls (answers, listing updates).
    Mutation,
    /// Reporting and metrics reads.
    Metrics,
}

impl EndpointClass {
    /// Stable string form, used in scope keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Mutation => "mutation",
            Self::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-declared priority for a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Admitted over the window ceiling up to the overdraft allowance;
    /// waits when even that is exhausted.
    High,
    /// Waits (bounded) for the next window when the ceiling is met.
    #[default]
    Normal,
    /// Fails fast with `RateLimited` when the ceiling is met.
    Low,
}

/// Circuit breaker parameters for one endpoint class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe.
    pub reset_timeout_secs: i64,
    /// Consecutive half-open probe successes required to close.
    pub close_threshold: u32,
}

impl CircuitConfig {
    /// Defaults for read-class endpoints.
    #[must_use]
    pub fn read_defaults() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
            close_threshold: 1,
        }
    }

    /// Defaults for mutation-class endpoints: less failure tolerance,
    /// longer recovery, two probes to close.
    #[must_use]
    pub fn mutation_defaults() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 60,
            close_threshold: 2,
        }
    }

    /// Defaults for metrics-class endpoints: most tolerant.
    #[must_use]
    pub fn metrics_defaults() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout_secs: 30,
            close_threshold: 1,
        }
    }
}

/// Shared-window rate limit parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether admission control is enforced.
    pub enabled: bool,
    /// Window width in seconds.
    pub bucket_secs: i64,
    /// Calls admitted per tenant scope per window.
    pub tenant_ceiling: i64,
    /// Calls admitted across all tenants per window, when set.
    pub global_ceiling: Option<i64>,
    /// Extra slots above the ceiling available to `High` priority calls.
    pub high_priority_overdraft: i64,
    /// Longest a queued call waits for a window before failing.
    pub max_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket_secs: 60,
            tenant_ceiling: 60,
            global_ceiling: Some(600),
            high_priority_overdraft: 6,
            max_wait_secs: 120,
        }
    }
}

impl RateLimitConfig {
    /// Disable admission control (tests, local development).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Per-call retry parameters for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per gateway call.
    pub max_attempts: u32,
    /// Delay schedule between attempts, in seconds.
    pub backoff_secs: Vec<u64>,
    /// Timeout applied to each individual upstream call.
    pub call_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: vec![1, 5, 15],
            call_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Delay after the given 1-based failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).saturating_sub(1).min(
            self.backoff_secs.len().saturating_sub(1),
        );
        Duration::from_secs(self.backoff_secs.get(idx).copied().unwrap_or(15))
    }
}

/// Full gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub read_circuit: CircuitConfig,
    pub mutation_circuit: CircuitConfig,
    pub metrics_circuit: CircuitConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            read_circuit: CircuitConfig::read_defaults(),
            mutation_circuit: CircuitConfig::mutation_defaults(),
            metrics_circuit: CircuitConfig::metrics_defaults(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Circuit parameters for an endpoint class.
    #[must_use]
    pub fn circuit_for(&self, class: EndpointClass) -> &CircuitConfig {
        match class {
            EndpointClass::Read => &self.read_circuit,
            EndpointClass::Mutation => &self.mutation_circuit,
            EndpointClass::Metrics => &self.metrics_circuit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_class_strings() {
        assert_eq!(EndpointClass::Read.as_str(), "read");
        assert_eq!(EndpointClass::Mutation.as_str(), "mutation");
        assert_eq!(EndpointClass::Metrics.as_str(), "metrics");
    }

    #[test]
    fn test_class_defaults_differ() {
        let config = GatewayConfig::default();
        assert!(
            config.circuit_for(EndpointClass::Metrics).failure_threshold
                > config.circuit_for(EndpointClass::Mutation).failure_threshold
        );
        assert_eq!(config.circuit_for(EndpointClass::Mutation).close_threshold, 2);
    }

    #[test]
    fn test_retry_delay_schedule() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for(2), Duration::from_secs(5));
        assert_eq!(retry.delay_for(3), Duration::from_secs(15));
        // Past the schedule end, the last delay repeats.
        assert_eq!(retry.delay_for(9), Duration::from_secs(15));
    }

    #[test]
    fn test_default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
