//! Per-scope circuit breakers with write-through persistence.
//!
//! Breakers are keyed by `{scope}|{endpoint_class}` so one tenant's broken
//! mutation path does not block its reads. In-memory state drives local
//! decisions; every transition is written through to the shared store so
//! sibling processes pick up opens when they first touch the scope.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;

use vendra_db::models::{GatewayCircuitState, UpsertCircuitState};

use crate::config::{CircuitConfig, EndpointClass, GatewayConfig};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    #[default]
    Closed,
    /// Tripped; calls rejected without touching the network.
    Open,
    /// Recovery test; one probe call at a time is admitted.
    HalfOpen,
}

impl CircuitState {
    /// Database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "closed" => Some(Self::Closed),
            "open" => Some(Self::Open),
            "half_open" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

/// Circuit breaker for a single scope.
#[derive(Debug)]
pub struct CircuitBreaker {
    scope: String,
    config: CircuitConfig,
    state: CircuitState,
    failure_count: u32,
    probe_successes: u32,
    probe_in_flight: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// New breaker in the closed state.
    #[must_use]
    pub fn new(scope: String, config: CircuitConfig) -> Self {
        Self {
            scope,
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            probe_successes: 0,
            probe_in_flight: None,
            opened_at: None,
            last_failure_at: None,
            last_success_at: None,
        }
    }

    /// Rebuild a breaker from persisted state.
    #[must_use]
    pub fn from_persisted(row: &GatewayCircuitState, config: CircuitConfig) -> Self {
        Self {
            scope: row.scope.clone(),
            config,
            state: CircuitState::parse(&row.state).unwrap_or_default(),
            failure_count: row.failure_count.max(0) as u32,
            probe_successes: 0,
            probe_in_flight: None,
            opened_at: row.opened_at,
            last_failure_at: row.last_failure_at,
            last_success_at: row.last_success_at,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether a call may proceed. Handles the open-to-half-open
    /// transition once the reset timeout has elapsed, and admits only one
    /// in-flight probe while half-open.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(opened_at) = self.opened_at {
                    let elapsed = Utc::now().signed_duration_since(opened_at);
                    if elapsed.num_seconds() >= self.config.reset_timeout_secs {
                        self.state = CircuitState::HalfOpen;
                        self.probe_successes = 0;
                        self.probe_in_flight = Some(Utc::now());
                        tracing::info!(
                            target: "gateway",
                            scope = %self.scope,
                            "Circuit transitioning to half-open for probe"
                        );
                        return true;
                    }
                }
                false
            }
            CircuitState::HalfOpen => {
                match self.probe_in_flight {
                    None => {
                        self.probe_in_flight = Some(Utc::now());
                        true
                    }
                    Some(started) => {
                        // A probe whose worker died must not pin the circuit
                        // half-open forever.
                        let elapsed = Utc::now().signed_duration_since(started);
                        if elapsed.num_seconds() >= self.config.reset_timeout_secs {
                            self.probe_in_flight = Some(Utc::now());
                            true
                        } else {
                            false
                        }
                    }
                }
            }
        }
    }

    /// Release a reserved probe slot without recording an outcome (the
    /// call was aborted before reaching the network).
    pub fn release_probe(&mut self) {
        self.probe_in_flight = None;
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        self.last_success_at = Some(Utc::now());
        self.probe_in_flight = None;

        match self.state {
            CircuitState::HalfOpen => {
                self.probe_successes += 1;
                if self.probe_successes >= self.config.close_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.probe_successes = 0;
                    self.opened_at = None;
                    tracing::info!(
                        target: "gateway",
                        scope = %self.scope,
                        "Circuit closed after successful probes"
                    );
                }
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {
                tracing::warn!(
                    target: "gateway",
                    scope = %self.scope,
                    "Success recorded while circuit open"
                );
            }
        }
    }

    /// Record a circuit-relevant failure.
    pub fn record_failure(&mut self) {
        self.last_failure_at = Some(Utc::now());
        self.failure_count += 1;
        self.probe_in_flight = None;

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Utc::now());
                    tracing::warn!(
                        target: "gateway",
                        scope = %self.scope,
                        failure_count = self.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(Utc::now());
                self.probe_successes = 0;
                tracing::warn!(
                    target: "gateway",
                    scope = %self.scope,
                    "Circuit reopened after failed probe"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn to_upsert(&self) -> UpsertCircuitState {
        UpsertCircuitState {
            scope: self.scope.clone(),
            state: self.state.as_str().to_string(),
            failure_count: self.failure_count as i32,
            opened_at: self.opened_at,
            last_failure_at: self.last_failure_at,
            last_success_at: self.last_success_at,
        }
    }
}

/// Registry of circuit breakers across scopes, with shared-store
/// write-through.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
    config: GatewayConfig,
    pool: PgPool,
}

impl CircuitBreakerRegistry {
    /// Create a registry over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool, config: GatewayConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            config,
            pool,
        }
    }

    /// Combined circuit key for a scope and endpoint class.
    #[must_use]
    pub fn circuit_scope(scope: &str, class: EndpointClass) -> String {
        format!("{scope}|{class}")
    }

    /// Whether a call for `(scope, class)` may proceed.
    pub async fn can_execute(&self, scope: &str, class: EndpointClass) -> bool {
        let key = Self::circuit_scope(scope, class);
        self.ensure_loaded(&key, class).await;

        let mut breakers = self.breakers.write().await;
        match breakers.get_mut(&key) {
            Some(cb) => cb.can_execute(),
            None => true,
        }
    }

    /// Release a reserved half-open probe without an outcome.
    pub async fn release_probe(&self, scope: &str, class: EndpointClass) {
        let key = Self::circuit_scope(scope, class);
        let mut breakers = self.breakers.write().await;
        if let Some(cb) = breakers.get_mut(&key) {
            cb.release_probe();
        }
    }

    /// Record a success and persist the transition.
    pub async fn record_success(&self, scope: &str, class: EndpointClass) {
        let key = Self::circuit_scope(scope, class);
        self.ensure_loaded(&key, class).await;

        let upsert = {
            let mut breakers = self.breakers.write().await;
            let Some(cb) = breakers.get_mut(&key) else {
                return;
            };
            cb.record_success();
            cb.to_upsert()
        };
        self.persist(upsert).await;
    }

    /// Record a circuit-relevant failure and persist the transition.
    pub async fn record_failure(&self, scope: &str, class: EndpointClass) {
        let key = Self::circuit_scope(scope, class);
        self.ensure_loaded(&key, class).await;

        let upsert = {
            let mut breakers = self.breakers.write().await;
            let Some(cb) = breakers.get_mut(&key) else {
                return;
            };
            cb.record_failure();
            cb.to_upsert()
        };
        self.persist(upsert).await;
    }

    /// Current state for a circuit (operator view, tests).
    pub async fn state(&self, scope: &str, class: EndpointClass) -> CircuitState {
        let key = Self::circuit_scope(scope, class);
        let breakers = self.breakers.read().await;
        breakers.get(&key).map_or(CircuitState::Closed, CircuitBreaker::state)
    }

    /// Load persisted state on first touch of a scope. A failing store
    /// yields a fresh closed breaker; local decisions must not depend on
    /// store availability.
    async fn ensure_loaded(&self, key: &str, class: EndpointClass) {
        {
            let breakers = self.breakers.read().await;
            if breakers.contains_key(key) {
                return;
            }
        }

        let circuit_config = self.config.circuit_for(class).clone();
        let loaded = match GatewayCircuitState::find_by_scope(&self.pool, key).await {
            Ok(Some(row)) => CircuitBreaker::from_persisted(&row, circuit_config),
            Ok(None) => CircuitBreaker::new(key.to_string(), circuit_config),
            Err(e) => {
                tracing::warn!(
                    target: "gateway",
                    scope = %key,
                    error = %e,
                    "Circuit state load failed, starting closed"
                );
                CircuitBreaker::new(key.to_string(), circuit_config)
            }
        };

        let mut breakers = self.breakers.write().await;
        breakers.entry(key.to_string()).or_insert(loaded);
    }

    async fn persist(&self, upsert: UpsertCircuitState) {
        let scope = upsert.scope.clone();
        if let Err(e) = GatewayCircuitState::upsert(&self.pool, upsert).await {
            tracing::warn!(
                target: "gateway",
                scope = %scope,
                error = %e,
                "Circuit state write-through failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "tenant:t1|read".to_string(),
            CircuitConfig {
                failure_threshold: threshold,
                reset_timeout_secs: 30,
                close_threshold: 1,
            },
        )
    }

    #[test]
    fn test_state_round_trip() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            assert_eq!(CircuitState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CircuitState::parse("melted"), None);
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut cb = breaker(3);
        for _ in 0..2 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let mut cb = breaker(3);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_transitions_to_half_open_after_timeout() {
        let mut cb = breaker(1);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Backdate the open so the reset timeout has elapsed.
        cb.opened_at = Some(Utc::now() - chrono::Duration::seconds(31));
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let mut cb = breaker(1);
        cb.record_failure();
        cb.opened_at = Some(Utc::now() - chrono::Duration::seconds(31));

        assert!(cb.can_execute());
        // Second caller while the probe is in flight is rejected.
        assert!(!cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_released_probe_slot_readmits() {
        let mut cb = breaker(1);
        cb.record_failure();
        cb.opened_at = Some(Utc::now() - chrono::Duration::seconds(31));

        assert!(cb.can_execute());
        cb.release_probe();
        assert!(cb.can_execute());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = breaker(1);
        cb.record_failure();
        cb.opened_at = Some(Utc::now() - chrono::Duration::seconds(31));
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_close_threshold_requires_consecutive_probe_successes() {
        let mut cb = CircuitBreaker::new(
            "tenant:t1|mutation".to_string(),
            CircuitConfig {
                failure_threshold: 1,
                reset_timeout_secs: 30,
                close_threshold: 2,
            },
        );
        cb.record_failure();
        cb.opened_at = Some(Utc::now() - chrono::Duration::seconds(31));

        assert!(cb.can_execute());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert!(cb.can_execute());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_scope_key() {
        assert_eq!(
            CircuitBreakerRegistry::circuit_scope("tenant:abc", EndpointClass::Mutation),
            "tenant:abc|mutation"
        );
    }
}
