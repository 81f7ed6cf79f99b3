//! The `execute` wrapper every outbound marketplace call goes through.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use vendra_core::{AccessToken, AccessTokenProvider, GatewayError, TenantId, UpstreamFailure};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::{EndpointClass, GatewayConfig, Priority, RetryConfig};
use crate::limiter::WindowLimiter;

/// The rate-limited, circuit-protected gateway.
///
/// Call order per [`Gateway::execute`]: circuit consultation (fail fast on
/// open), shared-window rate admission, token acquisition (proactive
/// refresh inside the provider), then the call under a per-attempt timeout
/// with classification-driven retry.
#[derive(Clone)]
pub struct Gateway {
    circuits: CircuitBreakerRegistry,
    limiter: WindowLimiter,
    tokens: Arc<dyn AccessTokenProvider>,
    retry: RetryConfig,
}

impl Gateway {
    /// Create the gateway over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool, config: GatewayConfig, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            circuits: CircuitBreakerRegistry::new(pool.clone(), config.clone()),
            limiter: WindowLimiter::new(pool, config.rate_limit.clone()),
            tokens,
            retry: config.retry,
        }
    }

    /// Rate-limit scope key for a tenant.
    #[must_use]
    pub fn tenant_scope(tenant_id: TenantId) -> String {
        format!("tenant:{tenant_id}")
    }

    /// Circuit registry (operator views).
    #[must_use]
    pub fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }

    /// Execute one marketplace call for a tenant.
    ///
    /// `request_fn` receives a valid access token and performs the actual
    /// HTTP call, returning either the value or a classified
    /// [`UpstreamFailure`]. It may be invoked more than once (transient
    /// retry, refresh-and-retry), so it must be idempotent at the HTTP
    /// level or declared `Mutation` class with the retry budget in mind.
    pub async fn execute<T, F, Fut>(
        &self,
        tenant_id: TenantId,
        class: EndpointClass,
        priority: Priority,
        request_fn: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<T, UpstreamFailure>>,
    {
        let scope = Self::tenant_scope(tenant_id);

        if !self.circuits.can_execute(&scope, class).await {
            return Err(GatewayError::CircuitOpen {
                scope: CircuitBreakerRegistry::circuit_scope(&scope, class),
            });
        }

        if let Err(e) = self.limiter.acquire(&scope, priority).await {
            self.circuits.release_probe(&scope, class).await;
            return Err(e);
        }

        let mut token = match self.tokens.access_token(tenant_id).await {
            Ok(t) => t,
            Err(e) => {
                self.circuits.release_probe(&scope, class).await;
                return Err(e.into());
            }
        };

        let call_timeout = Duration::from_secs(self.retry.call_timeout_secs);
        let mut refreshed = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let outcome = tokio::time::timeout(call_timeout, request_fn(token.clone())).await;
            let result = match outcome {
                Ok(r) => r,
                Err(_) => Err(UpstreamFailure::Transient {
                    status: None,
                    detail: format!("call timed out after {}s", self.retry.call_timeout_secs),
                }),
            };

            let failure = match result {
                Ok(value) => {
                    self.circuits.record_success(&scope, class).await;
                    return Ok(value);
                }
                Err(f) => f,
            };

            match failure {
                UpstreamFailure::Transient { detail, status } => {
                    self.circuits.record_failure(&scope, class).await;

                    tracing::warn!(
                        target: "gateway",
                        scope = %scope,
                        class = %class,
                        attempt,
                        status = ?status,
                        error = %detail,
                        "Upstream call failed"
                    );

                    if attempt >= self.retry.max_attempts {
                        return Err(GatewayError::TransientUpstream { detail });
                    }
                    if !self.circuits.can_execute(&scope, class).await {
                        return Err(GatewayError::CircuitOpen {
                            scope: CircuitBreakerRegistry::circuit_scope(&scope, class),
                        });
                    }
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }

                UpstreamFailure::RateLimited { retry_after_secs } => {
                    // Mandated delay, never a circuit failure.
                    if attempt >= self.retry.max_attempts {
                        self.circuits.release_probe(&scope, class).await;
                        return Err(GatewayError::RateLimited {
                            retry_after_secs: retry_after_secs.unwrap_or(60),
                        });
                    }
                    let wait = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry.delay_for(attempt));
                    tracing::warn!(
                        target: "gateway",
                        scope = %scope,
                        class = %class,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "Upstream rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }

                UpstreamFailure::CredentialRejected { status, detail } => {
                    if refreshed {
                        // Second rejection with a fresh token: the grant
                        // itself is dead.
                        if let Err(e) = self.tokens.mark_invalid(tenant_id, &detail).await {
                            tracing::error!(
                                target: "gateway",
                                tenant_id = %tenant_id,
                                error = %e,
                                "Failed to record credential invalidation"
                            );
                        }
                        self.circuits.release_probe(&scope, class).await;
                        return Err(GatewayError::InvalidCredential { detail });
                    }

                    tracing::warn!(
                        target: "gateway",
                        scope = %scope,
                        status,
                        "Credential rejected, refreshing and retrying once"
                    );
                    refreshed = true;
                    token = match self.tokens.refresh_token(tenant_id).await {
                        Ok(t) => t,
                        Err(e) => {
                            self.circuits.release_probe(&scope, class).await;
                            return Err(e.into());
                        }
                    };
                }

                UpstreamFailure::Rejected { status, detail } => {
                    // Caller error, not upstream instability: surfaced
                    // immediately, never counted toward the circuit.
                    self.circuits.release_probe(&scope, class).await;
                    return Err(GatewayError::UpstreamRejected { status, detail });
                }
            }
        }
    }
}
