//! Rate-limited API gateway for the marketplace.
//!
//! Every outbound call goes through [`Gateway::execute`], which layers, in
//! order: circuit breaker consultation, shared-window rate admission,
//! token acquisition, the call itself under a timeout, and failure
//! classification feeding back into the circuit and retry policy.

pub mod circuit_breaker;
pub mod config;
pub mod executor;
pub mod limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use config::{CircuitConfig, EndpointClass, GatewayConfig, Priority, RateLimitConfig, RetryConfig};
pub use executor::Gateway;
pub use limiter::WindowLimiter;
