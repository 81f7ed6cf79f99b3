//! Row models, one module per table.

pub mod auth_handshake;
pub mod cache_row;
pub mod gateway_circuit_state;
pub mod ingested_event;
pub mod marketplace_credential;
pub mod rate_limit_window;

pub use auth_handshake::{AuthHandshake, CreateAuthHandshake};
pub use cache_row::CacheRow;
pub use gateway_circuit_state::{GatewayCircuitState, UpsertCircuitState};
pub use ingested_event::{CreateIngestedEvent, EventStatus, IngestedEvent};
pub use marketplace_credential::{CreateMarketplaceCredential, MarketplaceCredential};
pub use rate_limit_window::RateLimitWindow;
