//! Authorization Flow Manager for the marketplace integration.
//!
//! Owns the delegated-authorization lifecycle: PKCE handshake issuance and
//! single-use consumption, authorization-code exchange with bounded retry
//! and a global 429 backoff window, duplicate-callback absorption, and
//! serialized credential refresh. Expired coordination rows are swept by
//! the [`AuthJanitor`].

pub mod backoff;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod janitor;
pub mod pkce;
pub mod token_client;

pub use backoff::GlobalBackoff;
pub use credentials::{CredentialService, REFRESH_MARGIN_SECS};
pub use error::{AuthError, AuthResult};
pub use flow::{AuthFlowConfig, AuthFlowService};
pub use janitor::AuthJanitor;
pub use pkce::PkcePair;
pub use token_client::{TokenClient, TokenEndpointConfig, TokenGrant};
