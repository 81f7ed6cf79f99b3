//! Core types shared across the Vendra workspace.
//!
//! Holds the strongly typed identifiers, the upstream failure taxonomy used
//! by the marketplace gateway, and the seam traits (`AccessTokenProvider`,
//! `AnswerPipeline`) that let crates collaborate without depending on each
//! other's implementations.

pub mod error;
pub mod ids;
pub mod traits;

pub use error::{GatewayError, TokenError, UpstreamFailure};
pub use ids::{CredentialId, EventId, ParseIdError, TenantId};
pub use traits::{
    AccessToken, AccessTokenProvider, AnswerPipeline, AnswerRequest, AnswerSuggestion,
    PipelineError,
};
