//! Typed client for the marketplace REST API.
//!
//! Upstream payloads are untyped JSON; this crate is the boundary where
//! they become validated structures. Every call goes through the gateway
//! with an explicit endpoint class and priority; read-heavy lookups are
//! backed by the layered cache with tenant/seller tags.

pub mod client;
pub mod types;

pub use client::{MarketplaceApi, MarketplaceError};
pub use types::{Item, Question, QuestionStatus, SellerProfile};
