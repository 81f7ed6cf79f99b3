//! Postgres persistence for Vendra.
//!
//! Two families of rows live here: relational records that outlive any
//! process (`marketplace_credentials`, `ingested_events`) and TTL-swept
//! coordination rows that all instances share (`auth_handshakes`,
//! `rate_limit_windows`, `gateway_circuit_states`, `cache_entries`).
//! Each model owns its SQL as associated async fns on the row struct.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
