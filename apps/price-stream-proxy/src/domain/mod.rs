//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the price cache, the subscription book and the
//! connection state machine. Nothing here performs I/O.

/// Latest-value price cache.
pub mod cache;

/// Upstream connection state machine.
pub mod connection;

/// Market data streaming types (price samples, upstream frames).
pub mod streaming;

/// Subscription tracking and reconciliation.
pub mod subscription;
