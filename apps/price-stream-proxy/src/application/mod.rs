//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the price stream service and the port interfaces
//! that define how it talks to the upstream feed.

/// Port interfaces for the upstream feed.
pub mod ports;

/// Application services: session ownership, routing, timers.
pub mod services;
