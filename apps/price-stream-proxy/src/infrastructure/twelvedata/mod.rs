//! Twelve Data Adapter
//!
//! WebSocket adapter for the Twelve Data real-time price endpoint.
//!
//! - `messages`: wire types
//! - `codec`: JSON encoding/decoding to domain frames
//! - `client`: [`TwelveDataConnector`], the [`UpstreamConnector`] implementation
//!
//! [`UpstreamConnector`]: crate::application::ports::UpstreamConnector

pub mod client;
pub mod codec;
pub mod messages;

pub use client::TwelveDataConnector;
pub use codec::{CodecError, TwelveDataCodec};
