//! Codec module - serialization of wire records.
//!
//! - [`JsonCodec`] - JSON using `serde_json`, one object per WebSocket message
//!
//! Codecs are marker structs with static methods rather than trait objects;
//! the protocol only ever speaks JSON.

mod json;

pub use json::JsonCodec;
