//! Types published to presentation-layer subscribers.
//!
//! Everything here derives `serde::Serialize` + `serde::Deserialize` so a
//! host can forward events as JSON unchanged.

pub mod events;
