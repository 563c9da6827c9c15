//! # hud-events
//!
//! The HUD event protocol and its transport:
//! - [`HudEvent`] / [`HudEventKind`] - decoded event shape
//! - [`decode`] - pure line decoder with schema-version tolerance
//! - [`EventStream`] - resilient FIFO connection with reconnect/backoff

pub mod decode;
pub mod event;
pub mod stream;

pub use decode::{decode, Decoded, DecodeError};
pub use event::{HudEvent, HudEventKind, HUD_EVENT_SCHEMA_VERSION};
pub use stream::{
    ConnectionStatus, EventStream, StreamMessage, MAX_RECONNECT_ATTEMPTS, STREAM_CHANNEL_BUFFER,
};
