//! # colloquy-shared
//!
//! Types shared between the store and the server: id newtypes, the
//! real-time event protocol pushed over WebSocket, and protocol-level
//! constants.

pub mod constants;
pub mod protocol;
pub mod types;

pub use types::{MessageId, UserId};
