//! # colloquy-store
//!
//! SQLite persistence for the chat server: user accounts, the message
//! log, read-state transitions, and the unseen-message aggregation that
//! drives sidebar badges.  The crate exposes a synchronous [`Database`]
//! handle wrapping a `rusqlite::Connection` with typed helpers per
//! domain model; callers serialize access to it.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod unseen;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
