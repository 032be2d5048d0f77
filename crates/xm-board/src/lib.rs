//! `xm-board` — typed message boards for the `rust_xm` runtime.
//!
//! A board is a double-buffered message queue for one declared message type:
//! a committed column-major store readable this iteration, plus per-worker
//! writer staging areas collecting the messages produced this iteration.
//! A `msg_sync` task promotes staged messages into the committed store; a
//! `msg_clear` task empties it.  Posting never locks: every worker stages
//! into its own writer.
//!
//! # Crate layout
//!
//! | Module       | Contents                                               |
//! |--------------|--------------------------------------------------------|
//! | [`board`]    | `MessageBoard` — committed store + writer lifecycle    |
//! | [`writer`]   | `BoardWriter` staging, `Message` row under construction |
//! | [`iterator`] | `MessageIterator` with raw and indexed backends        |
//! | [`manager`]  | `BoardManager` — registry of boards by message name    |
//! | [`proxy`]    | `Proxy` ACLs and the per-worker `BoardClient`          |

pub mod board;
pub mod error;
pub mod iterator;
pub mod manager;
pub mod proxy;
pub mod writer;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use board::MessageBoard;
pub use error::{BoardError, BoardResult};
pub use iterator::{MessageIterator, MessageView};
pub use manager::BoardManager;
pub use proxy::{BoardClient, Proxy};
pub use writer::{BoardWriter, Message};
