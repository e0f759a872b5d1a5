//! Watches GitHub repositories for new releases and announces them in a
//! Telegram chat.
//!
//! - `checker`: one pass over the watched repositories.
//! - `github`: latest-release lookups (and the HTTP client shared by the job).
//! - `state`: last-seen release ids kept in a gist.
//! - `markup`: release notes to Telegram HTML.
//! - `telegram`: message delivery with a plain-text fallback.
//! - `invoke`: the single-shot entrypoint used by the binary.

pub mod checker;
pub mod config;
pub mod github;
pub mod invoke;
pub mod markup;
pub mod model;
pub mod state;
pub mod telegram;
