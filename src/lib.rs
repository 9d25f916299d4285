//! rmate client library
//!
//! Client side of the TextMate-style remote-editing hand-off protocol:
//! connect to a listening editor, send a file with `open`, then service
//! `save`/`close` commands on the same connection until the editor hangs up.

pub mod logger;
pub mod net;
pub mod protocol;
pub mod session;
