//! Shared protocol constants for the rmate line-oriented transport

// Default editor endpoint, overridable via environment or CLI
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 52698;

// Environment variables consulted when -H/-p are not given
pub const HOST_ENV: &str = "RMATE_HOST";
pub const PORT_ENV: &str = "RMATE_PORT";

// Socket read chunk size for the session loop
pub const READ_CHUNK: usize = 1024;

// Command verbs (keep spellings stable for compat with TextMate-family editors)
pub mod verb {
    pub const OPEN: &str = "open";
    pub const SAVE: &str = "save";
    pub const CLOSE: &str = "close";
}

// Header names used in command blocks.
// `data` is special: its value declares an exact payload byte count, and the
// stream switches to raw payload the instant the header line ends.
pub mod header {
    pub const DISPLAY_NAME: &str = "display-name";
    pub const REAL_PATH: &str = "real-path";
    pub const DATA_ON_SAVE: &str = "data-on-save";
    pub const RE_ACTIVATE: &str = "re-activate";
    pub const TOKEN: &str = "token";
    pub const DATA: &str = "data";
}
