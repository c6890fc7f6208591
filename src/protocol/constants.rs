//! RouterOS API protocol constants

/// Default API port (plain TCP)
pub const DEFAULT_API_PORT: u16 = 8728;

/// Default API-SSL port
pub const DEFAULT_API_TLS_PORT: u16 = 8729;

/// Largest word the decoder accepts before treating the stream as corrupt
pub const MAX_WORD_LEN: usize = 1024 * 1024;

// Reply sentence markers
pub const REPLY_RE: &str = "!re";
pub const REPLY_DONE: &str = "!done";
pub const REPLY_TRAP: &str = "!trap";
pub const REPLY_FATAL: &str = "!fatal";
pub const REPLY_EMPTY: &str = "!empty";

/// API attribute carrying the command tag
pub const TAG_ATTRIBUTE: &str = ".tag";

/// Command that aborts a running (streaming) command by tag
pub const CANCEL_COMMAND: &str = "/cancel";

/// Login command (post-6.43 plain-text login)
pub const LOGIN_COMMAND: &str = "/login";

// Word length prefix boundaries
pub(crate) const LEN_1_BYTE_MAX: usize = 0x80;
pub(crate) const LEN_2_BYTE_MAX: usize = 0x4000;
pub(crate) const LEN_3_BYTE_MAX: usize = 0x20_0000;
pub(crate) const LEN_4_BYTE_MAX: usize = 0x1000_0000;
pub(crate) const LEN_5_BYTE_MARKER: u8 = 0xF0;
