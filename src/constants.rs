use std::time::Duration;

// Protocol constants
pub const ESCAPE_CHAR: u8 = 0x1B;
pub const ESCAPE_ESCAPE_CHAR: u8 = 0x01;
pub const NEWLINE_CHAR: u8 = 0x0A;
pub const NEWLINE_ESCAPE_CHAR: u8 = 0x02;
pub const CARRIAGERETURN_CHAR: u8 = 0x0D;
pub const CARRIAGERETURN_ESCAPE_CHAR: u8 = 0x03;

// Retrieval endpoints, relative to the retrieval base URL
pub const RAW_ENDPOINT: &str = "data/getData.raw";
pub const JSON_ENDPOINT: &str = "data/getData.json";

/// Prefix of header/meta keys carrying enum labels, e.g. `ENUM_0`.
pub const ENUM_HEADER_PREFIX: &str = "ENUM_";

// Default configuration
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_BASE_URL: &str = "http://localhost:17665/retrieval";
pub const DEFAULT_RETRIEVAL_PORT: u16 = 17665;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
