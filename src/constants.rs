//! Shared constants used across the application.

/// User agent string sent with every platform API request.
pub const USER_AGENT: &str = concat!("antarctica-today-social/", env!("CARGO_PKG_VERSION"));

/// Most images a single post may carry on any supported platform.
pub const MAX_IMAGES: usize = 4;

/// `chrono` format string for covered dates (`YYYY.MM.DD`).
pub const COVERED_DATE_FORMAT: &str = "%Y.%m.%d";
