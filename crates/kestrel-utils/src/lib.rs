//! # Kestrel Utilities
//!
//! Shared utilities for the Kestrel workspace: logging infrastructure built
//! on `tracing`, and C-style escaping for strings read out of a target.

pub mod escape;
pub mod logging;

// Re-export commonly used items for convenience
pub use escape::{c_string, escape_character, escape_string, EscapeOptions};
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
