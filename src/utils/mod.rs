//! Utilities module for logging, error handling and formatting helpers

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{PlateOcrError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
