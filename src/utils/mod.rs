//! Utils Module
pub mod telemetry;
pub mod truncate;

pub use telemetry::init_logging;
pub use truncate::{char_len, extract_json_array, extract_json_object, take_chars, truncate_with_marker};
