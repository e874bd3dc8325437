//! Capture-time resolution and timestamp parsing.
mod logic;
mod parsing;
mod structs;

pub use logic::resolve_capture_time;
pub use parsing::{format_timestamp, parse_timestamp};
pub use structs::{CaptureTime, Confidence, TimeZoneInfo};
