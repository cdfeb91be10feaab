//! Console Output
//!
//! Text conversion, timestamp and event formatting, and the printer that
//! writes received events to standard output.

pub mod format;
pub mod printer;
pub mod text;

pub use format::{
    DEFAULT_TIME_FORMAT, EventFormatter, format_local_time, format_time_in,
    format_timestamp_millis, format_timestamp_millis_in,
};
pub use printer::ConsolePrinter;
pub use text::TextConverter;
