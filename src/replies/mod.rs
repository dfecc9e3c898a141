//! Reply detection.

pub mod detector;

pub use detector::{ReplyDetector, ReplyScanReport};
