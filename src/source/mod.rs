//! Where samples come from.
//!
//! The aggregator only ever sees samples pushed at it; this module stands in
//! for the platform location service. [`LocationRequest`] carries the delivery
//! hints the platform would honor, and the readers turn recorded or piped
//! fixes into [`Sample`](crate::sample::Sample)s.

mod reader;
mod request;

pub use reader::{SampleFormat, load_samples, parse_samples, spawn_line_reader};
pub use request::LocationRequest;
