//! Core types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod time;
pub mod progress;

pub use types::*;
pub use error::Error;
pub use progress::{ProgressObserver, ProgressReporter};
pub use time::{FrameTimer, Tick};
