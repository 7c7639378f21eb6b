//! Video stream watchdog for the details page.
//!
//! `machine` holds the pure retry/backoff state machine, `display` the seam
//! to whatever renders the stream, and `runner` the tokio task that drives
//! the machine from display events, timers and user commands.

pub mod display;
pub mod machine;
pub mod runner;

pub use display::HttpStreamDisplay;
pub use machine::{Effect, RetryPolicy, StreamMachine, StreamState, StreamStatus};
pub use runner::{StreamWatchdog, WatchdogHandle};
