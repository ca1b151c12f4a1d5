//! Domain-level clients built on the tool bridge.

pub mod time;

pub use time::TimeToolClient;
