//! Small cross-cutting utilities shared by the core and its adapters.

pub mod throttle;

pub use throttle::LogThrottler;
