//! Backoff strategies. Every strategy is an `Iterator` over sleep durations.

pub mod fixed;
