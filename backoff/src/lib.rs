//! Retry strategies and a retry helper for fallible async operations.
//!
//! A strategy is any `Iterator<Item = Duration>`; exhausting the iterator
//! ends the retries. [`retry`] re-runs an operation, sleeping between
//! attempts as prescribed by the strategy, for as long as the supplied
//! condition says the error is worth retrying.

pub mod strategy;

mod retry;
pub use retry::{Condition, retry};
