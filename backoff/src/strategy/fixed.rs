use std::time::Duration;

/// A fixed backoff strategy that waits the same interval before every retry.
///
/// The iterator is infinite; bound it with [`Iterator::take`] to cap the
/// number of retries.
///
/// # Example
/// ```
/// use backoff::strategy::fixed::Interval;
///
/// // at most 3 retries, 100ms apart
/// let mut backoff = Interval::from_millis(100).take(3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    /// The constant wait between retries.
    wait: Duration,
}

impl Interval {
    /// Creates a fixed-interval strategy from the given duration.
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    /// Creates a fixed-interval strategy from milliseconds.
    pub fn from_millis(wait_ms: u64) -> Self {
        Self::new(Duration::from_millis(wait_ms))
    }
}

impl Iterator for Interval {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.wait)
    }
}
