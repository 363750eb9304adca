use std::time::Duration;

const DEFAULT_TOPICS_DIR: &str = "topics";
const DEFAULT_LOGS_DIR: &str = "logs";
const DEFAULT_FLUSH_SIZE: usize = 3;
const DEFAULT_RETRY_BACKOFF_MILLIS: u64 = 5000;
const DEFAULT_ZERO_PAD_WIDTH: usize = 10;
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 500;
const DEFAULT_RECOVERY_RETRIES: usize = 3;

/// Static configuration of the sink task.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Directory under the store root that holds committed and temp files.
    pub topics_dir: String,
    /// Directory under the store root that holds the per-partition WALs.
    pub logs_dir: String,
    /// Number of records after which the open temp file is rotated and
    /// committed.
    pub flush_size: usize,
    /// If set, an open temp file is rotated once this much time has elapsed
    /// since it was opened, regardless of how many records it holds.
    pub rotate_interval: Option<Duration>,
    /// Fixed wait before a suspended partition re-attempts the failed
    /// storage operation.
    pub retry_backoff: Duration,
    /// Width of the zero-padded offsets embedded in committed file names.
    pub zero_pad_width: usize,
    /// Buffer size of the per-partition actor channels.
    pub channel_buffer_size: usize,
    /// Bounded retries for storage calls during recovery, after which the
    /// partition's startup fails.
    pub recovery_retries: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            topics_dir: DEFAULT_TOPICS_DIR.to_string(),
            logs_dir: DEFAULT_LOGS_DIR.to_string(),
            flush_size: DEFAULT_FLUSH_SIZE,
            rotate_interval: None,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MILLIS),
            zero_pad_width: DEFAULT_ZERO_PAD_WIDTH,
            channel_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
            recovery_retries: DEFAULT_RECOVERY_RETRIES,
        }
    }
}

impl SinkConfig {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.flush_size == 0 {
            return Err(crate::Error::Config(
                "flush_size must be greater than zero".to_string(),
            ));
        }
        if self.zero_pad_width == 0 {
            return Err(crate::Error::Config(
                "zero_pad_width must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
