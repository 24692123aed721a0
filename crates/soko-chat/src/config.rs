use crate::retry::ReadRetry;

/// Upload ceiling documented to users: 5 MiB.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// Snapshots buffered per live subscription before the watch task waits.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub max_attachment_bytes: usize,
    pub read_retry: ReadRetry,
    pub subscription_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            read_retry: ReadRetry::default(),
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}
