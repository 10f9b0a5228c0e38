use std::time::Duration;

use dfd_core::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, MAX_DOWNLOAD_WORKERS};

/// Tunables for a single download session (spec §4.5, §5).
#[derive(Debug, Clone, Copy)]
pub struct DownloadConfig {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_workers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_workers: MAX_DOWNLOAD_WORKERS,
        }
    }
}
