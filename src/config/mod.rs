use serde::Deserialize;
use std::time::Duration;

use crate::models::upload::UploadLimits;
use crate::services::poller::PollConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the analysis job service (e.g., "http://192.168.1.105:8000")
    pub api_base_url: String,

    /// Spacing between status checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on status checks per job
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Abort the initial submission after this long
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,

    /// Timeout for a single status check
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,

    /// Abort the upload if no bytes move for this long. 0 disables.
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Largest image payload the service accepts
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_attempts() -> u32 {
    300
}

fn default_upload_timeout_ms() -> u64 {
    120_000
}

fn default_status_timeout_ms() -> u64 {
    10_000
}

fn default_stall_timeout_ms() -> u64 {
    30_000
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Polling parameters for [`crate::services::poller::JobPoller`].
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts,
            upload_timeout: Duration::from_millis(self.upload_timeout_ms),
            status_timeout: Duration::from_millis(self.status_timeout_ms),
            stall_timeout: (self.stall_timeout_ms > 0)
                .then(|| Duration::from_millis(self.stall_timeout_ms)),
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_image_bytes: self.max_image_bytes,
        }
    }
}
