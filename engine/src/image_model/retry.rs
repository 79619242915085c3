use std::time::Duration;

use log::{debug, warn};
use tokio::time::{sleep, timeout};

use super::{GenerationError, GenerationRequest, Image, ImageModel};
use crate::MAX_RETRIES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one, only spent on transient failures.
    pub max_retries: u32,
    /// Wait before the first retry, doubled after every retry.
    pub base_backoff: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

    /// Capped at [`MAX_RETRIES`].
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.min(MAX_RETRIES);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_backoff: Self::DEFAULT_BACKOFF,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

pub async fn get_image_with_retry(
    model: &(dyn ImageModel + Send + Sync),
    request: &GenerationRequest,
    policy: &RetryPolicy,
    module_id: &str,
) -> Result<Image, GenerationError> {
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 1;
    let mut backoff = policy.base_backoff;

    loop {
        debug!("{module_id}: attempt {attempt}/{max_attempts}");
        let result = match timeout(policy.timeout, model.get_image(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(policy.timeout)),
        };

        match result {
            Ok(image) => return Ok(image),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!("{module_id}: {e}, retrying in {backoff:?} ({attempt}/{max_attempts})");
                sleep(backoff).await;
                attempt += 1;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
