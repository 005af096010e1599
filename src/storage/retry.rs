// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Connection retry with capped exponential backoff

use crate::config::StorageSettings;
use crate::error::{LoomError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration for establishing a storage connection
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total connection attempts (at least 1)
    pub attempts: u32,
    /// Base delay in milliseconds (exponentially increased)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds, jitter included
    pub max_delay_ms: u64,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&StorageSettings::default())
    }
}

impl From<&StorageSettings> for RetryConfig {
    fn from(settings: &StorageSettings) -> Self {
        Self {
            attempts: settings.connect_attempts.max(1),
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// No delay between attempts (tests).
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
        }
    }

    /// Calculate delay before retry number `attempt` (0-based)
    pub(crate) fn calculate_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^attempt
        let exponential_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = exponential_ms.min(self.max_delay_ms);

        let jitter_range = (capped_ms as f64 * self.jitter) as i64;
        let jitter_ms = if jitter_range > 0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        let final_ms = (capped_ms as i64 + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms.min(self.max_delay_ms))
    }
}

/// Run `operation` until it succeeds or the attempts are exhausted.
///
/// Exhaustion surfaces as `LoomError::StorageConnectivity` carrying the last
/// failure message.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        "{} succeeded after {} attempts",
                        operation_name,
                        attempt + 1
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                attempt += 1;
                if attempt >= attempts {
                    tracing::warn!(
                        "{} failed after {} attempt(s): {}",
                        operation_name,
                        attempts,
                        error
                    );
                    return Err(LoomError::StorageConnectivity {
                        attempts,
                        message: error.to_string(),
                    });
                }

                let delay = config.calculate_delay(attempt - 1);
                tracing::debug!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:.2}s",
                    operation_name,
                    attempt,
                    attempts,
                    error,
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }
        }
    }
}
