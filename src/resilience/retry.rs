// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded retry with exponential backoff for store calls.
//!
//! Every retry is bounded: a store call that keeps failing surfaces its
//! error to the caller, which either fails the operation (mutations,
//! startup) or logs and waits for its next tick (background loops).
//!
//! # Example
//!
//! ```
//! use tree_sync::RetryConfig;
//! use std::time::Duration;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//!
//! let query = RetryConfig::query();
//! assert_eq!(query.max_attempts, 3);
//! assert!(query.delay_for(10) <= query.max_delay);
//! assert_eq!(query.delay_for(0), Duration::from_millis(100));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff schedule for a retried store call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first; at least 1.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Connecting and creating the schema. Five attempts, roughly five
    /// seconds in total, so a wrong connection string fails startup quickly.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Individual reads and writes. Three quick attempts.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay slept after failed attempt number `failures` (0-based).
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(failures as i32);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is used up,
/// returning the last error in that case.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut failures: u32 = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if failures > 0 {
                    info!(operation = operation_name, failures, "Store call recovered");
                }
                return Ok(val);
            }
            Err(err) => {
                failures += 1;
                crate::metrics::record_retry(operation_name);

                if failures as usize >= max_attempts {
                    warn!(operation = operation_name, attempts = failures, error = %err, "Store call gave up");
                    return Err(err);
                }

                let delay = config.delay_for(failures - 1);
                warn!(
                    operation = operation_name,
                    attempt = failures,
                    max_attempts,
                    error = %err,
                    ?delay,
                    "Store call failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
