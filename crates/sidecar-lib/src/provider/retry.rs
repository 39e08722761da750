//! Startup acquisition of container limits

use crate::error::{ProviderError, StartupError};
use crate::models::ContainerLimits;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{info, warn};

/// Fixed-interval retry bounded by attempts and an overall deadline
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(3),
            deadline: Duration::from_secs(30),
        }
    }
}

/// Fetch limits until a valid pair is returned or the policy is exhausted.
///
/// Non-positive limits count as a failed attempt.
pub async fn fetch_limits_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut fetch: F,
) -> Result<ContainerLimits, StartupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ContainerLimits, ProviderError>>,
{
    let deadline = Instant::now() + policy.deadline;
    let mut last = ProviderError::Timeout(policy.deadline);
    let mut attempts = 0;

    while attempts < policy.max_attempts {
        if attempts > 0 {
            if Instant::now() + policy.interval >= deadline {
                break;
            }
            sleep(policy.interval).await;
            info!(attempt = attempts + 1, "Retrying container limits fetch");
        }
        attempts += 1;

        match timeout_at(deadline, fetch()).await {
            Ok(Ok(limits)) if limits.is_valid() => {
                info!(
                    cpu_millicores = limits.cpu_millicores,
                    memory_mb = limits.memory_mb,
                    "Fetched container resource limits"
                );
                return Ok(limits);
            }
            Ok(Ok(limits)) => {
                last = ProviderError::InvalidLimits {
                    cpu_millicores: limits.cpu_millicores,
                    memory_mb: limits.memory_mb,
                };
            }
            Ok(Err(e)) => last = e,
            Err(_) => {
                last = ProviderError::Timeout(policy.deadline);
                warn!(attempt = attempts, error = %last, "Container limits fetch hit the deadline");
                break;
            }
        }
        warn!(attempt = attempts, error = %last, "Failed to fetch container limits");
    }

    Err(StartupError::LimitsExhausted { attempts, last })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            interval: Duration::from_millis(1),
            deadline: Duration::from_secs(5),
        }
    }

    const LIMITS: ContainerLimits = ContainerLimits {
        cpu_millicores: 500,
        memory_mb: 256,
    };

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let limits = fetch_limits_with_retry(&fast_policy(), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::LimitsNotInitialized)
                } else {
                    Ok(LIMITS)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(limits, LIMITS);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let err = fetch_limits_with_retry(&fast_policy(), || async {
            Err(ProviderError::ContainerNotFound {
                container: "app".into(),
                scope: "deployment web".into(),
            })
        })
        .await
        .unwrap_err();

        match err {
            StartupError::LimitsExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, ProviderError::ContainerNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_positive_limits_are_retried() {
        let err = fetch_limits_with_retry(&fast_policy(), || async {
            Ok(ContainerLimits {
                cpu_millicores: 0,
                memory_mb: 256,
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            StartupError::LimitsExhausted {
                last: ProviderError::InvalidLimits { cpu_millicores: 0, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_overall_deadline_stops_retries() {
        let policy = RetryPolicy {
            max_attempts: 10,
            interval: Duration::from_millis(1),
            deadline: Duration::from_millis(30),
        };

        let err = fetch_limits_with_retry(&policy, || async {
            sleep(Duration::from_secs(10)).await;
            Ok(LIMITS)
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            StartupError::LimitsExhausted {
                attempts: 1,
                last: ProviderError::Timeout(_)
            }
        ));
    }
}
