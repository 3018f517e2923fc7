//! Bounded retry for optimistic-concurrency conflicts

use kubermatic_common::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff parameters for [`retry_on_conflict`].
///
/// Defaults mirror the client-go `DefaultRetry`: 5 attempts starting at
/// 10ms, constant factor, 10% jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub steps: u32,
    pub duration: Duration,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            steps: 5,
            duration: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        base.mul_f64(1.0 + extra)
    }
}

/// Run `op` until it returns something other than a resource conflict, or
/// the policy runs out of attempts. The last result is returned unchanged.
pub async fn retry_on_conflict<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let steps = policy.steps.max(1);
    let mut delay = policy.duration;
    let mut attempt = 1;

    loop {
        match op().await {
            Err(e) if e.is_resource_conflict() && attempt < steps => {
                debug!(attempt, error = %e, "conflict, retrying");
                tokio::time::sleep(policy.jittered(delay)).await;
                delay = delay.mul_f64(policy.factor);
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubermatic_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> Error {
        Error::ResourceConflict {
            kind: "projects".to_string(),
            name: "plan9-ID".to_string(),
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            duration: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_conflicts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_on_conflict(&fast(), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_steps() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_on_conflict(&fast(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert!(result.unwrap_err().is_resource_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_on_conflict(&fast(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::NotFound("gone".to_string()))
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
