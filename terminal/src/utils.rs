use crate::errors::{Result, TerminalError};
use rand::{Rng, distr::Alphanumeric};
use std::time::Duration;
use tokio::time::Instant;

pub fn rand_id(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Polls `condition` every `interval` until it holds or `timeout` elapses. Only the
/// caller's wait is abandoned on timeout.
pub async fn wait_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    what: &str,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(TerminalError::Timeout {
                message: format!("timed out after {:?} waiting for {}", timeout, what),
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_rand_id() {
        let a = rand_id(32);
        let b = rand_id(32);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_wait_until_succeeds_after_polls() {
        let polls = Arc::new(AtomicU32::new(0));
        let polls_clone = polls.clone();
        let result = wait_until(
            Duration::from_secs(1),
            Duration::from_millis(10),
            "third poll",
            move || {
                let polls = polls_clone.clone();
                async move { polls.fetch_add(1, Ordering::SeqCst) >= 2 }
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let start = Instant::now();
        let result = wait_until(
            Duration::from_millis(100),
            Duration::from_millis(20),
            "never",
            || async { false },
        )
        .await;
        assert!(matches!(result, Err(TerminalError::Timeout { .. })));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
