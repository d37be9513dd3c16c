//! Rate-limit aware retry and session-fatal detection.
use crate::remote::RemoteError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

static FLOOD_WAIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FLOOD_WAIT_(\d+)").expect("valid flood wait pattern"));

/// Messages that mean the remote session can no longer act for the account.
const SESSION_FATAL_KEYWORDS: [&str; 4] = [
    "AUTH_KEY_UNREGISTERED",
    "SESSION_REVOKED",
    "SESSION_EXPIRED",
    "USER_DEACTIVATED",
];

/// Seconds to sleep for a wait hint: `max(1, ceil(hint))`.
pub fn wait_seconds(hint: f64) -> u64 {
    if !hint.is_finite() || hint <= 1.0 {
        return 1;
    }
    hint.ceil() as u64
}

/// Extract the `FLOOD_WAIT_<n>` hint embedded in an error message. A bare
/// `FLOOD_WAIT` without a number means one second.
pub fn flood_wait_hint(message: &str) -> Option<u64> {
    if !message.contains("FLOOD_WAIT") {
        return None;
    }
    let secs = FLOOD_WAIT
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(1);
    Some(secs.max(1))
}

pub fn fatal_keyword(message: &str) -> Option<&'static str> {
    SESSION_FATAL_KEYWORDS
        .iter()
        .copied()
        .find(|kw| message.contains(kw))
}

pub fn is_session_fatal(message: &str) -> bool {
    fatal_keyword(message).is_some()
}

/// Run `op`, sleeping and re-running it for as long as it reports a rate
/// limit. There is no attempt cap; the service hint bounds each wait. Any other
/// error is returned immediately.
pub async fn retry_on_flood_wait<T, F, Fut>(mut op: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    loop {
        match op().await {
            Err(RemoteError::RateLimited { seconds }) => {
                let secs = seconds.max(1);
                warn!(wait_secs = secs, "rate limited by remote; waiting before retry");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[test]
    fn extracts_flood_wait_seconds() {
        assert_eq!(flood_wait_hint("FLOOD_WAIT_12"), Some(12));
        assert_eq!(flood_wait_hint("FLOOD_WAIT_0"), Some(1));
        assert_eq!(flood_wait_hint("PEER_FLOOD"), None);
        assert_eq!(flood_wait_hint("FLOOD_WAIT"), Some(1));
        assert_eq!(flood_wait_hint("FLOOD_WAIT_X: slow down"), Some(1));
        assert_eq!(wait_seconds(3.0), 3);
        assert_eq!(wait_seconds(2.01), 3);
        assert_eq!(wait_seconds(0.2), 1);
        assert_eq!(wait_seconds(f64::NAN), 1);
    }

    #[test]
    fn detects_fatal_keywords() {
        assert!(is_session_fatal("AUTH_KEY_UNREGISTERED"));
        assert!(is_session_fatal("RPCError 401: USER_DEACTIVATED (caused by x)"));
        assert!(!is_session_fatal("OTHER"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_on_flood_wait() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();
        let out = retry_on_flood_wait(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RemoteError::RateLimited { seconds: 2 })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(out, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_retrying_without_cap() {
        let calls = AtomicUsize::new(0);
        let out: Result<(), RemoteError> = retry_on_flood_wait(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 25 {
                    Err(RemoteError::RateLimited { seconds: 1 })
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(out.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 26);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let out: Result<(), RemoteError> = retry_on_flood_wait(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::other("CHANNEL_PRIVATE", "private")) }
        })
        .await;
        assert_eq!(out, Err(RemoteError::other("CHANNEL_PRIVATE", "private")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
