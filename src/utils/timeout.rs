//! Default durations and timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Read inactivity limit on both ends of a connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between client keepalive packets.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed delay between client reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How long a session survives without being touched.
pub const SESSION_TTL: Duration = Duration::from_secs(60);

/// Period of the registry expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Grace period for open connections during server shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut` with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_error_expires() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let result = with_timeout_error(slow, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_with_timeout_error_passes_inner_result() {
        let result = with_timeout_error(async { Ok(7u8) }, Duration::from_secs(1)).await;
        assert_eq!(result.ok(), Some(7));

        let result: Result<()> =
            with_timeout_error(async { Err(ProtocolError::Disconnected) }, Duration::from_secs(1))
                .await;
        assert!(matches!(result, Err(ProtocolError::Disconnected)));
    }
}
