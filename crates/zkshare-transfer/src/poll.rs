use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use zkshare_core::{ShareError, ShareResult};

/// Re-run `check` every `interval` until it yields a value.
///
/// Errors from `check` end the wait immediately. Running out of time yields
/// `PeerTimeout`, and a cancelled token yields `Cancelled`; neither touches
/// any stored state.
pub async fn wait_until<T, F>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> ShareResult<T>
where
    F: FnMut() -> ShareResult<Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(ShareError::Cancelled);
        }
        if let Some(value) = check()? {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ShareError::PeerTimeout(timeout.as_secs()));
        }
        let wake = (now + interval).min(deadline);

        tokio::select! {
            _ = cancel.cancelled() => return Err(ShareError::Cancelled),
            _ = sleep_until(wake) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn returns_once_predicate_holds() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let value = wait_until(TICK, Duration::from_secs(5), &cancel, || {
            calls += 1;
            Ok((calls == 3).then_some("ready"))
        })
        .await
        .unwrap();
        assert_eq!(value, "ready");
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn times_out_as_peer_timeout() {
        let cancel = CancellationToken::new();
        let err = wait_until(TICK, Duration::from_millis(30), &cancel, || {
            Ok(None::<()>)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShareError::PeerTimeout(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = wait_until(Duration::from_secs(60), Duration::from_secs(600), &cancel, || {
            Ok(None::<()>)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShareError::Cancelled));
    }

    #[tokio::test]
    async fn check_errors_propagate() {
        let cancel = CancellationToken::new();
        let err = wait_until(TICK, Duration::from_secs(5), &cancel, || {
            Err::<Option<()>, _>(ShareError::NotFound("handshake h".into()))
        })
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }
}
