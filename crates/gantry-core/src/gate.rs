//! Per-target concurrency gate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Single-holder gate serializing resolution and materialization per target.
///
/// Concurrent requests for one target coalesce behind the holder: they
/// either observe the populated caches once the holder releases, or give up
/// when the deadline passes. The gate is not reentrant. Distinct targets
/// have distinct gates and proceed fully in parallel.
#[derive(Debug)]
pub struct TargetGate {
    slot: Arc<Semaphore>,
}

/// Proof of holding a gate; dropping it releases the gate.
///
/// Tying release to drop guarantees the gate opens on every exit path,
/// success or failure.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl TargetGate {
    /// Creates a gate with a single slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Acquires the gate, waiting at most `timeout` for the current holder
    /// to release.
    ///
    /// # Errors
    /// Returns [`Error::GateTimeout`] when the deadline elapses. Callers
    /// surface this as a not-found-class condition, bounding worst-case
    /// latency for stampeding requests instead of queueing indefinitely.
    pub async fn acquire(&self, target: &str, timeout: Duration) -> Result<GatePermit> {
        match tokio::time::timeout(timeout, Arc::clone(&self.slot).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(GatePermit { _permit: permit }),
            // The semaphore is never closed; this arm is unreachable in practice.
            Ok(Err(_)) => Err(Error::internal(format!(
                "gate for target '{target}' is closed"
            ))),
            Err(_) => Err(Error::GateTimeout {
                target: target.to_string(),
                waited: timeout,
            }),
        }
    }
}

impl Default for TargetGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_times_out_while_held() {
        let gate = TargetGate::new();
        let _held = gate
            .acquire("menta", Duration::from_millis(100))
            .await
            .expect("first acquire");

        let err = gate
            .acquire("menta", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GateTimeout { target, .. } if target == "menta"));
    }

    #[tokio::test]
    async fn dropping_the_permit_releases_the_gate() {
        let gate = TargetGate::new();
        let held = gate
            .acquire("menta", Duration::from_millis(100))
            .await
            .expect("first acquire");
        drop(held);

        gate.acquire("menta", Duration::from_millis(20))
            .await
            .expect("second acquire");
    }

    #[tokio::test]
    async fn waiting_acquire_proceeds_once_released() {
        let gate = Arc::new(TargetGate::new());
        let held = gate
            .acquire("menta", Duration::from_millis(100))
            .await
            .expect("first acquire");

        let contender = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            contender
                .acquire("menta", Duration::from_millis(500))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        waiter
            .await
            .expect("join")
            .expect("acquire after release");
    }
}
