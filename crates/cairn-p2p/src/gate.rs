use tokio::sync::Notify;

/// Single-permit gate pausing a connection's read loop between frames.
///
/// The read loop calls [`Gate::await_release`] after publishing a frame; the
/// consumer calls [`Gate::release`] exactly once when it is done with that
/// frame. A release issued before the read loop starts waiting is stored,
/// but at most one release is ever stored.
#[derive(Debug, Default)]
pub struct Gate {
    notify: Notify,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the gate is released, consuming the release.
    pub async fn await_release(&self) {
        self.notify.notified().await;
    }

    /// Release the gate.
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn release_wakes_waiter() {
        let gate = Arc::new(Gate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.await_release().await })
        };
        tokio::task::yield_now().await;
        gate.release();
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn early_release_is_not_lost() {
        let gate = Gate::new();
        gate.release();
        timeout(Duration::from_secs(1), gate.await_release())
            .await
            .expect("stored release should be consumed");
    }

    #[tokio::test]
    async fn releases_do_not_accumulate() {
        let gate = Gate::new();
        gate.release();
        gate.release();
        gate.await_release().await;
        assert!(timeout(Duration::from_millis(50), gate.await_release())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unreleased_gate_blocks() {
        let gate = Gate::new();
        assert!(timeout(Duration::from_millis(50), gate.await_release())
            .await
            .is_err());
    }
}
