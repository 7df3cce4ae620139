use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::device::TagAdapter;
use crate::core::bluetooth::types::BridgeEvent;

/// Keeps the radio scanning. A scan session ends when the stack stops it or
/// when a connection attempt pauses it; scanning resumes after
/// `restart_delay` either way.
pub struct ScanController<A: TagAdapter> {
    adapter: Arc<A>,
    events: UnboundedSender<BridgeEvent<A::Peripheral>>,
    cancel_token: Arc<Mutex<CancellationToken>>,
    restart_delay: Duration,
}

/// Lets the lifecycle manager stop the running scan session
#[derive(Clone)]
pub struct ScanHandle {
    cancel_token: Arc<Mutex<CancellationToken>>,
}

impl ScanHandle {
    /// Stops the current scan session, if any. Scanning restarts on its own.
    pub fn pause(&self) {
        if let Ok(token) = self.cancel_token.lock() {
            token.cancel();
        }
    }

    /// A handle that controls nothing
    pub fn detached() -> Self {
        Self {
            cancel_token: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }
}

impl<A: TagAdapter> ScanController<A> {
    pub fn new(
        adapter: Arc<A>,
        events: UnboundedSender<BridgeEvent<A::Peripheral>>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            adapter,
            events,
            cancel_token: Arc::new(Mutex::new(CancellationToken::new())),
            restart_delay,
        }
    }

    pub fn handle(&self) -> ScanHandle {
        ScanHandle {
            cancel_token: self.cancel_token.clone(),
        }
    }

    /// Waits for the radio to power on, then scans until the event channel
    /// closes.
    pub async fn run(self) -> Result<()> {
        self.adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        loop {
            let token = CancellationToken::new();
            if let Ok(mut current) = self.cancel_token.lock() {
                *current = token.clone();
            }

            match self.scan_session(&token).await {
                Ok(true) => info!("Scanning stopped"),
                Ok(false) => {
                    debug!("Event channel closed, scanner exiting");
                    return Ok(());
                }
                Err(e) => error!("Scanning failed: {}", e),
            }

            sleep(self.restart_delay).await;
        }
    }

    /// Returns `Ok(false)` once nobody listens for discoveries anymore.
    async fn scan_session(&self, token: &CancellationToken) -> Result<bool> {
        let mut advertisements = self.adapter.scan().await?;
        info!("Scanning started");

        loop {
            tokio::select! {
                advertisement = advertisements.recv() => match advertisement {
                    Some(advertisement) => {
                        if self.events.send(BridgeEvent::Discovered(advertisement)).is_err() {
                            return Ok(false);
                        }
                    }
                    None => return Ok(true),
                },
                _ = token.cancelled() => return Ok(true),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::SCAN_RESTART_DELAY;
    use crate::testing::{FakeAdapter, FakePeripheral};
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn forwards_discoveries_and_restarts_after_pause() {
        let adapter = Arc::new(FakeAdapter::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scanner = ScanController::new(adapter.clone(), tx, SCAN_RESTART_DELAY);
        let handle = scanner.handle();
        let _task = tokio::spawn(scanner.run());

        adapter.wait_for_scan(1).await;
        adapter.advertise(FakePeripheral::itag("AA:BB"), Some(" iTAG "));
        match rx.recv().await {
            Some(BridgeEvent::Discovered(ad)) => {
                assert_eq!(ad.local_name.as_deref(), Some(" iTAG "));
            }
            _ => panic!("expected a discovery"),
        }

        handle.pause();
        sleep(SCAN_RESTART_DELAY - Duration::from_millis(10)).await;
        assert_eq!(adapter.scan_calls(), 1);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(adapter.scan_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_when_stack_ends_the_scan() {
        let adapter = Arc::new(FakeAdapter::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let scanner = ScanController::new(adapter.clone(), tx, SCAN_RESTART_DELAY);
        let _task = tokio::spawn(scanner.run());

        adapter.wait_for_scan(1).await;
        adapter.end_scan();
        sleep(SCAN_RESTART_DELAY + Duration::from_millis(10)).await;
        assert_eq!(adapter.scan_calls(), 2);
    }

    #[tokio::test]
    async fn pause_without_session_is_harmless() {
        ScanHandle::detached().pause();
    }
}
