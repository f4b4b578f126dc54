use crate::config::MonitorConfig;
use crate::services::camera_service::CameraService;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Sweeping,
    /// Terminal; a stopped monitor cannot be restarted
    Cancelled,
}

/// Runs a status sweep over all cameras, then waits `interval`, until stopped
pub struct StatusMonitor {
    service: Arc<CameraService>,
    interval: Duration,
    token: CancellationToken,
    state_tx: Arc<watch::Sender<MonitorState>>,
    state_rx: watch::Receiver<MonitorState>,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    pub fn new(service: Arc<CameraService>, interval: Duration) -> Self {
        let (state_tx, state_rx) = watch::channel(MonitorState::Idle);
        Self {
            service,
            interval,
            token: CancellationToken::new(),
            state_tx: Arc::new(state_tx),
            state_rx,
            handle: None,
        }
    }

    pub fn from_config(service: Arc<CameraService>, config: &MonitorConfig) -> Self {
        Self::new(service, Duration::from_secs(config.check_interval_secs))
    }

    pub fn state(&self) -> MonitorState {
        *self.state_rx.borrow()
    }

    /// Spawn the sweep loop. Calling it again, or after `stop`, does nothing.
    pub fn start(&mut self) {
        if self.handle.is_some() || self.token.is_cancelled() {
            warn!("Status monitor already started");
            return;
        }

        info!(
            "Starting status monitor with interval of {} seconds",
            self.interval.as_secs()
        );

        let service = Arc::clone(&self.service);
        let token = self.token.clone();
        let state_tx = Arc::clone(&self.state_tx);
        let interval = self.interval;

        self.handle = Some(tokio::spawn(async move {
            run_loop(service, interval, token, &state_tx).await;
            state_tx.send_replace(MonitorState::Cancelled);
            info!("Status monitor stopped");
        }));
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(&mut self) {
        self.token.cancel();
        match self.handle.take() {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Status monitor task ended abnormally: {}", e);
                }
            }
            None => {
                self.state_tx.send_replace(MonitorState::Cancelled);
            }
        }
    }
}

async fn run_loop(
    service: Arc<CameraService>,
    interval: Duration,
    token: CancellationToken,
    state_tx: &watch::Sender<MonitorState>,
) {
    loop {
        state_tx.send_replace(MonitorState::Sweeping);

        // A panicking sweep surfaces as a JoinError instead of ending the loop
        let sweep_service = Arc::clone(&service);
        let mut sweep = tokio::spawn(async move { sweep_service.check_all().await });

        tokio::select! {
            result = &mut sweep => match result {
                Ok(report) => report.log(),
                Err(e) => error!("Status sweep task failed: {}", e),
            },
            _ = token.cancelled() => {
                sweep.abort();
                return;
            }
        }

        state_tx.send_replace(MonitorState::Idle);

        tokio::select! {
            _ = sleep(interval) => {}
            _ = token.cancelled() => return,
        }
    }
}
