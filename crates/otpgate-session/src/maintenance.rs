//! Background session maintenance.
//!
//! One task per manager. It re-validates the session on a fixed period
//! and reacts to [`HostSignal`]s. It holds only a `Weak` reference to the
//! manager, so dropping every manager handle also ends the task.

use std::sync::Weak;
use std::time::Duration;

use otpgate_transport::Transport;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::manager::Inner;
use crate::{HostSignal, SessionEvent, SessionManager};

/// Pending host signals before `signal()` reports the queue as full.
const SIGNAL_CAPACITY: usize = 16;

pub(crate) struct MaintenanceHandle {
    stop: oneshot::Sender<()>,
    pub(crate) signals: mpsc::Sender<HostSignal>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stops the task and waits for it to finish.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "session maintenance task ended abnormally");
        }
    }
}

pub(crate) fn spawn<T: Transport>(inner: Weak<Inner<T>>, period: Duration) -> MaintenanceHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
    let task = tokio::spawn(run(inner, period, stop_rx, signal_rx));
    MaintenanceHandle {
        stop: stop_tx,
        signals: signal_tx,
        task,
    }
}

async fn run<T: Transport>(
    inner: Weak<Inner<T>>,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
    mut signals: mpsc::Receiver<HostSignal>,
) {
    debug!(period_ms = period.as_millis() as u64, "session maintenance started");

    // First tick one full period from now, not immediately.
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let signal = tokio::select! {
            // Fires on an explicit stop and when the handle is dropped.
            _ = &mut stop => break,
            _ = ticker.tick() => None,
            Some(signal) = signals.recv() => Some(signal),
        };

        let Some(manager) = SessionManager::upgrade(&inner) else {
            break;
        };

        match signal {
            None => {
                trace!("periodic session re-validation");
                manager.validate_session().await;
            }
            Some(HostSignal::VisibilityRegained) => {
                debug!("host visible again, re-validating session");
                manager.validate_session().await;
            }
            Some(HostSignal::Online) => {
                debug!("connection restored");
                manager.events().emit(SessionEvent::ConnectionRestored);
                manager.validate_session().await;
            }
            Some(HostSignal::Offline) => {
                debug!("connection lost");
                manager.events().emit(SessionEvent::ConnectionLost);
            }
        }
    }

    debug!("session maintenance stopped");
}
