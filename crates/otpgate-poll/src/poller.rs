//! The polling task and its handle.
//!
//! One task per poller. At any moment it is in exactly one
//! [`PollerPhase`], holds at most one in-flight fetch and at most one
//! pending sleep, and watches the bound session id. A change of session
//! drops both the fetch and the sleep before anything else happens.

use std::sync::Mutex;

use otpgate_protocol::{OtpStatus, SessionId};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::{PollerConfig, PollerPhase, PollerView, StatusSource, Urgency};

/// Entry point: spawns a poller task.
pub struct OtpPoller;

impl OtpPoller {
    /// Spawns the polling task, initially idle.
    pub fn spawn<S: StatusSource>(source: S, config: PollerConfig) -> PollerHandle {
        let config = config.validated();
        let (session_tx, session_rx) = watch::channel(None);
        let (view_tx, view_rx) = watch::channel(PollerView::default());
        let (stop_tx, stop_rx) = oneshot::channel();

        debug!(
            floor_ms = config.min_fetch_gap.as_millis() as u64,
            "OTP poller started"
        );
        let task = tokio::spawn(run(source, config, session_rx, view_tx, stop_rx));

        PollerHandle {
            session_tx,
            view_rx,
            task: Mutex::new(Some((stop_tx, task))),
        }
    }
}

/// Controls a running poller and reads what it publishes.
///
/// Dropping the handle stops the task.
pub struct PollerHandle {
    session_tx: watch::Sender<Option<SessionId>>,
    view_rx: watch::Receiver<PollerView>,
    task: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl PollerHandle {
    /// Binds the poller to `session_id`, or unbinds it with `None`.
    ///
    /// Setting the id that is already bound is a no-op.
    pub fn set_session(&self, session_id: Option<SessionId>) {
        self.session_tx.send_if_modified(|current| {
            if *current == session_id {
                return false;
            }
            *current = session_id;
            true
        });
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session_tx.borrow().clone()
    }

    /// A receiver that is notified after every published change.
    pub fn subscribe(&self) -> watch::Receiver<PollerView> {
        self.view_rx.clone()
    }

    /// The latest published view.
    pub fn current(&self) -> PollerView {
        self.view_rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Stops the task and waits for it to finish. Only the first call
    /// does anything.
    pub async fn shutdown(&self) {
        let taken = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some((stop, task)) = taken {
            let _ = stop.send(());
            let _ = task.await;
            debug!("OTP poller stopped");
        }
    }
}

/// Why a fetch or sleep was interrupted.
enum Interrupt {
    Stop,
    SessionChanged,
}

async fn run<S: StatusSource>(
    source: S,
    config: PollerConfig,
    mut session_rx: watch::Receiver<Option<SessionId>>,
    view_tx: watch::Sender<PollerView>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut last_fetch: Option<Instant> = None;

    'session: loop {
        let bound = session_rx.borrow_and_update().clone();

        let session_id = match bound {
            Some(id) => id,
            None => {
                view_tx.send_modify(|v| {
                    v.session_id = None;
                    v.status = None;
                    v.urgency = None;
                    v.last_error = None;
                    v.phase = PollerPhase::Idle;
                });
                trace!("poller idle");
                tokio::select! {
                    _ = &mut stop => break 'session,
                    changed = session_rx.changed() => {
                        if changed.is_err() {
                            break 'session;
                        }
                    }
                }
                continue 'session;
            }
        };

        debug!(%session_id, "polling OTP status");
        view_tx.send_modify(|v| {
            v.session_id = Some(session_id.clone());
            v.status = None;
            v.urgency = None;
            v.last_error = None;
        });
        let mut current: Option<OtpStatus> = None;

        loop {
            // Hold the floor between fetch starts.
            if let Some(previous) = last_fetch {
                let earliest = previous + config.min_fetch_gap;
                if earliest > Instant::now() {
                    let interrupted = tokio::select! {
                        _ = &mut stop => Some(Interrupt::Stop),
                        changed = session_rx.changed() => Some(match changed {
                            Ok(()) => Interrupt::SessionChanged,
                            Err(_) => Interrupt::Stop,
                        }),
                        _ = time::sleep_until(earliest) => None,
                    };
                    match interrupted {
                        Some(Interrupt::Stop) => break 'session,
                        Some(Interrupt::SessionChanged) => continue 'session,
                        None => {}
                    }
                }
            }

            view_tx.send_modify(|v| v.phase = PollerPhase::Fetching);
            last_fetch = Some(Instant::now());

            let result = tokio::select! {
                _ = &mut stop => break 'session,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break 'session;
                    }
                    trace!("session changed mid-fetch, dropping it");
                    continue 'session;
                }
                result = source.fetch_status(&session_id) => result,
            };

            match result {
                Ok(status) => {
                    current = status;
                    let urgency = current
                        .as_ref()
                        .map(|s| Urgency::from_remaining(s.remaining_seconds));
                    trace!(
                        active = current.as_ref().is_some_and(|s| s.otp_active),
                        remaining = ?current.as_ref().map(|s| s.remaining_seconds),
                        "OTP status fetched"
                    );
                    view_tx.send_modify(|v| {
                        v.status = current.clone();
                        v.urgency = urgency;
                        v.last_error = None;
                        v.fetches += 1;
                    });
                }
                Err(failure) => {
                    // Keep the last good status; the cadence follows it.
                    debug!(code = %failure.code(), "OTP status fetch failed");
                    view_tx.send_modify(|v| {
                        v.last_error = Some(failure);
                        v.fetches += 1;
                    });
                }
            }

            let delay = config.next_delay(current.as_ref());
            view_tx.send_modify(|v| v.phase = PollerPhase::Waiting { delay });
            trace!(delay_ms = delay.as_millis() as u64, "next OTP status fetch scheduled");

            tokio::select! {
                _ = &mut stop => break 'session,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break 'session;
                    }
                    continue 'session;
                }
                _ = time::sleep(delay) => {}
            }
        }
    }

    view_tx.send_modify(|v| v.phase = PollerPhase::Idle);
    trace!("poller task exiting");
}
