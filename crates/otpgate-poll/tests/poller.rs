//! Integration tests for the OTP status poller.
//!
//! All tests run with paused, auto-advancing time, so fetch timestamps are
//! exact and a test can "wait" minutes instantly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use otpgate_poll::{OtpPoller, PollerConfig, PollerHandle, PollerPhase, StatusSource, Urgency};
use otpgate_protocol::{ErrorCode, Failure, OtpStatus, SessionId};
use tokio::time::{Instant, sleep};

// =========================================================================
// Mock source: scripted answers, records fetch starts and concurrency.
// =========================================================================

#[derive(Default)]
struct MockState {
    queued: VecDeque<Result<Option<OtpStatus>, Failure>>,
    fallback: Option<OtpStatus>,
    latency: Duration,
    starts: Vec<(Instant, SessionId)>,
    in_flight: u32,
    max_in_flight: u32,
    completed: u32,
}

#[derive(Clone, Default)]
struct MockSource(Arc<Mutex<MockState>>);

/// Decrements `in_flight` even when the fetch future is dropped mid-way.
struct InFlight(Arc<Mutex<MockState>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().unwrap().in_flight -= 1;
    }
}

impl MockSource {
    fn new(fallback: Option<OtpStatus>, latency: Duration) -> Self {
        let source = Self::default();
        {
            let mut state = source.0.lock().unwrap();
            state.fallback = fallback;
            state.latency = latency;
        }
        source
    }

    fn queue(&self, answer: Result<Option<OtpStatus>, Failure>) -> &Self {
        self.0.lock().unwrap().queued.push_back(answer);
        self
    }

    fn starts_ms(&self, origin: Instant) -> Vec<u128> {
        self.0
            .lock()
            .unwrap()
            .starts
            .iter()
            .map(|(at, _)| at.duration_since(origin).as_millis())
            .collect()
    }

    fn ids(&self) -> Vec<SessionId> {
        self.0
            .lock()
            .unwrap()
            .starts
            .iter()
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn fetch_count(&self) -> usize {
        self.0.lock().unwrap().starts.len()
    }
}

impl StatusSource for MockSource {
    async fn fetch_status(&self, session_id: &SessionId) -> Result<Option<OtpStatus>, Failure> {
        let latency = {
            let mut state = self.0.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.starts.push((Instant::now(), session_id.clone()));
            state.latency
        };
        let _in_flight = InFlight(Arc::clone(&self.0));

        if !latency.is_zero() {
            sleep(latency).await;
        }

        let mut state = self.0.lock().unwrap();
        state.completed += 1;
        match state.queued.pop_front() {
            Some(answer) => answer,
            None => Ok(state.fallback.clone()),
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn active(remaining_seconds: i64) -> OtpStatus {
    OtpStatus {
        otp_active: true,
        otp_initiated: true,
        remaining_seconds,
        remaining_minutes: remaining_seconds / 60,
        max_attempts: 3,
        remaining_attempts: 3,
        ..OtpStatus::default()
    }
}

fn sid(id: &str) -> Option<SessionId> {
    Some(SessionId::new(id))
}

fn spawn(source: &MockSource) -> PollerHandle {
    OtpPoller::spawn(source.clone(), PollerConfig::default())
}

// =========================================================================
// Cadence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_fetch_is_immediate() {
    let source = MockSource::new(Some(active(300)), Duration::ZERO);
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("s-1"));
    let mut view = poller.subscribe();
    view.wait_for(|v| v.fetches == 1).await.unwrap();

    assert_eq!(source.starts_ms(origin), vec![0]);
    let current = poller.current();
    assert_eq!(current.session_id, sid("s-1"));
    assert_eq!(current.urgency, Some(Urgency::Normal));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cadence_speeds_up_as_expiry_nears() {
    let source = MockSource::new(Some(active(45)), Duration::ZERO);
    source.queue(Ok(Some(active(200)))).queue(Ok(Some(active(45))));
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(3_200)).await;

    // 200s left → 2000ms; 45s left → 500ms, held back to the 1000ms floor.
    assert_eq!(source.starts_ms(origin), vec![0, 2_000, 3_000]);

    let view = poller.current();
    assert_eq!(view.status.as_ref().map(|s| s.remaining_seconds), Some(45));
    assert_eq!(view.urgency, Some(Urgency::Urgent));
    assert_eq!(
        view.phase,
        PollerPhase::Waiting {
            delay: Duration::from_millis(500)
        }
    );

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_warning_window_polls_every_second() {
    let source = MockSource::new(Some(active(120)), Duration::ZERO);
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(3_500)).await;

    assert_eq!(source.starts_ms(origin), vec![0, 1_000, 2_000, 3_000]);
    assert_eq!(poller.current().urgency, Some(Urgency::Warning));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_active_otp_polls_every_five_seconds() {
    let source = MockSource::new(None, Duration::ZERO);
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(10_500)).await;

    assert_eq!(source.starts_ms(origin), vec![0, 5_000, 10_000]);
    let view = poller.current();
    assert_eq!(view.status, None);
    assert_eq!(view.urgency, None);
    assert_eq!(view.fetches, 3);
    assert_eq!(
        view.phase,
        PollerPhase::Waiting {
            delay: Duration::from_secs(5)
        }
    );

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetches_never_overlap_and_respect_floor() {
    let source = MockSource::new(Some(active(20)), Duration::from_millis(1_500));
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("s-1"));
    sleep(Duration::from_secs(10)).await;

    let starts = source.starts_ms(origin);
    assert!(starts.len() >= 4, "got {starts:?}");
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= 1_000, "fetches too close: {starts:?}");
    }
    assert_eq!(source.0.lock().unwrap().max_in_flight, 1);
    assert_eq!(poller.current().urgency, Some(Urgency::Critical));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_last_status_and_cadence() {
    let source = MockSource::new(Some(active(200)), Duration::ZERO);
    source
        .queue(Ok(Some(active(200))))
        .queue(Err(Failure::technical(ErrorCode::NetworkError, "offline")));
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(2_100)).await;

    let view = poller.current();
    assert_eq!(view.fetches, 2);
    assert_eq!(view.status.as_ref().map(|s| s.remaining_seconds), Some(200));
    assert_eq!(
        view.last_error.as_ref().map(Failure::code),
        Some(ErrorCode::NetworkError)
    );
    assert_eq!(
        view.phase,
        PollerPhase::Waiting {
            delay: Duration::from_secs(2)
        }
    );

    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(source.starts_ms(origin), vec![0, 2_000, 4_000]);
    assert_eq!(poller.current().last_error, None);

    poller.shutdown().await;
}

// =========================================================================
// Session binding
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unbinding_cancels_in_flight_fetch() {
    let source = MockSource::new(Some(active(100)), Duration::from_secs(1));
    let poller = spawn(&source);

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.0.lock().unwrap().in_flight, 1);

    poller.set_session(None);
    sleep(Duration::from_secs(10)).await;

    let state = source.0.lock().unwrap();
    assert_eq!(state.starts.len(), 1, "no trailing fetch");
    assert_eq!(state.completed, 0);
    assert_eq!(state.in_flight, 0);
    drop(state);

    let view = poller.current();
    assert_eq!(view.phase, PollerPhase::Idle);
    assert_eq!(view.session_id, None);
    assert_eq!(view.fetches, 0);

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unbinding_clears_published_status() {
    let source = MockSource::new(Some(active(100)), Duration::ZERO);
    let poller = spawn(&source);

    poller.set_session(sid("s-1"));
    let mut view = poller.subscribe();
    view.wait_for(|v| v.status.is_some()).await.unwrap();

    poller.set_session(None);
    view.wait_for(|v| v.session_id.is_none()).await.unwrap();
    let fetched = source.fetch_count();
    sleep(Duration::from_secs(30)).await;

    let current = poller.current();
    assert_eq!(current.status, None);
    assert_eq!(current.urgency, None);
    assert_eq!(current.phase, PollerPhase::Idle);
    assert_eq!(source.fetch_count(), fetched);

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_switching_session_discards_previous_fetch() {
    let source = MockSource::new(Some(active(300)), Duration::from_secs(1));
    source.queue(Ok(Some(active(100))));
    let poller = spawn(&source);
    let origin = Instant::now();

    poller.set_session(sid("old"));
    sleep(Duration::from_millis(500)).await;
    poller.set_session(sid("new"));
    sleep(Duration::from_millis(1_600)).await;

    // The old fetch was dropped before it answered; the new one waits out
    // the floor measured from the old fetch's start.
    assert_eq!(source.ids(), vec![SessionId::new("old"), SessionId::new("new")]);
    assert_eq!(source.starts_ms(origin), vec![0, 1_000]);

    let view = poller.current();
    assert_eq!(view.session_id, sid("new"));
    assert_eq!(view.fetches, 1);
    assert_eq!(view.status.map(|s| s.remaining_seconds), Some(100));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rebinding_same_session_is_noop() {
    let source = MockSource::new(None, Duration::ZERO);
    let poller = spawn(&source);

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(100)).await;
    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(1_400)).await;

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(poller.session(), sid("s-1"));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_poller_never_fetches() {
    let source = MockSource::new(Some(active(100)), Duration::ZERO);
    let poller = spawn(&source);

    sleep(Duration::from_secs(60)).await;

    assert_eq!(source.fetch_count(), 0);
    assert_eq!(poller.current().phase, PollerPhase::Idle);
    poller.shutdown().await;
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling() {
    let source = MockSource::new(Some(active(30)), Duration::ZERO);
    let poller = spawn(&source);

    poller.set_session(sid("s-1"));
    sleep(Duration::from_millis(10)).await;
    assert!(poller.is_running());

    poller.shutdown().await;
    poller.shutdown().await;
    assert!(!poller.is_running());

    let fetched = source.fetch_count();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(source.fetch_count(), fetched);
    assert_eq!(poller.current().phase, PollerPhase::Idle);
}
