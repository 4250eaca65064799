//! Periodic sampler
//!
//! Each tick reschedules its successor before doing any work, so a slow
//! frame capture does not push back the cadence of later ticks. Ticks may
//! therefore start while an earlier one is still capturing. The
//! capture-and-append step itself runs one tick at a time, so frame `n` is
//! always the frame of record `n`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};

use super::scheduler::Scheduler;
use super::TerminationFlag;
use crate::capture::FrameCapture;
use crate::data::{CaptureState, RecordingLog};

pub struct Sampler {
    interval: Duration,
    state: Arc<CaptureState>,
    log: Arc<RecordingLog>,
    capture: Arc<dyn FrameCapture>,
    scheduler: Arc<dyn Scheduler>,
    terminated: TerminationFlag,
    /// Ticks currently executing
    in_flight: AtomicUsize,
    idle: Notify,
    /// Held across capture and append
    record_lock: Mutex<()>,
    /// Ticks whose frame capture failed
    failed_captures: AtomicU64,
}

/// Marks a tick as executing until dropped
struct TickGuard<'a>(&'a Sampler);

impl<'a> TickGuard<'a> {
    fn enter(sampler: &'a Sampler) -> Self {
        sampler.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(sampler)
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Sampler {
    pub fn new(
        interval: Duration,
        state: Arc<CaptureState>,
        log: Arc<RecordingLog>,
        capture: Arc<dyn FrameCapture>,
        scheduler: Arc<dyn Scheduler>,
        terminated: TerminationFlag,
    ) -> Arc<Self> {
        Arc::new(Self {
            interval,
            state,
            log,
            capture,
            scheduler,
            terminated,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            record_lock: Mutex::new(()),
            failed_captures: AtomicU64::new(0),
        })
    }

    /// Fire the first tick immediately
    pub fn start(self: &Arc<Self>) {
        debug!("Sampler starting with interval {:?}", self.interval);
        self.schedule_tick(Duration::ZERO);
    }

    fn schedule_tick(self: &Arc<Self>, delay: Duration) {
        let sampler = Arc::clone(self);
        self.scheduler.schedule(delay, Box::new(move || sampler.tick()));
    }

    /// One tick: stop if terminated, else reschedule, capture, record.
    pub fn tick(self: &Arc<Self>) {
        // Enter before checking the flag so a waiter cannot miss this tick
        let _guard = TickGuard::enter(self);

        if self.terminated.is_set() {
            debug!("Session terminated, sampler not rescheduling");
            return;
        }

        self.schedule_tick(self.interval);
        self.capture_and_record();
    }

    /// Capture a frame and append the current key state. Returns the count
    /// assigned, or None if the capture failed or the log is sealed.
    fn capture_and_record(&self) -> Option<u64> {
        let _record = self.record_lock.lock().unwrap_or_else(|e| e.into_inner());

        // Only this step appends, so the next count cannot move under us
        let Some(frame) = self.log.next_count() else {
            debug!("Recording log sealed, skipping capture");
            return None;
        };

        if let Err(e) = self.capture.capture_frame(frame) {
            self.failed_captures.fetch_add(1, Ordering::Relaxed);
            error!(
                "Frame capture {} via {} failed, skipping record: {:#}",
                frame,
                self.capture.name(),
                e
            );
            return None;
        }

        let snapshot = self.state.snapshot();
        let Some(count) = self.log.append(snapshot) else {
            warn!(
                "Session ended during capture, discarding frame {} via {}",
                frame,
                self.capture.name()
            );
            self.capture.discard_frame(frame);
            return None;
        };
        debug_assert_eq!(count, frame);
        trace!(count, pressed = ?snapshot.pressed_keys().collect::<Vec<_>>(), "sampled");
        Some(count)
    }

    pub fn failed_captures(&self) -> u64 {
        self.failed_captures.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no tick is executing
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NoopFrameCapture;
    use crate::data::{Key, LogDocument, PersistenceWriter, RawKey};
    use crate::input::{EventListener, KeyAction, KeyBindings, ListenerSignal};
    use crate::sync::scheduler::ManualScheduler;

    const INTERVAL: Duration = Duration::from_millis(300);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Frame capture that counts calls, remembers the frames it stored,
    /// and can be told to fail or to seal a log mid-capture
    #[derive(Default)]
    struct CountingCapture {
        calls: AtomicU64,
        fail_on: Mutex<Vec<u64>>,
        seal_on: Mutex<Option<(u64, Arc<RecordingLog>)>>,
        stored: Mutex<Vec<u64>>,
        discarded: Mutex<Vec<u64>>,
    }

    impl FrameCapture for CountingCapture {
        fn capture_frame(&self, frame: u64) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.lock().unwrap().contains(&call) {
                anyhow::bail!("frame {} unavailable", frame);
            }
            if let Some((at, log)) = self.seal_on.lock().unwrap().as_ref() {
                if *at == call {
                    log.seal();
                }
            }
            self.stored.lock().unwrap().push(frame);
            Ok(())
        }

        fn discard_frame(&self, frame: u64) {
            self.stored.lock().unwrap().retain(|f| *f != frame);
            self.discarded.lock().unwrap().push(frame);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct Harness {
        scheduler: Arc<ManualScheduler>,
        state: Arc<CaptureState>,
        log: Arc<RecordingLog>,
        terminated: TerminationFlag,
        sampler: Arc<Sampler>,
    }

    fn harness(capture: Arc<dyn FrameCapture>) -> Harness {
        let scheduler = Arc::new(ManualScheduler::new());
        let state = Arc::new(CaptureState::new());
        let log = Arc::new(RecordingLog::new());
        let terminated = TerminationFlag::new();
        let sampler = Sampler::new(
            INTERVAL,
            state.clone(),
            log.clone(),
            capture,
            scheduler.clone(),
            terminated.clone(),
        );
        Harness {
            scheduler,
            state,
            log,
            terminated,
            sampler,
        }
    }

    #[test]
    fn test_first_tick_is_immediate_and_cadence_is_fixed() {
        let capture = Arc::new(CountingCapture::default());
        let h = harness(capture.clone());
        h.sampler.start();

        assert_eq!(h.scheduler.advance(Duration::ZERO), 1);
        assert_eq!(h.log.len(), 1);

        // t = 300, 600, 900
        h.scheduler.advance(ms(900));
        assert_eq!(h.log.len(), 4);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 4);
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn test_press_then_tick_is_recorded() {
        let h = harness(Arc::new(NoopFrameCapture));
        h.sampler.start();
        h.scheduler.advance(Duration::ZERO);

        h.state.set(Key::Left, true);
        h.scheduler.advance(INTERVAL);
        h.state.set(Key::Left, false);
        h.scheduler.advance(INTERVAL);

        let doc = h.log.document();
        assert_eq!(doc.data.len(), 3);
        assert!(!doc.data[0].presses.is_pressed(Key::Left));
        assert!(doc.data[1].presses.is_pressed(Key::Left));
        assert!(!doc.data[2].presses.is_pressed(Key::Left));
    }

    #[test]
    fn test_termination_stops_rescheduling() {
        let h = harness(Arc::new(NoopFrameCapture));
        h.sampler.start();
        h.scheduler.advance(ms(600));
        assert_eq!(h.log.len(), 3);

        h.terminated.set();
        h.log.seal();
        // The already-scheduled tick fires once, sees the flag, and stops
        assert_eq!(h.scheduler.advance(ms(3000)), 1);
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.log.len(), 3);
        assert_eq!(h.sampler.in_flight(), 0);
    }

    #[test]
    fn test_failed_capture_appends_nothing() {
        let capture = Arc::new(CountingCapture::default());
        capture.fail_on.lock().unwrap().push(2);
        let h = harness(capture.clone());
        h.sampler.start();
        h.scheduler.advance(ms(900));

        // Four ticks, one failed, counts still contiguous
        assert_eq!(capture.calls.load(Ordering::SeqCst), 4);
        assert_eq!(h.sampler.failed_captures(), 1);
        let counts: Vec<u64> = h.log.document().data.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        // The failed number is retried, so every record has its frame
        assert_eq!(*capture.stored.lock().unwrap(), counts);
    }

    #[test]
    fn test_frame_captured_after_seal_is_discarded() {
        let capture = Arc::new(CountingCapture::default());
        let h = harness(capture.clone());
        *capture.seal_on.lock().unwrap() = Some((2, h.log.clone()));
        h.sampler.start();
        h.scheduler.advance(ms(600));

        assert_eq!(h.log.len(), 1);
        assert_eq!(*capture.stored.lock().unwrap(), vec![1]);
        assert_eq!(*capture.discarded.lock().unwrap(), vec![2]);
        // The sealed log stops further captures
        assert_eq!(capture.calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_frames_match_counts_after_a_failure() {
        use crate::capture::CommandFrameCapture;
        use crate::config::CommandCaptureConfig;

        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("fail_once");
        std::fs::write(&flag, b"").unwrap();
        // Fails once, on the call after frame_1 exists
        let script = format!(
            "if [ -e '{dir}/frame_1' ] && [ -e '{flag}' ]; then rm '{flag}'; exit 1; fi; touch '{dir}/frame_{{frame}}'",
            dir = dir.path().display(),
            flag = flag.display(),
        );
        let capture = CommandFrameCapture::new(&CommandCaptureConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script],
        })
        .unwrap();

        let h = harness(Arc::new(capture));
        h.sampler.start();
        h.scheduler.advance(ms(900));

        let counts: Vec<u64> = h.log.document().data.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(h.sampler.failed_captures(), 1);

        let mut frames: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("frame_"))
            .collect();
        frames.sort();
        assert_eq!(frames, vec!["frame_1", "frame_2", "frame_3"]);
    }

    /// Manual test timeline: 0.3s interval,
    /// press x at 0.05s, release at 0.35s, stop at 0.5s.
    #[test]
    fn test_recording_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Arc::new(NoopFrameCapture));
        let writer = Arc::new(PersistenceWriter::new(dir.path().join("log.json")));
        let mut listener = EventListener::new(
            KeyBindings::default(),
            h.state.clone(),
            h.log.clone(),
            writer.clone(),
            h.terminated.clone(),
        );

        h.sampler.start();
        h.scheduler.advance_to(ms(0));
        h.scheduler.advance_to(ms(50));
        listener.handle(&KeyAction::Press(RawKey::char('x')));
        listener.handle(&KeyAction::Press(RawKey::char('q')));
        h.scheduler.advance_to(ms(350));
        listener.handle(&KeyAction::Release(RawKey::char('x')));
        h.scheduler.advance_to(ms(500));
        let signal = listener.handle(&KeyAction::Release(RawKey::named("esc")));
        let saved = match signal {
            ListenerSignal::Stop(Ok(saved)) => saved,
            other => panic!("expected a clean stop, got {:?}", other),
        };

        // Nothing scheduled after termination appends
        h.scheduler.advance_to(ms(5000));
        assert_eq!(h.scheduler.pending(), 0);

        let doc = LogDocument::load(&saved.path).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc, h.log.document());
        assert!(doc.data.iter().any(|r| r.presses.is_pressed(Key::X)));
        assert!(!doc.data[0].presses.is_pressed(Key::X));
        assert!(doc.data[1].presses.is_pressed(Key::X));
        assert!(writer.has_saved());
    }

    /// Capture slower than the interval, tracking how many run at once
    #[derive(Default)]
    struct SlowCapture {
        active: AtomicUsize,
        max_active: AtomicUsize,
        stored: Mutex<Vec<u64>>,
    }

    impl FrameCapture for SlowCapture {
        fn capture_frame(&self, frame: u64) -> anyhow::Result<()> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            std::thread::sleep(ms(15));
            self.stored.lock().unwrap().push(frame);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn discard_frame(&self, frame: u64) {
            self.stored.lock().unwrap().retain(|f| *f != frame);
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_ticks_with_slow_capture() {
        use crate::sync::scheduler::TokioScheduler;

        let capture = Arc::new(SlowCapture::default());
        let log = Arc::new(RecordingLog::new());
        let terminated = TerminationFlag::new();
        let sampler = Sampler::new(
            ms(5),
            Arc::new(CaptureState::new()),
            log.clone(),
            capture.clone(),
            Arc::new(TokioScheduler::current().unwrap()),
            terminated.clone(),
        );
        sampler.start();
        tokio::time::sleep(ms(100)).await;

        terminated.set();
        let sealed = log.seal();
        sampler.wait_idle().await;
        assert_eq!(sampler.in_flight(), 0);

        let counts: Vec<u64> = sealed.data.iter().map(|r| r.count).collect();
        assert!(!counts.is_empty());
        assert_eq!(counts, (1..=counts.len() as u64).collect::<Vec<_>>());
        assert_eq!(*capture.stored.lock().unwrap(), counts);
        assert_eq!(capture.max_active.load(Ordering::SeqCst), 1);

        tokio::time::sleep(ms(40)).await;
        assert_eq!(log.len(), counts.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_idle_returns_once_ticks_finish() {
        use crate::sync::scheduler::TokioScheduler;

        let state = Arc::new(CaptureState::new());
        let log = Arc::new(RecordingLog::new());
        let terminated = TerminationFlag::new();
        let sampler = Sampler::new(
            ms(5),
            state,
            log.clone(),
            Arc::new(NoopFrameCapture),
            Arc::new(TokioScheduler::current().unwrap()),
            terminated.clone(),
        );
        sampler.start();
        tokio::time::sleep(ms(60)).await;

        terminated.set();
        log.seal();
        sampler.wait_idle().await;
        assert_eq!(sampler.in_flight(), 0);

        let len = log.len();
        assert!(len >= 1);
        tokio::time::sleep(ms(30)).await;
        assert_eq!(log.len(), len);
    }
}
