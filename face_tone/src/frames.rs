//! Frame source and the single-flight slot between it and the tracker.
//!
//! The source pushes frames at its own cadence.  The [`FrameSlot`] lets at
//! most one detection run at a time: frames offered while a detection is in
//! flight are dropped, and while idle only the newest frame is kept.  Nothing
//! queues up behind a slow tracker.
//!
//! ```text
//!             offer()                 take()              finish()
//!   source ──────────► [ Idle ] ─────────────► [ Detecting ] ────────► [ Idle ]
//!                       pending: latest only     offers dropped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::Result;

// ════════════════════════════════════════════════════════════════════════════
// Frame
// ════════════════════════════════════════════════════════════════════════════

/// One video frame as handed to the landmark provider.
///
/// `pixels` is opaque to everything but the provider; synthetic sources
/// leave it empty.
#[derive(Clone, Debug)]
pub struct Frame {
    pub seq:      u64,
    pub width:    u32,
    pub height:   u32,
    /// Time since the source started.
    pub captured: Duration,
    pub pixels:   Arc<[u8]>,
}

impl Frame {
    pub fn blank(seq: u64, width: u32, height: u32, captured: Duration) -> Self {
        Frame { seq, width, height, captured, pixels: Arc::from(Vec::<u8>::new()) }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FrameSlot — single-flight gate
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState { Idle, Detecting }

/// What happened to an offered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Waiting for the next detection.
    Accepted,
    /// Took the place of an older pending frame.
    Replaced,
    /// A detection is in flight; frame discarded.
    Dropped,
    /// The cycle has shut down.
    Closed,
}

#[derive(Debug)]
struct SlotInner {
    state:   CycleState,
    pending: Option<Frame>,
    closed:  bool,
    dropped: u64,
}

#[derive(Debug)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
    ready: Condvar,
}

impl Default for FrameSlot {
    fn default() -> Self {
        FrameSlot {
            inner: Mutex::new(SlotInner {
                state:   CycleState::Idle,
                pending: None,
                closed:  false,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }
}

impl FrameSlot {
    pub fn new() -> Arc<Self> { Arc::new(FrameSlot::default()) }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a frame to the cycle.
    pub fn offer(&self, frame: Frame) -> Offer {
        let mut inner = self.lock();
        if inner.closed {
            return Offer::Closed;
        }
        match inner.state {
            CycleState::Detecting => {
                inner.dropped += 1;
                Offer::Dropped
            }
            CycleState::Idle => {
                let outcome = if inner.pending.replace(frame).is_some() {
                    inner.dropped += 1;
                    Offer::Replaced
                } else {
                    Offer::Accepted
                };
                self.ready.notify_one();
                outcome
            }
        }
    }

    /// Block until a frame is pending, then enter `Detecting`.
    /// Returns `None` once the slot is closed.
    pub fn take(&self) -> Option<Frame> {
        let mut inner = self.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(frame) = inner.pending.take() {
                inner.state = CycleState::Detecting;
                return Some(frame);
            }
            inner = self.ready.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`take`](Self::take) but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(frame) = inner.pending.take() {
                inner.state = CycleState::Detecting;
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            inner = self.ready.wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner).0;
        }
    }

    /// The in-flight cycle is complete; accept frames again.
    pub fn finish(&self) {
        self.lock().state = CycleState::Idle;
    }

    /// Stop the cycle and wake any waiter.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.pending = None;
        self.ready.notify_all();
    }

    pub fn state(&self) -> CycleState { self.lock().state }
    pub fn is_closed(&self) -> bool { self.lock().closed }
    /// Frames discarded so far, by drop or replacement.
    pub fn dropped(&self) -> u64 { self.lock().dropped }
}

// ════════════════════════════════════════════════════════════════════════════
// FrameSource trait — unified interface for cameras and timers
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can push frames into a [`FrameSlot`].
pub trait FrameSource {
    fn start(&mut self, slot: Arc<FrameSlot>) -> Result<()>;
    fn stop(&mut self);
    /// Pixel dimensions of the frames produced.
    fn dimensions(&self) -> (u32, u32);
}

// ════════════════════════════════════════════════════════════════════════════
// TimerFrameSource — blank frames at a fixed rate
// ════════════════════════════════════════════════════════════════════════════

/// Emits blank frames at `fps`, standing in for a camera when the provider
/// does not look at pixels (simulation and replay).
pub struct TimerFrameSource {
    width:   u32,
    height:  u32,
    period:  Duration,
    running: Arc<AtomicBool>,
    thread:  Option<JoinHandle<()>>,
}

impl TimerFrameSource {
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        TimerFrameSource {
            width,
            height,
            period:  Duration::from_secs_f32(1.0 / fps.max(0.1)),
            running: Arc::new(AtomicBool::new(false)),
            thread:  None,
        }
    }
}

impl FrameSource for TimerFrameSource {
    fn start(&mut self, slot: Arc<FrameSlot>) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let (width, height, period) = (self.width, self.height, self.period);

        let handle = thread::Builder::new()
            .name("frame-source".into())
            .spawn(move || {
                let t0 = Instant::now();
                let mut seq = 0u64;
                let mut next = t0;
                while running.load(Ordering::SeqCst) {
                    let frame = Frame::blank(seq, width, height, t0.elapsed());
                    match slot.offer(frame) {
                        Offer::Closed  => break,
                        Offer::Dropped => tracing::trace!(seq, "frame dropped; detection in flight"),
                        _ => {}
                    }
                    seq += 1;
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        // Fell behind: restart the schedule rather than burst.
                        next = now;
                    }
                }
                tracing::debug!(frames = seq, "frame source stopped");
            })?;

        tracing::debug!(width, height, period_ms = period.as_millis() as u64, "frame source started");
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }

    fn dimensions(&self) -> (u32, u32) { (self.width, self.height) }
}

impl Drop for TimerFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
