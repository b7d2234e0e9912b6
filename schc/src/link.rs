//! Link-layer capability injected by the host.
//!
//! The engine never touches a radio or a clock directly: transmitting a
//! frame and arming a timer are delegated to the [`LinkLayer`] trait.
//! The state machine exits after every send or schedule call; the host
//! re-enters it when the timer fires or data arrives. Tests supply
//! [`CaptureLink`] for a deterministic view of both.

use crate::config::MAX_MTU_LENGTH;
use crate::error::{Error, Result};

/// The two logical timers of the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Spacing between successive fragments, per link duty-cycle rules.
    DutyCycle,

    /// Armed while an acknowledgement is awaited.
    Retransmit,
}

/// Capabilities the host lends to the engine.
pub trait LinkLayer {
    /// Transmits one frame to the peer identified by `device_id`.
    fn send(&mut self, frame: &[u8], device_id: u32) -> Result<()>;

    /// Arms a one-shot timer; the host calls back into the engine when
    /// it fires. Re-arming an already armed timer restarts it.
    fn schedule(&mut self, timer: TimerKind, delay_ms: u32);

    /// Disarms a timer. Cancelling an idle timer is a no-op.
    fn cancel(&mut self, timer: TimerKind);
}

/// One frame recorded by [`CaptureLink`].
#[derive(Debug, Clone, Default)]
pub struct CapturedFrame {
    /// Frame bytes as they would appear on the link.
    pub data: heapless::Vec<u8, MAX_MTU_LENGTH>,

    /// Destination device.
    pub device_id: u32,
}

/// A capturing link for tests and examples.
///
/// Records every transmitted frame and the most recently armed timer so
/// a test harness can pump the state machine deterministically.
#[derive(Debug, Default)]
pub struct CaptureLink {
    frames: heapless::Vec<CapturedFrame, 64>,
    armed: Option<(TimerKind, u32)>,
    cancelled: Option<TimerKind>,
}

impl CaptureLink {
    /// Creates an empty capture link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames captured so far, oldest first.
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// Takes all captured frames, leaving the log empty.
    pub fn take_frames(&mut self) -> heapless::Vec<CapturedFrame, 64> {
        core::mem::take(&mut self.frames)
    }

    /// The currently armed timer, if any.
    pub fn armed_timer(&self) -> Option<TimerKind> {
        self.armed.map(|(kind, _)| kind)
    }

    /// The delay of the currently armed timer.
    pub fn armed_delay_ms(&self) -> Option<u32> {
        self.armed.map(|(_, delay)| delay)
    }

    /// Fires the armed timer, disarming it.
    pub fn fire(&mut self) -> Option<TimerKind> {
        self.armed.take().map(|(kind, _)| kind)
    }

    /// The timer most recently cancelled by the engine.
    pub fn last_cancelled(&self) -> Option<TimerKind> {
        self.cancelled
    }

    /// Clears frames and timer records.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.armed = None;
        self.cancelled = None;
    }
}

impl LinkLayer for CaptureLink {
    fn send(&mut self, frame: &[u8], device_id: u32) -> Result<()> {
        let mut data = heapless::Vec::new();
        data.extend_from_slice(frame)
            .map_err(|_| Error::BufferTooSmall)?;
        self.frames
            .push(CapturedFrame { data, device_id })
            .map_err(|_| Error::BufferTooSmall)
    }

    fn schedule(&mut self, timer: TimerKind, delay_ms: u32) {
        self.armed = Some((timer, delay_ms));
    }

    fn cancel(&mut self, timer: TimerKind) {
        if self.armed.map(|(kind, _)| kind) == Some(timer) {
            self.armed = None;
        }
        self.cancelled = Some(timer);
    }
}

/// A link that drops every frame, counting what it discarded.
#[derive(Debug, Default)]
pub struct NullLink {
    frames_dropped: usize,
}

impl NullLink {
    /// Creates a null link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames swallowed so far.
    pub const fn frames_dropped(&self) -> usize {
        self.frames_dropped
    }
}

impl LinkLayer for NullLink {
    fn send(&mut self, _frame: &[u8], _device_id: u32) -> Result<()> {
        self.frames_dropped += 1;
        Ok(())
    }

    fn schedule(&mut self, _timer: TimerKind, _delay_ms: u32) {}

    fn cancel(&mut self, _timer: TimerKind) {}
}
