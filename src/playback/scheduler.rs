//! Gapless playback scheduling
//!
//! Received audio buffers are pinned to a monotone timeline: each unit starts
//! exactly where the previous one ends, so consecutive buffers are seamless.
//! The cursor re-anchors to `now + lookahead` only when the device clock has
//! already passed it, and a barge-in tears the whole timeline down in one
//! call.

use crate::audio::AudioFrame;

/// State of the playback scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing scheduled
    Idle,
    /// Units queued on the timeline
    Scheduling,
    /// Halted by barge-in, waiting for the next turn's audio
    Interrupted,
}

/// One playback unit pinned to the shared timeline
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledUnit {
    /// Monotone unit id within this scheduler
    pub id: u64,
    /// Start offset on the device timeline, in seconds
    pub start: f64,
    /// Unit length in seconds
    pub duration: f64,
}

impl ScheduledUnit {
    /// End offset on the device timeline, in seconds.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A decoded buffer together with its timeline slot
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAudio {
    pub unit: ScheduledUnit,
    pub samples: Vec<i16>,
}

/// Schedules received audio buffers onto a gapless timeline
///
/// Pure bookkeeping: the caller supplies the device clock and forwards the
/// returned units to an [`super::AudioSink`]. Per-session state; never shared
/// across sessions.
#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    lookahead_secs: f64,
    state: SchedulerState,
    next_play_time: Option<f64>,
    active: Vec<ScheduledUnit>,
    next_unit_id: u64,
}

impl PlaybackScheduler {
    /// Create a scheduler for `sample_rate` audio with the given lookahead.
    ///
    /// The lookahead is the headroom granted to a fresh or re-anchored
    /// timeline; tens of milliseconds absorbs delivery jitter without
    /// noticeable latency.
    #[must_use]
    pub const fn new(sample_rate: u32, lookahead_secs: f64) -> Self {
        Self {
            sample_rate,
            lookahead_secs,
            state: SchedulerState::Idle,
            next_play_time: None,
            active: Vec::new(),
            next_unit_id: 0,
        }
    }

    /// Place one received PCM16 buffer on the timeline.
    ///
    /// `now` is the current device time in seconds. Returns the scheduled
    /// unit plus the decoded samples for the sink, or `None` when the buffer
    /// is undecodable or empty; a skipped buffer never advances the cursor,
    /// so the timeline resumes from the next valid one.
    pub fn schedule(&mut self, payload: &[u8], now: f64) -> Option<ScheduledAudio> {
        let frame = match AudioFrame::from_le_bytes(payload, self.sample_rate) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(len = payload.len(), error = %e, "skipping undecodable buffer");
                return None;
            }
        };
        if frame.is_empty() {
            tracing::trace!("skipping empty buffer");
            return None;
        }

        let start = match self.next_play_time {
            // Still ahead of the device clock: chain exactly, no gap.
            Some(cursor) if cursor >= now => cursor,
            Some(cursor) => {
                tracing::trace!(
                    behind_secs = now - cursor,
                    "device clock passed cursor, re-anchoring"
                );
                now + self.lookahead_secs
            }
            None => now + self.lookahead_secs,
        };

        let unit = ScheduledUnit {
            id: self.next_unit_id,
            start,
            duration: frame.duration_secs(),
        };
        self.next_unit_id += 1;
        self.next_play_time = Some(unit.end());
        self.active.push(unit.clone());
        self.state = SchedulerState::Scheduling;

        Some(ScheduledAudio {
            unit,
            samples: frame.samples,
        })
    }

    /// Halt playback for a barge-in.
    ///
    /// Every queued unit is invalidated in this one call and the cursor is
    /// cleared, so the next turn's audio re-anchors at `now + lookahead`.
    /// Returns the ids of the units that were dropped; calling again without
    /// new audio is a no-op.
    pub fn interrupt(&mut self) -> Vec<u64> {
        let halted: Vec<u64> = self.active.drain(..).map(|u| u.id).collect();
        self.next_play_time = None;
        self.state = SchedulerState::Interrupted;
        if !halted.is_empty() {
            tracing::debug!(units = halted.len(), "playback interrupted");
        }
        halted
    }

    /// Drop units the device clock has moved past.
    ///
    /// The cursor is untouched so an ongoing stream stays gapless across
    /// retire calls.
    pub fn retire(&mut self, now: f64) {
        self.active.retain(|u| u.end() > now);
        if self.active.is_empty() && self.state == SchedulerState::Scheduling {
            self.state = SchedulerState::Idle;
        }
    }

    /// Units currently on the timeline.
    #[must_use]
    pub fn active_units(&self) -> &[ScheduledUnit] {
        &self.active
    }

    /// Where the next unit will start, if the timeline is anchored.
    #[must_use]
    pub const fn next_play_time(&self) -> Option<f64> {
        self.next_play_time
    }

    /// Current scheduler state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 24_000;
    const LOOKAHEAD: f64 = 0.05;

    fn pcm_bytes(samples: usize) -> Vec<u8> {
        AudioFrame::new(vec![100i16; samples], RATE).to_le_bytes()
    }

    // ---- gapless chaining ----

    #[test]
    fn first_unit_starts_at_lookahead() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        let scheduled = scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();
        assert!(scheduled.unit.start.to_bits() == LOOKAHEAD.to_bits());
        assert!((scheduled.unit.duration - 0.1).abs() < 1e-12);
    }

    #[test]
    fn consecutive_units_chain_exactly() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        let first = scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();
        let second = scheduler.schedule(&pcm_bytes(1024), 0.0).unwrap();
        let third = scheduler.schedule(&pcm_bytes(512), 0.001).unwrap();

        // Bitwise equality: the timeline must be seam-free, not merely close.
        assert!(second.unit.start.to_bits() == first.unit.end().to_bits());
        assert!(third.unit.start.to_bits() == second.unit.end().to_bits());
    }

    #[test]
    fn cursor_equal_to_now_still_chains() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        let first = scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();
        let cursor = first.unit.end();
        let second = scheduler.schedule(&pcm_bytes(2400), cursor).unwrap();
        assert!(second.unit.start.to_bits() == cursor.to_bits());
    }

    // ---- falling behind ----

    #[test]
    fn reanchors_when_device_clock_passed_cursor() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();

        // Device clock has run far past the queued audio.
        let late = scheduler.schedule(&pcm_bytes(2400), 10.0).unwrap();
        assert!(late.unit.start.to_bits() == (10.0 + LOOKAHEAD).to_bits());
    }

    // ---- barge-in ----

    #[test]
    fn interrupt_halts_every_unit_and_clears_cursor() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        scheduler.schedule(&pcm_bytes(1024), 0.0);
        scheduler.schedule(&pcm_bytes(1024), 0.0);
        scheduler.schedule(&pcm_bytes(1024), 0.0);

        let halted = scheduler.interrupt();
        assert_eq!(halted, vec![0, 1, 2]);
        assert!(scheduler.active_units().is_empty());
        assert!(scheduler.next_play_time().is_none());
        assert_eq!(scheduler.state(), SchedulerState::Interrupted);
    }

    #[test]
    fn interrupt_is_idempotent() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        scheduler.schedule(&pcm_bytes(1024), 0.0);
        scheduler.interrupt();

        let second = scheduler.interrupt();
        assert!(second.is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Interrupted);
        assert!(scheduler.next_play_time().is_none());
    }

    #[test]
    fn schedule_after_interrupt_reanchors() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        scheduler.schedule(&pcm_bytes(2400), 0.0);
        scheduler.interrupt();

        let resumed = scheduler.schedule(&pcm_bytes(2400), 1.0).unwrap();
        assert!(resumed.unit.start.to_bits() == (1.0 + LOOKAHEAD).to_bits());
        assert_eq!(scheduler.state(), SchedulerState::Scheduling);
    }

    // ---- decode failures ----

    #[test]
    fn odd_payload_is_skipped_without_moving_cursor() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        let first = scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();
        let cursor = scheduler.next_play_time().unwrap();

        assert!(scheduler.schedule(&[1, 2, 3], 0.0).is_none());
        assert!(scheduler.next_play_time().unwrap().to_bits() == cursor.to_bits());

        // The timeline resumes from the next valid buffer with no gap.
        let next = scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();
        assert!(next.unit.start.to_bits() == first.unit.end().to_bits());
    }

    #[test]
    fn empty_payload_is_skipped() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        assert!(scheduler.schedule(&[], 0.0).is_none());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    // ---- retirement ----

    #[test]
    fn retire_drops_finished_units_only() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        scheduler.schedule(&pcm_bytes(2400), 0.0); // 0.05..0.15
        scheduler.schedule(&pcm_bytes(2400), 0.0); // 0.15..0.25

        scheduler.retire(0.2);
        assert_eq!(scheduler.active_units().len(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Scheduling);

        scheduler.retire(0.3);
        assert!(scheduler.active_units().is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn stream_stays_gapless_across_retire() {
        let mut scheduler = PlaybackScheduler::new(RATE, LOOKAHEAD);
        let first = scheduler.schedule(&pcm_bytes(2400), 0.0).unwrap();
        scheduler.retire(0.06); // first unit still playing
        let second = scheduler.schedule(&pcm_bytes(2400), 0.06).unwrap();
        assert!(second.unit.start.to_bits() == first.unit.end().to_bits());
    }
}
