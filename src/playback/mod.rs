//! Playback scheduling and device output
//!
//! The scheduler owns the shared timeline and decides when each received
//! buffer starts; the sink owns the output device and reports device time.
//! Keeping the two apart means every timing rule (gapless chaining, falling
//! behind, barge-in) is checkable without audio hardware.

mod scheduler;
mod sink;

pub use scheduler::{PlaybackScheduler, ScheduledAudio, ScheduledUnit, SchedulerState};
pub use sink::{AudioSink, DeviceSink};
