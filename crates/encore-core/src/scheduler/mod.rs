//! Explicit interval scheduler
//!
//! The session runs three independent interval loops on one control thread:
//! the playback position poll, the pitch sampler and the metronome. Instead
//! of free-running timers, the scheduler is asked which loops are due at a
//! given monotonic `now` and returns discrete [`Tick`] events. Engines consume
//! those ticks as plain method calls, which keeps every loop testable with a
//! synthetic clock.

use std::time::Duration;

/// Smallest period a timer accepts
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Identifies one of the session's interval loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Playback position poll (drives A-B loop and lyric sync)
    PositionPoll,
    /// Microphone pitch sampler
    PitchSample,
    /// Metronome beat
    MetronomeBeat,
}

impl TimerId {
    pub const ALL: [TimerId; 3] = [TimerId::PositionPoll, TimerId::PitchSample, TimerId::MetronomeBeat];

    const fn index(self) -> usize {
        match self {
            TimerId::PositionPoll => 0,
            TimerId::PitchSample => 1,
            TimerId::MetronomeBeat => 2,
        }
    }
}

/// A due timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub timer: TimerId,
    /// Scheduled time of this firing (may be earlier than `now` if late)
    pub due: Duration,
}

#[derive(Debug, Clone, Copy)]
struct IntervalTimer {
    period: Duration,
    next_due: Duration,
}

/// Interval scheduler keyed by [`TimerId`]
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    timers: [Option<IntervalTimer>; 3],
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a timer; its first tick is due at `now`
    pub fn start(&mut self, id: TimerId, period: Duration, now: Duration) {
        self.timers[id.index()] = Some(IntervalTimer {
            period: period.max(MIN_PERIOD),
            next_due: now,
        });
    }

    /// Change a running timer's period without moving its next deadline
    pub fn set_period(&mut self, id: TimerId, period: Duration) {
        if let Some(timer) = self.timers[id.index()].as_mut() {
            timer.period = period.max(MIN_PERIOD);
        }
    }

    /// Stop a timer (no-op if not running)
    pub fn cancel(&mut self, id: TimerId) {
        self.timers[id.index()] = None;
    }

    /// Stop every timer
    pub fn cancel_all(&mut self) {
        self.timers = [None; 3];
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers[id.index()].is_some()
    }

    pub fn period(&self, id: TimerId) -> Option<Duration> {
        self.timers[id.index()].map(|t| t.period)
    }

    /// Earliest pending deadline across all timers
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.iter().flatten().map(|t| t.next_due).min()
    }

    /// Collect the ticks due at `now`
    ///
    /// Each due timer fires once even if several periods were missed; its
    /// next deadline moves to the first period boundary after `now`, keeping
    /// the original phase. Ticks are ordered by due time, then by timer id.
    pub fn due(&mut self, now: Duration) -> Vec<Tick> {
        let mut ticks = Vec::new();

        for id in TimerId::ALL {
            let Some(timer) = self.timers[id.index()].as_mut() else {
                continue;
            };
            if timer.next_due > now {
                continue;
            }

            ticks.push(Tick {
                timer: id,
                due: timer.next_due,
            });

            let behind = now - timer.next_due;
            let missed = (behind.as_nanos() / timer.period.as_nanos()) as u32;
            if missed > 0 {
                log::debug!("Timer {:?} fell {} period(s) behind, coalescing", id, missed);
            }
            timer.next_due += timer.period * (missed + 1);
        }

        ticks.sort_by_key(|t| (t.due, t.timer));
        ticks
    }
}
