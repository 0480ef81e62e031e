use serde::{Deserialize, Serialize};
use state::{EntityState, FIRST_PERIOD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    FirstObservation,
    NewPeriod,
    ClockAdvanced,
    /// Same minute seen again; the snapshot is rewritten in place.
    SameClockUpdate,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::FirstObservation => "first_observation",
            Reason::NewPeriod => "new_period",
            Reason::ClockAdvanced => "clock_advanced",
            Reason::SameClockUpdate => "same_clock_update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub persist: bool,
    pub period: u32,
    pub reason: Reason,
}

impl Verdict {
    fn persist(period: u32, reason: Reason) -> Self {
        Self {
            persist: true,
            period,
            reason,
        }
    }

    /// State to track once the snapshot for `clock` has been written.
    pub fn next_state(&self, clock: u32) -> EntityState {
        EntityState::new(clock, self.period)
    }
}

/// Classifies an observation against the last persisted state of its match.
///
/// A clock that goes backwards means a new period started. Re-observing the
/// same clock always persists (storage upserts on `(entity, period, clock)`).
pub fn decide(current_clock: u32, previous: Option<&EntityState>) -> Verdict {
    let Some(previous) = previous else {
        return Verdict::persist(FIRST_PERIOD, Reason::FirstObservation);
    };

    if current_clock < previous.last_clock {
        Verdict::persist(previous.last_period.saturating_add(1), Reason::NewPeriod)
    } else if current_clock > previous.last_clock {
        Verdict::persist(previous.last_period, Reason::ClockAdvanced)
    } else {
        Verdict::persist(previous.last_period, Reason::SameClockUpdate)
    }
}
