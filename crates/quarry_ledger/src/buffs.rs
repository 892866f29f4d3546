//! # Buff State Machine
//!
//! Two short-lived gameplay modifiers:
//!
//! - **Combustion**: a bounded accumulator in `[0, 1000]` feeding a linear
//!   reward multiplier. No decay here; a collaborator may call `set`.
//! - **Abundance**: a timed activation followed by a cooldown.
//!
//! ## Abundance States
//!
//! ```text
//!            activate(d)                now >= ends_at
//!   IDLE ─────────────────> ACTIVE ──────────────────────> COOLDOWN
//!    ▲                        │                               │
//!    │    force_deactivate    │        now >= until           │
//!    ├────────────────────────┘                               │
//!    └────────────────────────────────────────────────────────┘
//! ```
//!
//! Expiry is pull-based. Every query and command first calls
//! [`Abundance::settle`] with the caller's `now`, which applies any
//! transitions the timestamps imply. Nothing runs in the background.
//!
//! The cooldown runs from `ends_at`, not from the activation time.

/// Upper bound of the combustion accumulator.
pub const COMBUSTION_MAX: u32 = 1000;

/// Combustion accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Combustion {
    level: u32,
}

impl Combustion {
    /// Creates a combustion accumulator at `level`, clamped.
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(COMBUSTION_MAX),
        }
    }

    /// Returns the current level.
    #[inline]
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Raises the level, clamping at [`COMBUSTION_MAX`]. Returns the new level.
    pub fn increase(&mut self, amount: u32) -> u32 {
        self.level = self.level.saturating_add(amount).min(COMBUSTION_MAX);
        self.level
    }

    /// Overwrites the level, clamping at [`COMBUSTION_MAX`].
    pub fn set(&mut self, level: u32) {
        self.level = level.min(COMBUSTION_MAX);
    }

    /// Returns `1 + level / 1000`.
    #[inline]
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        1.0 + f64::from(self.level) / f64::from(COMBUSTION_MAX)
    }
}

/// Settled abundance state at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbundanceState {
    /// Not active, no cooldown pending.
    Idle,
    /// Active until `ends_at` (epoch ms).
    Active {
        /// Instant the active period ends.
        ends_at: u64,
    },
    /// Cooling down until `until` (epoch ms).
    Cooldown {
        /// Instant the cooldown ends.
        until: u64,
    },
}

/// Why an activation was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbundanceRejection {
    /// A zero-length activation was requested.
    EmptyDuration,
    /// Abundance is already running.
    AlreadyActive {
        /// Instant the running period ends.
        ends_at: u64,
    },
    /// The previous activation's cooldown has not finished.
    CoolingDown {
        /// Instant the cooldown ends.
        until: u64,
    },
}

/// A running activation and the cooldown it will leave behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ActivePeriod {
    ends_at: u64,
    cooldown_ms: u64,
}

/// Persisted abundance timestamps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AbundanceTimers {
    /// End of the running activation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_until: Option<u64>,
    /// Cooldown owed once the running activation ends.
    #[serde(default)]
    pub pending_cooldown_ms: u64,
    /// End of the pending cooldown, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<u64>,
}

/// Abundance buff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Abundance {
    active: Option<ActivePeriod>,
    cooldown_until: Option<u64>,
}

impl Abundance {
    /// Creates an idle buff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the buff from persisted timers.
    #[must_use]
    pub fn from_timers(timers: AbundanceTimers) -> Self {
        Self {
            active: timers.active_until.map(|ends_at| ActivePeriod {
                ends_at,
                cooldown_ms: timers.pending_cooldown_ms,
            }),
            cooldown_until: timers.cooldown_until,
        }
    }

    /// Returns the raw timers for persistence.
    #[must_use]
    pub fn timers(&self) -> AbundanceTimers {
        AbundanceTimers {
            active_until: self.active.map(|period| period.ends_at),
            pending_cooldown_ms: self.active.map_or(0, |period| period.cooldown_ms),
            cooldown_until: self.cooldown_until,
        }
    }

    /// Applies every transition implied by `now` and returns the state.
    pub fn settle(&mut self, now: u64) -> AbundanceState {
        if let Some(period) = self.active {
            if now >= period.ends_at {
                let until = period.ends_at.saturating_add(period.cooldown_ms);
                self.active = None;
                self.cooldown_until = Some(self.cooldown_until.map_or(until, |pending| pending.max(until)));
            }
        }

        if let Some(until) = self.cooldown_until {
            if now >= until {
                self.cooldown_until = None;
            }
        }

        match (self.active, self.cooldown_until) {
            (Some(period), _) => AbundanceState::Active {
                ends_at: period.ends_at,
            },
            (None, Some(until)) => AbundanceState::Cooldown { until },
            (None, None) => AbundanceState::Idle,
        }
    }

    /// Starts an activation of `duration_ms`.
    ///
    /// When it ends, a cooldown of `cooldown_ms` follows.
    ///
    /// # Errors
    ///
    /// Refuses zero durations, and activations while active or cooling down.
    pub fn activate(&mut self, now: u64, duration_ms: u64, cooldown_ms: u64) -> Result<u64, AbundanceRejection> {
        if duration_ms == 0 {
            return Err(AbundanceRejection::EmptyDuration);
        }

        match self.settle(now) {
            AbundanceState::Active { ends_at } => Err(AbundanceRejection::AlreadyActive { ends_at }),
            AbundanceState::Cooldown { until } => Err(AbundanceRejection::CoolingDown { until }),
            AbundanceState::Idle => {
                let ends_at = now.saturating_add(duration_ms);
                self.active = Some(ActivePeriod { ends_at, cooldown_ms });
                Ok(ends_at)
            }
        }
    }

    /// Ends a running activation immediately, without a cooldown.
    ///
    /// A cooldown that was already pending is left alone. Returns true if
    /// the buff was active.
    pub fn force_deactivate(&mut self, now: u64) -> bool {
        match self.settle(now) {
            AbundanceState::Active { .. } => {
                self.active = None;
                true
            }
            AbundanceState::Idle | AbundanceState::Cooldown { .. } => false,
        }
    }

    /// Returns true if the buff is running at `now`.
    pub fn is_active(&mut self, now: u64) -> bool {
        matches!(self.settle(now), AbundanceState::Active { .. })
    }

    /// Returns true if not active and a cooldown is pending at `now`.
    pub fn is_on_cooldown(&mut self, now: u64) -> bool {
        matches!(self.settle(now), AbundanceState::Cooldown { .. })
    }

    /// Milliseconds left on the running activation, 0 if not active.
    pub fn remaining_active_ms(&mut self, now: u64) -> u64 {
        match self.settle(now) {
            AbundanceState::Active { ends_at } => ends_at.saturating_sub(now),
            AbundanceState::Idle | AbundanceState::Cooldown { .. } => 0,
        }
    }

    /// Whole seconds left on the cooldown, rounded up.
    ///
    /// Zero when active or when no cooldown is pending.
    pub fn remaining_cooldown_secs(&mut self, now: u64) -> u64 {
        match self.settle(now) {
            AbundanceState::Cooldown { until } => until.saturating_sub(now).div_ceil(1000),
            AbundanceState::Idle | AbundanceState::Active { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATION: u64 = 30_000;
    const COOLDOWN: u64 = 120_000;

    #[test]
    fn test_combustion_clamps() {
        let mut combustion = Combustion::default();
        assert_eq!(combustion.increase(5000), COMBUSTION_MAX);
        assert!((combustion.multiplier() - 2.0).abs() < f64::EPSILON);

        combustion.set(250);
        assert!((combustion.multiplier() - 1.25).abs() < f64::EPSILON);

        assert_eq!(Combustion::new(u32::MAX).level(), COMBUSTION_MAX);
    }

    #[test]
    fn test_combustion_starts_at_unit_multiplier() {
        let combustion = Combustion::default();
        assert!((combustion.multiplier() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_activation_lifecycle() {
        let mut abundance = Abundance::new();
        let start = 1_000_000;

        assert_eq!(abundance.activate(start, DURATION, COOLDOWN), Ok(start + DURATION));
        assert!(abundance.is_active(start + DURATION - 1));

        assert!(!abundance.is_active(start + DURATION + 1));
        assert!(abundance.is_on_cooldown(start + DURATION + 1));

        // Cooldown is measured from the end of the active period.
        assert!(abundance.is_on_cooldown(start + DURATION + COOLDOWN - 1));
        assert!(!abundance.is_on_cooldown(start + DURATION + COOLDOWN));
        assert_eq!(abundance.settle(start + DURATION + COOLDOWN), AbundanceState::Idle);
    }

    #[test]
    fn test_activation_refused_while_active_or_cooling() {
        let mut abundance = Abundance::new();
        abundance.activate(0, DURATION, COOLDOWN).unwrap();

        assert_eq!(
            abundance.activate(10, DURATION, COOLDOWN),
            Err(AbundanceRejection::AlreadyActive { ends_at: DURATION })
        );
        assert_eq!(
            abundance.activate(DURATION, DURATION, COOLDOWN),
            Err(AbundanceRejection::CoolingDown {
                until: DURATION + COOLDOWN
            })
        );
        assert!(abundance.activate(DURATION + COOLDOWN, DURATION, COOLDOWN).is_ok());
    }

    #[test]
    fn test_empty_duration_refused() {
        let mut abundance = Abundance::new();
        assert_eq!(abundance.activate(0, 0, COOLDOWN), Err(AbundanceRejection::EmptyDuration));
        assert_eq!(abundance.settle(0), AbundanceState::Idle);
    }

    #[test]
    fn test_force_deactivate_skips_cooldown() {
        let mut abundance = Abundance::new();
        abundance.activate(0, DURATION, COOLDOWN).unwrap();

        assert!(abundance.force_deactivate(5));
        assert!(!abundance.is_active(6));
        assert!(!abundance.is_on_cooldown(6));
        assert!(abundance.activate(7, DURATION, COOLDOWN).is_ok());
    }

    #[test]
    fn test_force_deactivate_leaves_pending_cooldown() {
        let mut abundance = Abundance::new();
        abundance.activate(0, DURATION, COOLDOWN).unwrap();

        let now = DURATION + 10;
        assert!(!abundance.force_deactivate(now));
        assert!(abundance.is_on_cooldown(now));
    }

    #[test]
    fn test_remaining_cooldown_rounds_up() {
        let mut abundance = Abundance::new();
        abundance.activate(0, 1_000, 5_000).unwrap();

        assert_eq!(abundance.remaining_cooldown_secs(500), 0);
        assert_eq!(abundance.remaining_active_ms(500), 500);
        assert_eq!(abundance.remaining_cooldown_secs(1_001), 5);
        assert_eq!(abundance.remaining_cooldown_secs(5_000), 1);
        assert_eq!(abundance.remaining_cooldown_secs(6_000), 0);
    }

    #[test]
    fn test_timers_round_trip() {
        let mut abundance = Abundance::new();
        abundance.activate(100, DURATION, COOLDOWN).unwrap();

        let mut restored = Abundance::from_timers(abundance.timers());
        assert_eq!(restored, abundance);
        assert!(restored.is_on_cooldown(100 + DURATION));
    }
}
