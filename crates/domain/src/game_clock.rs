//! In-world clock (§3.8 `GameState.game_time`, §4.4 `update_time` tool).
//!
//! The clock is deliberately not calendar/`DateTime`-backed: time only ever
//! advances in discrete bucketed jumps driven by the `update_time` tool, and
//! the only derived value anyone reads back is the day period.

use serde::{Deserialize, Serialize};

const MINUTES_PER_HOUR: u32 = 60;
const HOURS_PER_DAY: u32 = 24;

/// Buckets `update_time(minutes)` snaps to, in ascending order.
const SNAP_BUCKETS: [u32; 11] = [5, 10, 15, 30, 60, 120, 180, 240, 360, 480, 720];
const MAX_ADVANCE_MINUTES: u32 = 720;

/// Coarse part of the day, derived from `hour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    Dawn,
    Day,
    Dusk,
    Night,
}

impl DayPeriod {
    fn from_hour(hour: u32) -> Self {
        match hour {
            5..=7 => DayPeriod::Dawn,
            8..=17 => DayPeriod::Day,
            18..=19 => DayPeriod::Dusk,
            _ => DayPeriod::Night,
        }
    }
}

/// `{day, hour, minute, period}` in-world clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameClock {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub period: DayPeriod,
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            day: 1,
            hour: 8,
            minute: 0,
            period: DayPeriod::Day,
        }
    }
}

impl GameClock {
    pub fn new(day: u32, hour: u32, minute: u32) -> Self {
        Self {
            day,
            hour,
            minute,
            period: DayPeriod::from_hour(hour),
        }
    }

    /// Snap a requested advance to the nearest bucket in
    /// `{5,10,15,30,60,120,180,240,360,480,720}`, capped at 720, then step
    /// `day/hour/minute` and re-derive `period`.
    pub fn advance(&mut self, requested_minutes: u32) -> u32 {
        let snapped = Self::snap_to_bucket(requested_minutes.min(MAX_ADVANCE_MINUTES));

        let total_minutes = self.minute + snapped;
        let extra_hours = total_minutes / MINUTES_PER_HOUR;
        self.minute = total_minutes % MINUTES_PER_HOUR;

        let total_hours = self.hour + extra_hours;
        let extra_days = total_hours / HOURS_PER_DAY;
        self.hour = total_hours % HOURS_PER_DAY;

        self.day += extra_days;
        self.period = DayPeriod::from_hour(self.hour);

        snapped
    }

    fn snap_to_bucket(minutes: u32) -> u32 {
        if minutes == 0 {
            return 0;
        }
        *SNAP_BUCKETS
            .iter()
            .min_by_key(|&&bucket| (bucket as i64 - minutes as i64).abs())
            .unwrap_or(&MAX_ADVANCE_MINUTES)
    }
}
