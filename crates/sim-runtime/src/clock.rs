//! Simulated calendar and real-time pacing.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sim_core::Cadence;
use std::time::Duration;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 100.0;

/// Cadences that fire on `date`, in firing order. Daily always fires; weekly
/// fires every seventh elapsed day.
pub fn cadences_for(date: NaiveDate, elapsed_days: u64) -> Vec<Cadence> {
    let mut out = vec![Cadence::Daily];
    if elapsed_days > 0 && elapsed_days % 7 == 0 {
        out.push(Cadence::Weekly);
    }
    if date.day() == 1 {
        out.push(Cadence::Monthly);
        if matches!(date.month(), 1 | 4 | 7 | 10) {
            out.push(Cadence::Quarterly);
        }
        if date.month() == 1 {
            out.push(Cadence::Yearly);
        }
    }
    out
}

/// Current simulated day plus the pause/speed controls of the real-time
/// driver. Pausing and speed never change which days are simulated, only how
/// often the driver asks for the next one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    date: NaiveDate,
    elapsed_days: u64,
    paused: bool,
    speed: f64,
}

impl Clock {
    pub fn new(date: NaiveDate, elapsed_days: u64) -> Self {
        Self {
            date,
            elapsed_days,
            paused: false,
            speed: 1.0,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn elapsed_days(&self) -> u64 {
        self.elapsed_days
    }

    /// The next day to simulate, or `None` at the end of the calendar.
    pub fn next_day(&self) -> Option<(NaiveDate, u64)> {
        Some((self.date.succ_opt()?, self.elapsed_days + 1))
    }

    /// Move to a day that has been fully processed.
    pub fn commit(&mut self, date: NaiveDate, elapsed_days: u64) {
        self.date = date;
        self.elapsed_days = elapsed_days;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the speed multiplier, clamped to [`MIN_SPEED`, `MAX_SPEED`].
    /// Non-finite input leaves the speed unchanged. Returns the speed in use.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        if speed.is_finite() {
            self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        }
        self.speed
    }

    /// Wall-clock delay between two simulated days.
    pub fn interval(&self, base_interval_ms: u64) -> Duration {
        Duration::from_secs_f64(base_interval_ms as f64 / 1000.0 / self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn cadence_calendar() {
        assert_eq!(cadences_for(d(2024, 1, 2), 1), vec![Cadence::Daily]);
        assert_eq!(cadences_for(d(2024, 1, 8), 7), vec![Cadence::Daily, Cadence::Weekly]);
        assert_eq!(cadences_for(d(2024, 2, 1), 31), vec![Cadence::Daily, Cadence::Monthly]);
        // 2024-04-01 is the 91st day after Jan 1, so weekly fires as well.
        assert_eq!(
            cadences_for(d(2024, 4, 1), 91),
            vec![Cadence::Daily, Cadence::Weekly, Cadence::Monthly, Cadence::Quarterly]
        );
        assert_eq!(cadences_for(d(2024, 7, 1), 180), vec![Cadence::Daily, Cadence::Monthly, Cadence::Quarterly]);
        assert_eq!(
            cadences_for(d(2025, 1, 1), 366),
            vec![Cadence::Daily, Cadence::Monthly, Cadence::Quarterly, Cadence::Yearly]
        );
    }

    #[test]
    fn speed_is_clamped() {
        let mut clock = Clock::new(d(2024, 1, 1), 0);
        assert_eq!(clock.set_speed(1000.0), MAX_SPEED);
        assert_eq!(clock.set_speed(0.0), MIN_SPEED);
        assert_eq!(clock.set_speed(f64::NAN), MIN_SPEED);
        clock.set_speed(2.0);
        assert_eq!(clock.interval(1000), Duration::from_millis(500));
    }

    #[test]
    fn pause_does_not_touch_the_date() {
        let mut clock = Clock::new(d(2024, 1, 1), 0);
        clock.pause();
        assert!(clock.is_paused());
        assert_eq!(clock.next_day(), Some((d(2024, 1, 2), 1)));
        clock.resume();
        assert!(!clock.is_paused());
        assert_eq!(clock.date(), d(2024, 1, 1));
    }

    proptest! {
        #[test]
        fn year_has_expected_cadence_counts(year in 1990i32..2100) {
            let mut date = d(year, 1, 1);
            let mut counts = std::collections::BTreeMap::new();
            for elapsed in 1..=365u64 {
                date = date.succ_opt().unwrap();
                for c in cadences_for(date, elapsed) {
                    *counts.entry(c).or_insert(0u32) += 1;
                }
            }
            prop_assert_eq!(counts[&Cadence::Daily], 365);
            prop_assert_eq!(counts[&Cadence::Weekly], 52);
            prop_assert!(counts[&Cadence::Monthly] >= 11);
            prop_assert!(counts[&Cadence::Quarterly] >= 3);
        }
    }
}
