//! Virtual time for the event scheduler
//!
//! - `SimTime` - totally ordered virtual instant
//! - `DayTime` - human-readable `[Nd]HH:MM:SS.fff` rendering and parsing

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point on the virtual clock (seconds since the simulation started)
///
/// Wraps `f64` with a total order so it can key the event heap.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(pub f64);

impl SimTime {
    /// The simulation origin
    pub const ZERO: SimTime = SimTime(0.0);

    /// Get the raw seconds value
    pub fn secs(&self) -> f64 {
        self.0
    }

    /// Instant `delay` seconds after this one
    pub fn after(&self, delay: f64) -> SimTime {
        SimTime(self.0 + delay)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", DayTime::from_secs(self.0))
    }
}

/// A duration split into days, hours, minutes and seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayTime {
    total: f64,
}

impl DayTime {
    const MINUTE: f64 = 60.0;
    const HOUR: f64 = 60.0 * 60.0;
    const DAY: f64 = 24.0 * 60.0 * 60.0;

    /// Create from a number of seconds
    pub fn from_secs(secs: f64) -> Self {
        Self { total: secs }
    }

    /// Create from components
    pub fn new(days: f64, hours: f64, minutes: f64, seconds: f64) -> Self {
        Self {
            total: days * Self::DAY + hours * Self::HOUR + minutes * Self::MINUTE + seconds,
        }
    }

    /// Total number of seconds
    pub fn total_secs(&self) -> f64 {
        self.total
    }

    /// Whole days
    pub fn days(&self) -> u64 {
        (self.total / Self::DAY) as u64
    }

    /// Hours within the day
    pub fn hours(&self) -> u64 {
        (self.total / Self::HOUR) as u64 % 24
    }

    /// Minutes within the hour
    pub fn minutes(&self) -> u64 {
        (self.total / Self::MINUTE) as u64 % 60
    }

    /// Seconds within the minute (fractional)
    pub fn seconds(&self) -> f64 {
        self.total % 60.0
    }

    /// Parse `[Nd] HH:MM[:SS[.fff]]`
    ///
    /// Returns `None` for anything else, including plain numbers.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (days, clock) = match text.find(['d', 'D']) {
            Some(pos) => (text[..pos].trim().parse::<f64>().ok()?, text[pos + 1..].trim()),
            None => (0.0, text),
        };
        let mut parts = clock.split(':').map(str::trim);
        let hours = parts.next()?.parse::<u32>().ok()? as f64;
        let minutes = parts.next()?.parse::<u32>().ok()? as f64;
        let seconds = match parts.next() {
            Some(s) => s.parse::<f64>().ok().filter(|s| *s >= 0.0)?,
            None => 0.0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(days, hours, minutes, seconds))
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total >= Self::DAY {
            write!(f, "{}d", self.days())?;
        }
        write!(
            f,
            "{:02}:{:02}:{:06.3}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_time_order() {
        let mut times = vec![SimTime(3.0), SimTime(-0.0), SimTime(1.5), SimTime(0.0)];
        times.sort();
        assert_eq!(times[times.len() - 1], SimTime(3.0));
        assert!(SimTime(1.0) < SimTime(1.0).after(0.5));
    }

    #[test]
    fn test_day_time_display() {
        assert_eq!(DayTime::from_secs(0.0).to_string(), "00:00:00.000");
        assert_eq!(DayTime::new(0.0, 1.0, 2.0, 3.5).to_string(), "01:02:03.500");
        assert_eq!(DayTime::new(1.0, 2.0, 3.0, 4.0).to_string(), "1d02:03:04.000");
    }

    #[test]
    fn test_day_time_parse() {
        assert_eq!(DayTime::parse("01:30").map(|d| d.total_secs()), Some(5400.0));
        assert_eq!(
            DayTime::parse("1d 00:00:10").map(|d| d.total_secs()),
            Some(86_410.0)
        );
        assert_eq!(
            DayTime::parse(" 00:01:02.5 ").map(|d| d.total_secs()),
            Some(62.5)
        );
        assert!(DayTime::parse("12").is_none());
        assert!(DayTime::parse("1:2:3:4").is_none());
        assert!(DayTime::parse("a:b").is_none());
    }
}
