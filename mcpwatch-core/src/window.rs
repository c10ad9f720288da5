// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rolling windows and the bucket clock
//!
//! Windows are sliding: a query at instant `now` covers `(now - duration, now]`.
//! Nothing here holds state; the bucket clock only maps a window to its
//! configured duration.

use crate::config::WindowDurations;
use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The fixed set of rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Window {
    FiveMin,
    OneHour,
    TwentyFourHour,
}

impl Window {
    /// All windows, shortest first.
    pub const ALL: [Window; 3] = [Window::FiveMin, Window::OneHour, Window::TwentyFourHour];

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::FiveMin => "FIVE_MIN",
            Window::OneHour => "ONE_HOUR",
            Window::TwentyFourHour => "TWENTY_FOUR_HOUR",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = MonitorError;

    /// Accepts the canonical identifiers plus the short forms `5m`, `1h`, `24h`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIVE_MIN" | "5M" => Ok(Window::FiveMin),
            "ONE_HOUR" | "1H" => Ok(Window::OneHour),
            "TWENTY_FOUR_HOUR" | "24H" => Ok(Window::TwentyFourHour),
            _ => Err(MonitorError::InvalidWindow(s.to_string())),
        }
    }
}

/// Maps windows to durations and lookback instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketClock {
    durations: WindowDurations,
}

impl Default for BucketClock {
    fn default() -> Self {
        Self::new(WindowDurations::default())
    }
}

impl BucketClock {
    pub fn new(durations: WindowDurations) -> Self {
        Self { durations }
    }

    pub fn duration(&self, window: Window) -> Duration {
        Duration::from_secs(self.duration_secs(window))
    }

    pub fn duration_secs(&self, window: Window) -> u64 {
        match window {
            Window::FiveMin => self.durations.five_min_secs,
            Window::OneHour => self.durations.one_hour_secs,
            Window::TwentyFourHour => self.durations.twenty_four_hour_secs,
        }
    }

    pub fn duration_us(&self, window: Window) -> u64 {
        self.duration_secs(window).saturating_mul(1_000_000)
    }

    /// Exclusive lower bound of the window ending at `now_us`.
    pub fn lookback_start(&self, window: Window, now_us: u64) -> u64 {
        now_us.saturating_sub(self.duration_us(window))
    }

    /// `(start, end)` of the equal-length window immediately preceding the
    /// current one.
    pub fn previous_range(&self, window: Window, now_us: u64) -> (u64, u64) {
        let len = self.duration_us(window);
        let end = now_us.saturating_sub(len);
        (end.saturating_sub(len), end)
    }

    /// Duration of the longest window.
    pub fn largest_us(&self) -> u64 {
        self.duration_us(Window::TwentyFourHour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window() {
        assert_eq!("FIVE_MIN".parse::<Window>().unwrap(), Window::FiveMin);
        assert_eq!("one_hour".parse::<Window>().unwrap(), Window::OneHour);
        assert_eq!("24h".parse::<Window>().unwrap(), Window::TwentyFourHour);
    }

    #[test]
    fn test_parse_unknown_window() {
        let err = "SEVEN_DAY".parse::<Window>().unwrap_err();
        assert!(matches!(err, MonitorError::InvalidWindow(ref w) if w == "SEVEN_DAY"));
    }

    #[test]
    fn test_display_roundtrip() {
        for w in Window::ALL {
            assert_eq!(w.to_string().parse::<Window>().unwrap(), w);
        }
    }

    #[test]
    fn test_default_durations() {
        let clock = BucketClock::default();
        assert_eq!(clock.duration(Window::FiveMin), Duration::from_secs(300));
        assert_eq!(clock.duration(Window::OneHour), Duration::from_secs(3600));
        assert_eq!(
            clock.duration(Window::TwentyFourHour),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_lookback_and_previous_range() {
        let clock = BucketClock::default();
        let now = 10_000 * 1_000_000;
        assert_eq!(clock.lookback_start(Window::FiveMin, now), 9_700 * 1_000_000);
        assert_eq!(
            clock.previous_range(Window::FiveMin, now),
            (9_400 * 1_000_000, 9_700 * 1_000_000)
        );
        // Saturates near the epoch.
        assert_eq!(clock.lookback_start(Window::OneHour, 5), 0);
    }

    #[test]
    fn test_oversized_window_saturates() {
        let clock = BucketClock::new(WindowDurations {
            five_min_secs: 300,
            one_hour_secs: 3600,
            twenty_four_hour_secs: u64::MAX,
        });
        assert_eq!(clock.duration_us(Window::TwentyFourHour), u64::MAX);
        assert_eq!(clock.lookback_start(Window::TwentyFourHour, 42), 0);
    }
}
