use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::values::{MINUTE_MS, TimestampMs};

/// Candle period.
///
/// All alignment arithmetic is done on epoch milliseconds in UTC, so a
/// period boundary is any timestamp divisible by the period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Every supported timeframe, finest first
    pub const ALL: [Timeframe; 11] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H12,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1440,
        }
    }

    /// Period length in milliseconds
    pub fn duration_ms(&self) -> TimestampMs {
        self.minutes() * MINUTE_MS
    }

    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.duration_ms() as u64)
    }

    /// Floor a timestamp to the start of the period containing it
    pub fn floor(&self, ts: TimestampMs) -> TimestampMs {
        ts - ts.rem_euclid(self.duration_ms())
    }

    /// True when `ts` is the first millisecond of a period of this timeframe
    pub fn is_boundary(&self, ts: TimestampMs) -> bool {
        ts.rem_euclid(self.duration_ms()) == 0
    }

    /// True when this timeframe has a strictly longer period than `other`
    pub fn coarser_than(&self, other: Timeframe) -> bool {
        self.duration_ms() > other.duration_ms()
    }

    /// Timestamp of the period following the one starting at `ts`
    pub fn next(&self, ts: TimestampMs) -> TimestampMs {
        self.floor(ts) + self.duration_ms()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Timeframe::ALL
            .iter()
            .find(|tf| tf.as_str() == normalized)
            .copied()
            .ok_or_else(|| CoreError::UnknownTimeframe(s.to_string()))
    }
}
