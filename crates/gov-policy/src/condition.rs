// condition.rs — Time-based rule conditions.
//
// A rule may carry a time-of-day window ("HH:MM-HH:MM", possibly wrapping
// midnight) and/or a day-of-week set (0 = Sunday ... 6 = Saturday). Both must
// hold for the rule to apply. Conditions are never cached: they are checked
// against the clock on every evaluation.

use std::fmt;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Conditions attached to a rule, exactly as they appear in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
}

impl RuleConditions {
    /// Whether the conditions hold at the given local time.
    ///
    /// An unparseable time range never matches (fail-closed). Validated
    /// documents cannot contain one.
    pub fn matches_at(&self, at: NaiveDateTime) -> bool {
        if !self.days_of_week.is_empty() {
            let today = at.weekday().num_days_from_sunday() as u8;
            if !self.days_of_week.contains(&today) {
                return false;
            }
        }
        match &self.time_range {
            None => true,
            Some(raw) => match TimeRange::parse(raw) {
                Ok(range) => range.contains(at.time()),
                Err(_) => false,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time_range.is_none() && self.days_of_week.is_empty()
    }
}

/// A parsed time-of-day window. Start is inclusive, end is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    /// Parse `"HH:MM-HH:MM"`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (start, end) = raw
            .split_once('-')
            .ok_or_else(|| format!("expected 'HH:MM-HH:MM', got '{}'", raw))?;
        Ok(Self {
            start: parse_hhmm(start.trim())?,
            end: parse_hhmm(end.trim())?,
        })
    }

    /// Whether the window wraps past midnight (e.g. 22:00-06:00).
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        // Compare at minute resolution, matching the document format.
        let t = NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t);
        if self.start == self.end {
            // Zero-length window means "all day".
            true
        } else if self.wraps_midnight() {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, String> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got '{}'", s))?;
    if h.len() != 2 || m.len() != 2 {
        return Err(format!("expected HH:MM, got '{}'", s));
    }
    let hour: u32 = h.parse().map_err(|_| format!("invalid hour in '{}'", s))?;
    let minute: u32 = m.parse().map_err(|_| format!("invalid minute in '{}'", s))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| format!("time out of range: '{}'", s))
}
