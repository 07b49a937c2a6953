//! `--from` time range grammar.
//!
//! Accepted forms, tried in order:
//!
//! | Input                 | Meaning                                   |
//! |-----------------------|-------------------------------------------|
//! | `tail`                | live entries only, no historical replay   |
//! | `<n>s` `<n>m` `<n>h` `<n>d` | everything since `now - n units`    |
//! | `YYYY-MM-DDTHH:MM:SS` | everything since that local wall time     |
//!
//! A range is resolved once, when the reader is configured.

use crate::error::{FeedError, Result};
use crate::types::Watermark;
use chrono::{DateTime, Duration, Local, NaiveDateTime, SubsecRound, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

const TAIL: &str = "tail";
const ABSOLUTE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static RELATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhd])$").expect("relative range pattern"));
static ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}(-\d{2}){2}T(\d{2}:){2}\d{2}$").expect("absolute range pattern")
});

/// A resolved `--from` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// Live-only: skip historical replay.
    Tail,
    /// Replay everything after this point, then go live.
    Since(Watermark),
}

impl TimeRange {
    /// Resolve `input` against the current wall clock.
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_at(input, Local::now())
    }

    /// Resolve `input` against an explicit `now`.
    pub fn parse_at(input: &str, now: DateTime<Local>) -> Result<Self> {
        let input = input.trim();
        if input == TAIL {
            return Ok(TimeRange::Tail);
        }

        if let Some(caps) = RELATIVE.captures(input) {
            let amount: i64 = caps[1]
                .parse()
                .map_err(|_| FeedError::invalid_time_range(input, "amount is too large"))?;
            let span = match &caps[2] {
                "s" => Duration::try_seconds(amount),
                "m" => Duration::try_minutes(amount),
                "h" => Duration::try_hours(amount),
                // a day is always 24 hours here, DST or not
                "d" => amount.checked_mul(24).and_then(Duration::try_hours),
                _ => unreachable!("unit is constrained by the pattern"),
            }
            .ok_or_else(|| FeedError::invalid_time_range(input, "duration is too large"))?;
            let since = now
                .checked_sub_signed(span)
                .ok_or_else(|| FeedError::invalid_time_range(input, "duration is too large"))?
                .trunc_subsecs(0);
            return Ok(TimeRange::Since(Watermark::new(since.fixed_offset())));
        }

        if ABSOLUTE.is_match(input) {
            let naive = NaiveDateTime::parse_from_str(input, ABSOLUTE_FORMAT)
                .map_err(|e| FeedError::invalid_time_range(input, format!("bad format: {e}")))?;
            let local = Local.from_local_datetime(&naive).earliest().ok_or_else(|| {
                FeedError::invalid_time_range(input, "time does not exist in the local zone")
            })?;
            return Ok(TimeRange::Since(Watermark::new(local.fixed_offset())));
        }

        Err(FeedError::invalid_time_range(
            input,
            "expected 'tail', <n>[s|m|h|d] or YYYY-MM-DDTHH:MM:SS",
        ))
    }

    pub fn is_tail(&self) -> bool {
        matches!(self, TimeRange::Tail)
    }

    /// The resume point, if this range replays history.
    pub fn watermark(&self) -> Option<Watermark> {
        match self {
            TimeRange::Tail => None,
            TimeRange::Since(wm) => Some(*wm),
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        TimeRange::parse(s)
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeRange::Tail => f.write_str(TAIL),
            TimeRange::Since(wm) => wm.fmt(f),
        }
    }
}
