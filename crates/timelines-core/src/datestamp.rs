use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

use crate::TimelinesError;

/// Absolute UTC timestamp in day-of-year calendar form (`2009:188:04:00:00.000`).
///
/// The canonical text is fixed width, so lexicographic order of the stored
/// strings equals chronological order; comparisons here use the parsed value.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateStamp(PrimitiveDateTime);

impl DateStamp {
    /// Parses `YYYY:DDD:hh:mm:ss[.fff]`. Digits past the millisecond are
    /// truncated so that the value equals its own canonical text.
    ///
    /// # Errors
    /// Returns [`TimelinesError::Validation`] when the text is not a
    /// day-of-year timestamp.
    pub fn parse(value: &str) -> Result<Self, TimelinesError> {
        let value = value.trim();
        PrimitiveDateTime::parse(
            value,
            format_description!("[year]:[ordinal]:[hour]:[minute]:[second].[subsecond]"),
        )
        .or_else(|_| {
            PrimitiveDateTime::parse(
                value,
                format_description!("[year]:[ordinal]:[hour]:[minute]:[second]"),
            )
        })
        .map_err(|err| TimelinesError::Validation(format!("invalid date {value:?}: {err}")))
        .and_then(|parsed| {
            Self::to_millis(parsed).ok_or_else(|| {
                TimelinesError::Validation(format!("invalid date {value:?}: subsecond out of range"))
            })
        })
    }

    fn to_millis(value: PrimitiveDateTime) -> Option<Self> {
        value
            .replace_nanosecond(value.nanosecond() / 1_000_000 * 1_000_000)
            .ok()
            .map(Self)
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Signed duration from `earlier` to `self`.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> Duration {
        self.0 - earlier.0
    }

    #[must_use]
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        self.0.checked_add(duration).and_then(Self::to_millis)
    }
}

impl Ord for DateStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for DateStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for DateStamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let canonical = format_description!(
            "[year]:[ordinal]:[hour]:[minute]:[second].[subsecond digits:3]"
        );
        match self.0.format(canonical) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

impl FromStr for DateStamp {
    type Err = TimelinesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for DateStamp {
    type Error = TimelinesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DateStamp> for String {
    fn from(value: DateStamp) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn canonical_text_round_trips() {
        let stamp = must_ok(DateStamp::parse("2009:188:04:00:00.000"));
        assert_eq!(stamp.to_string(), "2009:188:04:00:00.000");
        assert_eq!(stamp.year(), 2009);
    }

    #[test]
    fn whole_seconds_and_short_fractions_are_normalised() {
        let whole = must_ok(DateStamp::parse("2011:103:20:40:00"));
        assert_eq!(whole.to_string(), "2011:103:20:40:00.000");

        let short = must_ok(DateStamp::parse("2011:103:20:40:00.5"));
        assert_eq!(short.to_string(), "2011:103:20:40:00.500");
    }

    #[test]
    fn sub_millisecond_digits_are_truncated() {
        let fine = must_ok(DateStamp::parse("2010:100:12:00:00.1234"));
        assert_eq!(fine.to_string(), "2010:100:12:00:00.123");
        let reread = must_ok(DateStamp::parse(&fine.to_string()));
        assert_eq!(fine, reread);
        assert_eq!(fine.cmp(&reread), Ordering::Equal);

        let shifted = fine.checked_add(Duration::microseconds(1500));
        assert_eq!(
            shifted.map(|stamp| stamp.to_string()).as_deref(),
            Some("2010:100:12:00:00.124")
        );
    }

    #[test]
    fn ordering_matches_text_ordering() {
        let texts = [
            "2008:353:05:00:00.000",
            "2009:001:00:00:00.000",
            "2009:188:04:00:00.000",
            "2009:188:20:57:33.571",
        ];
        for pair in texts.windows(2) {
            let earlier = must_ok(DateStamp::parse(pair[0]));
            let later = must_ok(DateStamp::parse(pair[1]));
            assert!(earlier < later);
            assert_eq!(pair[0].cmp(pair[1]), earlier.cmp(&later));
        }
    }

    #[test]
    fn since_crosses_year_boundary() {
        let end = must_ok(DateStamp::parse("2009:001:01:00:00.000"));
        let start = must_ok(DateStamp::parse("2008:366:23:00:00.000"));
        assert_eq!(end.since(&start), Duration::hours(2));
        assert_eq!(start.since(&end), Duration::hours(-2));
    }

    #[test]
    fn rejects_calendar_dates() {
        assert!(matches!(
            DateStamp::parse("2009-07-07T04:00:00Z"),
            Err(TimelinesError::Validation(_))
        ));
    }

    #[test]
    fn serde_uses_canonical_string() {
        let stamp = must_ok(DateStamp::parse("2010:050:12:30:00"));
        let json = must_ok(serde_json::to_string(&stamp));
        assert_eq!(json, "\"2010:050:12:30:00.000\"");
        let back: DateStamp = must_ok(serde_json::from_str(&json));
        assert_eq!(back, stamp);
    }
}
