use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};

use super::number::Number;
use crate::Error;

const MILLIS_IN_SEC: i64 = 1000;
const MILLIS_IN_HOUR: i64 = 3_600_000;

/// A `chrono` UTC date time.
pub type DateTime = chrono::DateTime<chrono::Utc>;

pub(crate) fn seconds_number(duration: Duration) -> Number {
    Number::from(duration.num_milliseconds())
        .checked_div(Number::from(MILLIS_IN_SEC))
        .unwrap_or_else(|| unreachable!("divisor is non-zero"))
}

pub(crate) fn hours_number(duration: Duration) -> Number {
    Number::from(duration.num_milliseconds())
        .checked_div(Number::from(MILLIS_IN_HOUR))
        .unwrap_or_else(|| unreachable!("divisor is non-zero"))
}

/// A generic duration type that converts from and to a integer amount of seconds.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SecondsRound(Duration);

impl<'de> Deserialize<'de> for SecondsRound {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as DeError;

        let seconds: i64 = u64::deserialize(deserializer)?
            .try_into()
            .map_err(|_| DeError::custom(Error::NumericOverflow))?;

        let duration = Duration::try_seconds(seconds)
            .ok_or_else(|| DeError::custom(Error::NumericOverflow))?;

        Ok(Self(duration))
    }
}

impl Serialize for SecondsRound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let seconds = self.0.num_seconds();
        serializer.serialize_i64(seconds)
    }
}

impl From<SecondsRound> for Duration {
    fn from(value: SecondsRound) -> Self {
        value.0
    }
}

impl From<Duration> for SecondsRound {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

/// A local time of day, without a date, in `HH:MM` notation.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize)]
pub struct ClockTime(NaiveTime);

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let s = <String as Deserialize>::deserialize(deserializer)?;
        let time = NaiveTime::parse_from_str(&s, "%H:%M").map_err(D::Error::custom)?;

        Ok(Self(time))
    }
}

impl From<ClockTime> for NaiveTime {
    fn from(value: ClockTime) -> Self {
        value.0
    }
}

/// A time-of-day window, possibly spanning midnight.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TimeWindow {
    from: NaiveTime,
    to: NaiveTime,
}

impl TimeWindow {
    /// A window with `to` earlier than `from` spans midnight.
    pub fn new(from: NaiveTime, to: NaiveTime) -> Self {
        Self { from, to }
    }

    /// Whether `time` falls inside this window. The start is inclusive and
    /// the end exclusive, also when the window spans midnight.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.to < self.from {
            // Spanning midnight: the complement of the ordinary test with
            // the endpoints swapped.
            !(time >= self.to && time < self.from)
        } else {
            time >= self.from && time < self.to
        }
    }
}

/// Days of the week.
#[derive(Debug, Copy, PartialEq, Eq, Clone, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl From<DayOfWeek> for chrono::Weekday {
    fn from(day: DayOfWeek) -> Self {
        match day {
            DayOfWeek::Monday => Self::Mon,
            DayOfWeek::Tuesday => Self::Tue,
            DayOfWeek::Wednesday => Self::Wed,
            DayOfWeek::Thursday => Self::Thu,
            DayOfWeek::Friday => Self::Fri,
            DayOfWeek::Saturday => Self::Sat,
            DayOfWeek::Sunday => Self::Sun,
        }
    }
}
