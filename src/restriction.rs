use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveTime, Weekday};
use chrono_tz::Tz;

use crate::chunk::ConsumptionChunk;
use crate::tariff::PricingRestrictions;
use crate::types::{energy::Kwh, number::Number, time::TimeWindow};

/// Compile the declared restrictions into their evaluation order: day of
/// week, time of day, energy bounds, duration bounds.
pub(crate) fn collect_restrictions(restrictions: &PricingRestrictions) -> Vec<Restriction> {
    let mut collected = Vec::new();

    if !restrictions.days_of_week.is_empty() {
        collected.push(Restriction::DayOfWeek(HashSet::from_iter(
            restrictions.days_of_week.iter().copied().map(Into::into),
        )));
    }

    match (restrictions.time_from, restrictions.time_to) {
        (Some(from), Some(to)) => {
            collected.push(Restriction::Window(TimeWindow::new(from.into(), to.into())));
        }
        (Some(from), None) => collected.push(Restriction::StartTime(from.into())),
        (None, Some(to)) => collected.push(Restriction::EndTime(to.into())),
        (None, None) => {}
    }

    if let Some(min_kwh) = restrictions.min_energy_kwh {
        collected.push(Restriction::MinKwh(min_kwh));
    }

    if let Some(max_kwh) = restrictions.max_energy_kwh {
        collected.push(Restriction::MaxKwh(max_kwh));
    }

    if let Some(min_duration) = restrictions.min_duration {
        collected.push(Restriction::MinDuration(min_duration.into()));
    }

    if let Some(max_duration) = restrictions.max_duration {
        collected.push(Restriction::MaxDuration(max_duration.into()));
    }

    collected
}

#[derive(Debug, Clone)]
pub(crate) enum Restriction {
    DayOfWeek(HashSet<Weekday>),
    Window(TimeWindow),
    StartTime(NaiveTime),
    EndTime(NaiveTime),
    MinKwh(Kwh),
    MaxKwh(Kwh),
    MinDuration(Duration),
    MaxDuration(Duration),
}

impl Restriction {
    /// Checks if this restriction holds for `chunk`. The minimum bounds are
    /// inclusive, the maximum bounds exclusive.
    ///
    /// Wall-clock restrictions are evaluated on the chunk's start instant in
    /// the session time zone. Without a known time zone they fail, which
    /// conservatively excludes the tariff rather than mis-evaluating it.
    pub(crate) fn validity(&self, chunk: &ConsumptionChunk, time_zone: Option<Tz>) -> bool {
        let local_time = || time_zone.map(|tz| chunk.started_at.with_timezone(&tz).time());

        match self {
            Self::DayOfWeek(days) => time_zone
                .map(|tz| days.contains(&chunk.started_at.with_timezone(&tz).weekday()))
                .unwrap_or(false),
            Self::Window(window) => local_time().map(|t| window.contains(t)).unwrap_or(false),
            &Self::StartTime(from) => local_time().map(|t| t >= from).unwrap_or(false),
            &Self::EndTime(to) => local_time().map(|t| t < to).unwrap_or(false),
            &Self::MinKwh(min_energy) => {
                chunk.cumulated_consumption_wh.kilo_watt_hours() >= Number::from(min_energy)
            }
            &Self::MaxKwh(max_energy) => {
                chunk.cumulated_consumption_wh.kilo_watt_hours() < Number::from(max_energy)
            }
            &Self::MinDuration(min_duration) => chunk.total_duration >= min_duration,
            &Self::MaxDuration(max_duration) => chunk.total_duration < max_duration,
        }
    }
}
