use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    types::{
        energy::Wh,
        number::Number,
        time::{DateTime, SecondsRound},
    },
    Error, Result,
};

/// The upper bound on a single chunk. Restrictions are evaluated per chunk,
/// so this bound determines how accurately a tariff switch lands on its
/// boundary.
const MAX_CHUNK_MILLIS: i64 = 60_000;

/// A consumption-to-date record, produced by the metering subsystem each
/// time new meter readings arrive for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConsumptionUpdate {
    /// Start of the interval covered by this update.
    pub started_at: DateTime,
    /// End of the interval covered by this update.
    pub ended_at: DateTime,
    /// Energy delivered during this update, in Wh.
    pub consumption_wh: Wh,
    /// Session total energy up to `ended_at`, in Wh.
    pub cumulated_consumption_wh: Wh,
    /// Session total duration up to `ended_at`, in seconds.
    pub total_duration: SecondsRound,
    /// Inactivity during this update, in seconds.
    #[serde(default)]
    pub inactivity: SecondsRound,
    /// Session total inactivity up to `ended_at`, in seconds.
    #[serde(default)]
    pub total_inactivity: SecondsRound,
}

/// A bounded sub-interval of a session's consumption timeline.
///
/// The `total` fields are session totals up to the chunk's end, the basis
/// for the energy and duration restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionChunk {
    /// Start of this chunk.
    pub started_at: DateTime,
    /// End of this chunk, always after `started_at`.
    pub ended_at: DateTime,
    /// Energy delivered during this chunk, in Wh.
    pub consumption_wh: Wh,
    /// Session total energy up to `ended_at`, in Wh.
    pub cumulated_consumption_wh: Wh,
    /// Session total duration up to `ended_at`.
    pub total_duration: Duration,
    /// Session total inactivity up to `ended_at`.
    pub total_inactivity: Duration,
}

/// Split `update` into a lazy, in-order sequence of chunks of at most one
/// minute each.
///
/// An update of at most one minute yields a single chunk spanning the whole
/// interval, without proportional division. Longer updates are divided into
/// minute-bounded sub-intervals with the energy attributed proportionally at
/// full decimal precision; the final chunk takes the undistributed remainder
/// so the partition always sums exactly to the update's consumption.
pub fn chunks(update: &ConsumptionUpdate) -> Result<Chunks> {
    if update.ended_at <= update.started_at {
        return Err(Error::InvalidInterval {
            start: update.started_at,
            end: update.ended_at,
        });
    }

    let elapsed = update.ended_at.signed_duration_since(update.started_at);
    let inactivity = Duration::from(update.inactivity);
    let total_duration = Duration::from(update.total_duration);
    let total_inactivity = Duration::from(update.total_inactivity);

    Ok(Chunks {
        started_at: update.started_at,
        elapsed_millis: elapsed.num_milliseconds(),
        consumption: update.consumption_wh,
        base_cumulated: update
            .cumulated_consumption_wh
            .saturating_sub(update.consumption_wh),
        base_duration: total_duration
            .checked_sub(&elapsed)
            .unwrap_or_else(Duration::zero),
        base_inactivity: total_inactivity
            .checked_sub(&inactivity)
            .unwrap_or_else(Duration::zero),
        inactivity_millis: inactivity.num_milliseconds(),
        total_inactivity,
        // A consumption-free update whose whole elapsed time is inactivity
        // prices trailing idle time after the session ended; every chunk
        // then carries the full inactivity total.
        idle: update.consumption_wh.is_zero()
            && inactivity.num_milliseconds() >= elapsed.num_milliseconds(),
        offset_millis: 0,
        distributed: Wh::zero(),
    })
}

/// Lazy, in-order, single-consume sequence of [`ConsumptionChunk`]s.
///
/// The chunk count is proportional to the update duration; multi-day
/// sessions never require the whole partition in memory at once.
pub struct Chunks {
    started_at: DateTime,
    elapsed_millis: i64,
    consumption: Wh,
    base_cumulated: Wh,
    base_duration: Duration,
    base_inactivity: Duration,
    inactivity_millis: i64,
    total_inactivity: Duration,
    idle: bool,
    offset_millis: i64,
    distributed: Wh,
}

impl Iterator for Chunks {
    type Item = ConsumptionChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset_millis >= self.elapsed_millis {
            return None;
        }

        let sub_millis = MAX_CHUNK_MILLIS.min(self.elapsed_millis - self.offset_millis);
        let end_millis = self.offset_millis + sub_millis;
        let is_final = end_millis >= self.elapsed_millis;

        let consumption_wh = if is_final {
            self.consumption.saturating_sub(self.distributed)
        } else {
            Wh::from(
                Number::from(self.consumption)
                    .saturating_mul(Number::from(sub_millis))
                    .checked_div(Number::from(self.elapsed_millis))
                    .unwrap_or_else(|| unreachable!("the interval is non-empty")),
            )
        };
        self.distributed = self.distributed.saturating_add(consumption_wh);

        let total_inactivity = if self.idle {
            self.total_inactivity
        } else {
            let prorated = self.inactivity_millis * end_millis / self.elapsed_millis;
            self.base_inactivity + Duration::milliseconds(prorated)
        };

        let chunk = ConsumptionChunk {
            started_at: self.started_at + Duration::milliseconds(self.offset_millis),
            ended_at: self.started_at + Duration::milliseconds(end_millis),
            consumption_wh,
            cumulated_consumption_wh: self.base_cumulated.saturating_add(self.distributed),
            total_duration: self.base_duration + Duration::milliseconds(end_millis),
            total_inactivity,
        };

        self.offset_millis = end_millis;

        Some(chunk)
    }
}
