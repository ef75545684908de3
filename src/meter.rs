use chrono::Duration;

use crate::{
    chunk::ConsumptionUpdate,
    types::{
        energy::Wh,
        number::Number,
        time::{seconds_number, DateTime},
    },
};

const SECS_IN_HOUR: i64 = 3600;

/// A single raw meter value reported by the charging station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MeterReading {
    /// The instant the meter value was sampled.
    pub timestamp: DateTime,
    /// The absolute meter value, in Wh.
    pub meter_wh: Wh,
}

/// Consumption derived from two consecutive meter readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionSample {
    /// The instant of the later of the two readings.
    pub timestamp: DateTime,
    /// The consumption rate over the interval, normalized to an hourly rate
    /// regardless of the actual sampling interval.
    pub rate_wh_per_hour: Number,
    /// The meter value at `timestamp`.
    pub cumulative_wh: Wh,
}

/// Derives consumption samples from the ordered meter readings of one
/// transaction.
///
/// A leading reading is synthesized from the transaction's starting meter
/// value and, once the transaction closes, a trailing reading from the
/// closing meter value. Readings must be pushed in chronological order.
pub struct MeterSampleAggregator {
    readings: Vec<MeterReading>,
    stop: Option<MeterReading>,
}

impl MeterSampleAggregator {
    /// Start aggregating a transaction that began at `started_at` with the
    /// given starting meter value.
    pub fn new(started_at: DateTime, start_meter_wh: Wh) -> Self {
        Self {
            readings: vec![MeterReading {
                timestamp: started_at,
                meter_wh: start_meter_wh,
            }],
            stop: None,
        }
    }

    /// Record a periodic meter reading.
    pub fn push(&mut self, reading: MeterReading) {
        self.readings.push(reading);
    }

    /// Record the closing meter value once the transaction stopped.
    pub fn close(&mut self, stopped_at: DateTime, stop_meter_wh: Wh) {
        self.stop = Some(MeterReading {
            timestamp: stopped_at,
            meter_wh: stop_meter_wh,
        });
    }

    /// The consumption samples for every consecutive pair of readings
    /// received so far, in chronological order.
    pub fn samples(&self) -> Vec<ConsumptionSample> {
        let mut samples = Vec::new();
        let mut prev: Option<&MeterReading> = None;

        for reading in self.readings.iter().chain(self.stop.iter()) {
            if let Some(earlier) = prev {
                samples.push(derive_sample(earlier, reading));
            }

            prev = Some(reading);
        }

        samples
    }

    /// The most recent consumption rate, or zero while fewer than two
    /// readings exist.
    pub fn current_rate(&self) -> Number {
        let mut iter = self.readings.iter().chain(self.stop.iter()).rev();

        let (Some(later), Some(earlier)) = (iter.next(), iter.next()) else {
            return Number::zero();
        };

        derive_sample(earlier, later).rate_wh_per_hour
    }

    /// Fold all samples received so far into a single consumption-to-date
    /// record covering the whole observed interval. Returns `None` while no
    /// time has elapsed yet.
    ///
    /// Intervals without any energy delivery count as inactivity.
    pub fn consumption_to_date(&self) -> Option<ConsumptionUpdate> {
        let started_at = self.readings.first()?.timestamp;

        let mut consumption = Wh::zero();
        let mut inactivity = Duration::zero();
        let mut ended_at = started_at;
        let mut prev: Option<&MeterReading> = None;

        for reading in self.readings.iter().chain(self.stop.iter()) {
            if let Some(earlier) = prev {
                consumption = consumption.saturating_add(normalized_delta(earlier, reading));

                if derive_sample(earlier, reading).rate_wh_per_hour.is_zero() {
                    inactivity = inactivity + reading.timestamp.signed_duration_since(earlier.timestamp);
                }

                ended_at = reading.timestamp;
            }

            prev = Some(reading);
        }

        if ended_at <= started_at {
            return None;
        }

        Some(ConsumptionUpdate {
            started_at,
            ended_at,
            consumption_wh: consumption,
            cumulated_consumption_wh: consumption,
            total_duration: ended_at.signed_duration_since(started_at).into(),
            inactivity: inactivity.into(),
            total_inactivity: inactivity.into(),
        })
    }
}

/// The energy delivered between two consecutive readings. A decreasing meter
/// value is a detected rollover and is treated as a reset to zero.
fn normalized_delta(earlier: &MeterReading, later: &MeterReading) -> Wh {
    let delta = later.meter_wh.saturating_sub(earlier.meter_wh);

    if delta.is_negative() {
        later.meter_wh
    } else {
        delta
    }
}

fn derive_sample(earlier: &MeterReading, later: &MeterReading) -> ConsumptionSample {
    let delta = Number::from(normalized_delta(earlier, later));
    let seconds = seconds_number(later.timestamp.signed_duration_since(earlier.timestamp));

    // Coincident readings carry no rate.
    let rate = delta
        .saturating_mul(Number::from(SECS_IN_HOUR))
        .checked_div(seconds)
        .unwrap_or_else(Number::zero);

    ConsumptionSample {
        timestamp: later.timestamp,
        rate_wh_per_hour: rate,
        cumulative_wh: later.meter_wh,
    }
}
