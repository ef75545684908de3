use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chunk::{chunks, ConsumptionChunk, ConsumptionUpdate},
    meter::MeterSampleAggregator,
    tariff::{DimensionPrice, PricingDefinition, Tariff, Tariffs},
    types::{
        energy::Wh,
        money::Money,
        number::Number,
        time::{hours_number, DateTime},
    },
    Error, Result,
};

const SECS_IN_HOUR: i64 = 3600;

/// Session-scoped mutable pricing state.
///
/// One context exists per transaction, created before the first chunk is
/// priced and discarded when the transaction's pricing is finalized. Every
/// priced chunk mutates it in place; the absorption markers are what prevent
/// double billing across chunk boundaries and tariff switches. Callers must
/// serialize pricing passes per transaction, contexts of different
/// transactions are fully independent.
#[derive(Debug, Clone)]
pub struct PricerContext {
    /// Whether the per-session flat fee has been billed.
    pub flat_fee_priced: bool,
    /// Start of the transaction.
    pub session_started_at: DateTime,
    /// Cumulative energy that has already been priced, or deliberately
    /// passed unpriced, in Wh.
    pub last_absorbed_consumption_wh: Wh,
    /// The instant up to which charging time has been billed.
    pub last_absorbed_charging_time: DateTime,
    /// The instant up to which parking time has been billed.
    pub last_absorbed_parking_time: DateTime,
    /// The session time zone, when known. Without it wall-clock restricted
    /// tariffs are excluded from matching.
    pub time_zone: Option<Tz>,
}

impl PricerContext {
    /// Create the context for a transaction that started at
    /// `session_started_at`. Both time markers start at the session start.
    pub fn new(session_started_at: DateTime, time_zone: Option<Tz>) -> Self {
        Self {
            flat_fee_priced: false,
            session_started_at,
            last_absorbed_consumption_wh: Wh::zero(),
            last_absorbed_charging_time: session_started_at,
            last_absorbed_parking_time: session_started_at,
            time_zone,
        }
    }
}

/// The priced result of a single dimension.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PricedDimensionData {
    /// Price per unit of the tariff this was priced with. `None` in an
    /// accumulated total whose chunks were priced at different unit prices.
    pub unit_price: Option<Money>,
    /// The amount at full decimal precision.
    pub amount: Money,
    /// `amount` truncated to two decimals. Accumulation recomputes this from
    /// the running sum, truncations are never summed.
    pub rounded_amount: Money,
    /// Billed quantity: sessions for the flat fee, kWh for energy, hours for
    /// the time dimensions.
    pub quantity: Number,
    /// The step size that was applied, if any.
    pub step_size: Option<u64>,
    /// Name of the pricing definition this was priced with. `None` in an
    /// accumulated total whose chunks were priced by different definitions.
    pub tariff: Option<String>,
}

impl PricedDimensionData {
    fn new(price: &DimensionPrice, tariff: &Tariff, quantity: Number, amount: Money) -> Self {
        Self {
            unit_price: Some(price.unit_price),
            amount,
            rounded_amount: amount.truncated(),
            quantity,
            step_size: price.step_size,
            tariff: Some(tariff.name.clone()),
        }
    }
}

/// The priced result of a chunk, an update, or a whole session: up to four
/// per-dimension results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PricedConsumptionData {
    /// The flat fee dimension.
    pub flat_fee: Option<PricedDimensionData>,
    /// The energy dimension.
    pub energy: Option<PricedDimensionData>,
    /// The charging time dimension.
    pub charging_time: Option<PricedDimensionData>,
    /// The parking time dimension.
    pub parking_time: Option<PricedDimensionData>,
}

impl PricedConsumptionData {
    /// Merge `priced` into these running totals.
    ///
    /// Quantities and amounts are summed at full precision; the rounded
    /// amount is recomputed as the truncation of the running sum, never as a
    /// sum of previously truncated values, so no truncation drift can
    /// accumulate.
    pub fn absorb(&mut self, priced: &PricedConsumptionData) {
        absorb_dimension(&mut self.flat_fee, priced.flat_fee.as_ref());
        absorb_dimension(&mut self.energy, priced.energy.as_ref());
        absorb_dimension(&mut self.charging_time, priced.charging_time.as_ref());
        absorb_dimension(&mut self.parking_time, priced.parking_time.as_ref());
    }

    /// The full precision grand total over all dimensions.
    pub fn total_cost(&self) -> Money {
        [
            self.flat_fee.as_ref(),
            self.energy.as_ref(),
            self.charging_time.as_ref(),
            self.parking_time.as_ref(),
        ]
        .into_iter()
        .flatten()
        .fold(Money::zero(), |total, dimension| {
            total.saturating_add(dimension.amount)
        })
    }

    /// The grand total truncated to two decimals.
    pub fn total_cost_rounded(&self) -> Money {
        self.total_cost().truncated()
    }
}

fn absorb_dimension(total: &mut Option<PricedDimensionData>, priced: Option<&PricedDimensionData>) {
    let Some(priced) = priced else { return };

    match total {
        None => *total = Some(priced.clone()),
        Some(total) => {
            total.quantity = total.quantity + priced.quantity;
            total.amount = total.amount.saturating_add(priced.amount);
            total.rounded_amount = total.amount.truncated();
            // The descriptive fields only survive while every merged chunk
            // agrees on them; a mixed total never implies a single uniform
            // price, step or definition.
            if total.unit_price != priced.unit_price {
                total.unit_price = None;
            }
            if total.step_size != priced.step_size {
                total.step_size = None;
            }
            if total.tariff != priced.tariff {
                total.tariff = None;
            }
        }
    }
}

/// Price one chunk against the first applicable tariff, for all four
/// dimensions independently, mutating `context` so that later chunks never
/// bill the same energy or time again.
pub fn price_chunk(
    tariffs: &Tariffs,
    context: &mut PricerContext,
    chunk: &ConsumptionChunk,
) -> Result<PricedConsumptionData> {
    if chunk.consumption_wh.is_negative() {
        return Err(Error::InconsistentConsumption);
    }

    let tariff = tariffs.resolve(chunk, context.time_zone);

    Ok(PricedConsumptionData {
        flat_fee: price_flat_fee(tariff, context),
        energy: price_energy(tariff, context, chunk),
        charging_time: price_charging_time(tariff, context, chunk),
        parking_time: price_parking_time(tariff, context, chunk),
    })
}

/// The flat fee is billed once per session, on the first chunk that resolves
/// a tariff with an active flat fee. Later chunks yield an explicit zero
/// result so the per-chunk schema stays stable.
fn price_flat_fee(tariff: Option<&Tariff>, context: &mut PricerContext) -> Option<PricedDimensionData> {
    let tariff = tariff?;
    let price = tariff.flat_fee.as_ref()?;

    if context.flat_fee_priced {
        return Some(PricedDimensionData::new(
            price,
            tariff,
            Number::zero(),
            Money::zero(),
        ));
    }

    context.flat_fee_priced = true;

    Some(PricedDimensionData::new(
        price,
        tariff,
        Number::from(1i64),
        price.unit_price,
    ))
}

fn price_energy(
    tariff: Option<&Tariff>,
    context: &mut PricerContext,
    chunk: &ConsumptionChunk,
) -> Option<PricedDimensionData> {
    let Some((tariff, price)) = tariff.and_then(|t| t.energy.as_ref().map(|p| (t, p))) else {
        // Energy that passes unpriced is still absorbed, so a later tariff
        // switch cannot bill it retroactively.
        context.last_absorbed_consumption_wh = chunk.cumulated_consumption_wh;
        return None;
    };

    if let Some(step) = price.step_size {
        let step = Number::from(step);
        let cumulated = Number::from(chunk.cumulated_consumption_wh);
        let pending = cumulated - Number::from(context.last_absorbed_consumption_wh);

        let steps = pending
            .checked_div(step)
            .unwrap_or_else(|| unreachable!("step size is non-zero"))
            .floor();

        // A partial step stays pending until it completes.
        if steps <= Number::zero() {
            return None;
        }

        let billed_wh = steps * step;
        let quantity = billed_wh
            .checked_div(Number::from(1000i64))
            .unwrap_or_else(|| unreachable!("divisor is non-zero"));
        let amount = price.unit_price * quantity;

        context.last_absorbed_consumption_wh = Wh::from(
            cumulated
                .checked_div(step)
                .unwrap_or_else(|| unreachable!("step size is non-zero"))
                .floor()
                * step,
        );

        Some(PricedDimensionData::new(price, tariff, quantity, amount))
    } else {
        context.last_absorbed_consumption_wh = chunk.cumulated_consumption_wh;

        if chunk.consumption_wh.is_zero() {
            return None;
        }

        let quantity = chunk.consumption_wh.kilo_watt_hours();
        let amount = price.unit_price * quantity;

        Some(PricedDimensionData::new(price, tariff, quantity, amount))
    }
}

/// Charging time only runs while the chunk actually delivers energy, never
/// while idle.
fn price_charging_time(
    tariff: Option<&Tariff>,
    context: &mut PricerContext,
    chunk: &ConsumptionChunk,
) -> Option<PricedDimensionData> {
    let Some((tariff, price)) = tariff.and_then(|t| t.charging_time.as_ref().map(|p| (t, p)))
    else {
        context.last_absorbed_charging_time = chunk.ended_at;
        return None;
    };

    if chunk.consumption_wh.is_zero() {
        return None;
    }

    price_elapsed_time(
        tariff,
        price,
        &mut context.last_absorbed_charging_time,
        chunk.ended_at,
    )
}

/// Parking time covers post-charge idle periods only: the chunk must have
/// inactivity without consumption, and the session must already have
/// delivered energy. The pre-charge warm-up window is never billed.
fn price_parking_time(
    tariff: Option<&Tariff>,
    context: &mut PricerContext,
    chunk: &ConsumptionChunk,
) -> Option<PricedDimensionData> {
    let Some((tariff, price)) = tariff.and_then(|t| t.parking_time.as_ref().map(|p| (t, p)))
    else {
        context.last_absorbed_parking_time = chunk.ended_at;
        return None;
    };

    if chunk.total_inactivity <= Duration::zero()
        || !chunk.consumption_wh.is_zero()
        || chunk.cumulated_consumption_wh.is_zero()
    {
        return None;
    }

    price_elapsed_time(
        tariff,
        price,
        &mut context.last_absorbed_parking_time,
        chunk.ended_at,
    )
}

/// Price the time elapsed between the absorption marker and the chunk end.
///
/// With a step size only whole completed blocks are billed and the marker
/// advances by exactly the billed blocks, so an unpriced remainder carries
/// forward to the next chunk instead of being lost. Without a step size the
/// exact elapsed time is billed at `unit_price` per hour and the marker
/// advances to the chunk end.
fn price_elapsed_time(
    tariff: &Tariff,
    price: &DimensionPrice,
    last_absorbed: &mut DateTime,
    chunk_end: DateTime,
) -> Option<PricedDimensionData> {
    let elapsed = chunk_end.signed_duration_since(*last_absorbed);

    if elapsed <= Duration::zero() {
        return None;
    }

    if let Some(step) = price.step_size {
        let step = i64::try_from(step).ok()?;
        let blocks = elapsed.num_seconds() / step;

        if blocks == 0 {
            return None;
        }

        let billed_seconds = blocks * step;
        let quantity = Number::from(billed_seconds)
            .checked_div(Number::from(SECS_IN_HOUR))
            .unwrap_or_else(|| unreachable!("divisor is non-zero"));
        let amount = price.unit_price * quantity;

        *last_absorbed += Duration::try_seconds(billed_seconds)?;

        Some(PricedDimensionData::new(price, tariff, quantity, amount))
    } else {
        let quantity = hours_number(elapsed);
        let amount = price.unit_price * quantity;

        *last_absorbed = chunk_end;

        Some(PricedDimensionData::new(price, tariff, quantity, amount))
    }
}

/// Incremental pricing engine for one transaction.
///
/// Owns the compiled tariff list, the transaction's [`PricerContext`] and
/// the running totals. Call [`TransactionPricer::price_update`] once per
/// incoming meter-reading batch, strictly in chronological order and never
/// interleaved with another pass for the same transaction.
pub struct TransactionPricer {
    tariffs: Tariffs,
    context: PricerContext,
    totals: PricedConsumptionData,
}

impl TransactionPricer {
    /// Create the pricer for a transaction that started at
    /// `session_started_at`, with the ordered tariff list of its resolved
    /// pricing hierarchy.
    pub fn new(
        definitions: &[PricingDefinition],
        session_started_at: DateTime,
        time_zone: Option<Tz>,
    ) -> Self {
        Self {
            tariffs: Tariffs::new(definitions),
            context: PricerContext::new(session_started_at, time_zone),
            totals: PricedConsumptionData::default(),
        }
    }

    /// Price all chunks of `update` and fold them into the running totals.
    /// Returns the priced data for this update alone.
    pub fn price_update(&mut self, update: &ConsumptionUpdate) -> Result<PricedConsumptionData> {
        let mut priced = PricedConsumptionData::default();
        let mut chunk_count = 0u32;

        for chunk in chunks(update)? {
            let result = price_chunk(&self.tariffs, &mut self.context, &chunk)?;
            priced.absorb(&result);
            chunk_count += 1;
        }

        debug!(
            chunks = chunk_count,
            update_cost = %priced.total_cost(),
            "priced consumption update"
        );

        self.totals.absorb(&priced);

        Ok(priced)
    }

    /// The running totals over all updates priced so far.
    pub fn totals(&self) -> &PricedConsumptionData {
        &self.totals
    }

    /// The transaction's pricing state.
    pub fn context(&self) -> &PricerContext {
        &self.context
    }
}

/// One-shot pricing of a fully recorded session.
///
/// Where [`TransactionPricer`] accumulates state between meter-reading
/// batches, this path prices a whole session in a single pass from its
/// consumption records and produces a report with a per-chunk breakdown.
pub struct ConsumptionPricer {
    tariffs: Tariffs,
    time_zone: Option<Tz>,
}

impl ConsumptionPricer {
    /// Create the pricer with the ordered tariff list of the session's
    /// resolved pricing hierarchy.
    pub fn new(definitions: &[PricingDefinition], time_zone: Option<Tz>) -> Self {
        Self {
            tariffs: Tariffs::new(definitions),
            time_zone,
        }
    }

    /// Price the whole session observed by `aggregator`.
    pub fn price_session(&self, aggregator: &MeterSampleAggregator) -> Result<Report> {
        let Some(update) = aggregator.consumption_to_date() else {
            return Ok(Report::empty());
        };

        self.price_updates(update.started_at, &[update])
    }

    /// Price the session's ordered consumption records in one pass with a
    /// fresh context.
    pub fn price_updates(
        &self,
        session_started_at: DateTime,
        updates: &[ConsumptionUpdate],
    ) -> Result<Report> {
        let mut context = PricerContext::new(session_started_at, self.time_zone);
        let mut total = PricedConsumptionData::default();
        let mut chunk_reports = Vec::new();

        for update in updates {
            for chunk in chunks(update)? {
                let data = price_chunk(&self.tariffs, &mut context, &chunk)?;
                total.absorb(&data);

                chunk_reports.push(ChunkReport {
                    started_at: chunk.started_at,
                    ended_at: chunk.ended_at,
                    consumption_wh: chunk.consumption_wh,
                    data,
                });
            }
        }

        Ok(Report {
            total_cost: total.total_cost(),
            total_cost_rounded: total.total_cost_rounded(),
            total,
            chunks: chunk_reports,
        })
    }
}

/// A fully priced session with its per-chunk breakdown.
#[derive(Debug, Serialize)]
pub struct Report {
    /// The priced chunks, in chronological order.
    pub chunks: Vec<ChunkReport>,
    /// The per-dimension totals.
    pub total: PricedConsumptionData,
    /// The full precision grand total.
    pub total_cost: Money,
    /// The grand total truncated to two decimals.
    pub total_cost_rounded: Money,
}

impl Report {
    fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            total: PricedConsumptionData::default(),
            total_cost: Money::zero(),
            total_cost_rounded: Money::zero(),
        }
    }
}

/// The priced result of a single chunk.
#[derive(Debug, Serialize)]
pub struct ChunkReport {
    /// Start of the chunk.
    pub started_at: DateTime,
    /// End of the chunk.
    pub ended_at: DateTime,
    /// Energy delivered during the chunk, in Wh.
    pub consumption_wh: Wh,
    /// The per-dimension results of this chunk.
    pub data: PricedConsumptionData,
}

impl ChunkReport {
    /// The total cost of all dimensions in this chunk.
    pub fn cost(&self) -> Money {
        self.data.total_cost()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use chrono_tz::Tz;
    use rust_decimal_macros::dec;

    use super::{price_chunk, PricerContext, TransactionPricer};
    use crate::{
        chunk::{chunks, ConsumptionUpdate},
        tariff::{
            DimensionDefinition, PricingDefinition, PricingDimensions, PricingRestrictions,
            Tariffs,
        },
        types::{
            energy::{Kwh, Wh},
            money::Money,
            number::Number,
            time::DateTime,
        },
    };

    fn start() -> DateTime {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn dimension(price: rust_decimal::Decimal, step_size: Option<u64>) -> Option<DimensionDefinition> {
        Some(DimensionDefinition {
            active: true,
            unit_price: Money::from(price),
            step_size,
        })
    }

    fn single(name: &str, dimensions: PricingDimensions) -> Vec<PricingDefinition> {
        vec![PricingDefinition {
            name: name.into(),
            restrictions: None,
            dimensions,
        }]
    }

    fn update(
        offset_secs: i64,
        duration_secs: i64,
        consumption: rust_decimal::Decimal,
        cumulated: rust_decimal::Decimal,
    ) -> ConsumptionUpdate {
        let started_at = start() + Duration::try_seconds(offset_secs).unwrap();

        ConsumptionUpdate {
            started_at,
            ended_at: started_at + Duration::try_seconds(duration_secs).unwrap(),
            consumption_wh: Wh::from(consumption),
            cumulated_consumption_wh: Wh::from(cumulated),
            total_duration: Duration::try_seconds(offset_secs + duration_secs).unwrap().into(),
            inactivity: Duration::zero().into(),
            total_inactivity: Duration::zero().into(),
        }
    }

    #[test]
    fn flat_fee_is_billed_exactly_once() {
        let definitions = single(
            "standard",
            PricingDimensions {
                flat_fee: dimension(dec!(2.50), None),
                energy: dimension(dec!(0.25), None),
                ..PricingDimensions::default()
            },
        );

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        let mut results = Vec::new();
        for chunk in chunks(&update(0, 300, dec!(3000), dec!(3000))).unwrap() {
            results.push(price_chunk(&tariffs, &mut context, &chunk).unwrap());
        }

        assert_eq!(results.len(), 5);

        let quantities: Vec<_> = results
            .iter()
            .map(|r| r.flat_fee.as_ref().unwrap().quantity)
            .collect();

        assert_eq!(quantities[0], Number::from(1i64));
        for quantity in &quantities[1..] {
            // Explicit zero results, never absent.
            assert_eq!(*quantity, Number::zero());
        }

        assert_eq!(
            results[0].flat_fee.as_ref().unwrap().amount,
            Money::from(dec!(2.50))
        );
    }

    #[test]
    fn rounded_amount_truncates_instead_of_rounding() {
        let definitions = single(
            "standard",
            PricingDimensions {
                energy: dimension(dec!(0.67), None),
                ..PricingDimensions::default()
            },
        );

        let mut pricer = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));
        let priced = pricer.price_update(&update(0, 60, dec!(1500), dec!(1500))).unwrap();

        let energy = priced.energy.unwrap();
        assert_eq!(energy.amount, Money::from(dec!(1.005)));
        assert_eq!(energy.rounded_amount, Money::from(dec!(1.00)));
    }

    #[test]
    fn energy_step_bills_only_completed_steps() {
        let definitions = single(
            "stepped",
            PricingDimensions {
                energy: dimension(dec!(0.10), Some(100)),
                ..PricingDimensions::default()
            },
        );

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        let first: Vec<_> = chunks(&update(0, 60, dec!(250), dec!(250)))
            .unwrap()
            .map(|c| price_chunk(&tariffs, &mut context, &c).unwrap())
            .collect();

        let energy = first[0].energy.as_ref().unwrap();
        assert_eq!(energy.quantity, Number::from(dec!(0.2)));
        assert_eq!(energy.amount, Money::from(dec!(0.02)));
        assert_eq!(context.last_absorbed_consumption_wh, Wh::from(dec!(200)));

        // Crossing from 250 to 340 Wh completes exactly one more step.
        let second: Vec<_> = chunks(&update(60, 60, dec!(90), dec!(340)))
            .unwrap()
            .map(|c| price_chunk(&tariffs, &mut context, &c).unwrap())
            .collect();

        let energy = second[0].energy.as_ref().unwrap();
        assert_eq!(energy.quantity, Number::from(dec!(0.1)));
        assert_eq!(context.last_absorbed_consumption_wh, Wh::from(dec!(300)));

        // The partial 40 Wh stays pending.
        let third: Vec<_> = chunks(&update(120, 60, dec!(20), dec!(360)))
            .unwrap()
            .map(|c| price_chunk(&tariffs, &mut context, &c).unwrap())
            .collect();

        assert!(third[0].energy.is_none());
        assert_eq!(context.last_absorbed_consumption_wh, Wh::from(dec!(300)));
    }

    #[test]
    fn absorbed_consumption_never_decreases() {
        let definitions = single(
            "standard",
            PricingDimensions {
                energy: dimension(dec!(0.25), Some(100)),
                ..PricingDimensions::default()
            },
        );

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        let mut previous = Wh::zero();
        for chunk in chunks(&update(0, 600, dec!(1234), dec!(1234))).unwrap() {
            price_chunk(&tariffs, &mut context, &chunk).unwrap();
            assert!(context.last_absorbed_consumption_wh >= previous);
            previous = context.last_absorbed_consumption_wh;
        }
    }

    #[test]
    fn tariff_switch_does_not_rebill_absorbed_energy() {
        let early = PricingDefinition {
            name: "first-kwh".into(),
            restrictions: Some(PricingRestrictions {
                max_energy_kwh: Some(Kwh::from(dec!(1))),
                ..PricingRestrictions::default()
            }),
            dimensions: PricingDimensions {
                energy: dimension(dec!(0.30), None),
                ..PricingDimensions::default()
            },
        };
        let late = PricingDefinition {
            name: "stepped".into(),
            restrictions: None,
            dimensions: PricingDimensions {
                energy: dimension(dec!(0.20), Some(500)),
                ..PricingDimensions::default()
            },
        };

        let tariffs = Tariffs::new(&[early, late]);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        // First update stays below 1 kWh and is priced without a step.
        for chunk in chunks(&update(0, 60, dec!(600), dec!(600))).unwrap() {
            price_chunk(&tariffs, &mut context, &chunk).unwrap();
        }
        assert_eq!(context.last_absorbed_consumption_wh, Wh::from(dec!(600)));

        // The second update switches to the stepped tariff; only the energy
        // beyond the absorbed 600 Wh counts towards its steps.
        let mut billed = Number::zero();
        for chunk in chunks(&update(60, 60, dec!(800), dec!(1400))).unwrap() {
            let priced = price_chunk(&tariffs, &mut context, &chunk).unwrap();
            if let Some(energy) = priced.energy {
                billed = billed + energy.quantity;
            }
        }

        assert_eq!(billed, Number::from(dec!(0.5)));
        assert_eq!(context.last_absorbed_consumption_wh, Wh::from(dec!(1000)));
    }

    #[test]
    fn unmatched_chunks_absorb_energy_unpriced() {
        // Only applies from 1 kWh onwards; nothing matches before that.
        let definitions = vec![PricingDefinition {
            name: "late".into(),
            restrictions: Some(PricingRestrictions {
                min_energy_kwh: Some(Kwh::from(dec!(1))),
                ..PricingRestrictions::default()
            }),
            dimensions: PricingDimensions {
                energy: dimension(dec!(0.25), None),
                ..PricingDimensions::default()
            },
        }];

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        for chunk in chunks(&update(0, 60, dec!(600), dec!(600))).unwrap() {
            let priced = price_chunk(&tariffs, &mut context, &chunk).unwrap();
            assert!(priced.energy.is_none());
        }

        // The unpriced energy was still absorbed.
        assert_eq!(context.last_absorbed_consumption_wh, Wh::from(dec!(600)));
    }

    #[test]
    fn charging_time_runs_only_while_delivering_energy() {
        let definitions = single(
            "hourly",
            PricingDimensions {
                charging_time: dimension(dec!(6.00), None),
                ..PricingDimensions::default()
            },
        );

        let mut pricer = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));

        let charging = pricer.price_update(&update(0, 36, dec!(500), dec!(500))).unwrap();
        let time = charging.charging_time.unwrap();
        // 36 seconds at 6.00 per hour.
        assert_eq!(time.quantity, Number::from(dec!(0.01)));
        assert_eq!(time.amount, Money::from(dec!(0.06)));

        // An idle update bills no charging time.
        let idle = pricer.price_update(&update(36, 60, dec!(0), dec!(500))).unwrap();
        assert!(idle.charging_time.is_none());
    }

    #[test]
    fn charging_time_step_carries_the_remainder_forward() {
        let definitions = single(
            "blocks",
            PricingDimensions {
                charging_time: dimension(dec!(3.60), Some(90)),
                ..PricingDimensions::default()
            },
        );

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        let results: Vec<_> = chunks(&update(0, 180, dec!(1800), dec!(1800)))
            .unwrap()
            .map(|c| price_chunk(&tariffs, &mut context, &c).unwrap())
            .collect();

        // 60 s elapsed: no completed 90 s block yet.
        assert!(results[0].charging_time.is_none());
        // 120 s elapsed: one block, the marker advances by exactly 90 s.
        let block = results[1].charging_time.as_ref().unwrap();
        assert_eq!(block.quantity, Number::from(dec!(0.025)));
        assert_eq!(
            context.last_absorbed_charging_time,
            start() + Duration::try_seconds(90).unwrap()
        );
        // 180 s elapsed: the carried remainder completes the next block.
        assert!(results[2].charging_time.is_some());
    }

    #[test]
    fn parking_time_excludes_the_pre_charge_warm_up() {
        let definitions = single(
            "parking",
            PricingDimensions {
                parking_time: dimension(dec!(1.20), None),
                ..PricingDimensions::default()
            },
        );

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        // Idle before any energy was delivered: never billed as parking.
        let mut warm_up = update(0, 60, dec!(0), dec!(0));
        warm_up.inactivity = Duration::try_seconds(60).unwrap().into();
        warm_up.total_inactivity = Duration::try_seconds(60).unwrap().into();

        for chunk in chunks(&warm_up).unwrap() {
            let priced = price_chunk(&tariffs, &mut context, &chunk).unwrap();
            assert!(priced.parking_time.is_none());
        }
    }

    #[test]
    fn post_charge_idle_time_is_billed_as_parking() {
        let definitions = single(
            "parking",
            PricingDimensions {
                energy: dimension(dec!(0.25), None),
                parking_time: dimension(dec!(1.20), None),
                ..PricingDimensions::default()
            },
        );

        let mut pricer = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));

        pricer.price_update(&update(0, 36, dec!(500), dec!(500))).unwrap();

        let mut idle = update(36, 36, dec!(0), dec!(500));
        idle.inactivity = Duration::try_seconds(36).unwrap().into();
        idle.total_inactivity = Duration::try_seconds(36).unwrap().into();

        let priced = pricer.price_update(&idle).unwrap();
        let parking = priced.parking_time.unwrap();

        // Elapsed runs from the parking absorption marker, which still sits
        // at the session start.
        assert_eq!(parking.quantity, Number::from(dec!(0.02)));
        assert_eq!(
            pricer.context().last_absorbed_parking_time,
            start() + Duration::try_seconds(72).unwrap()
        );
    }

    #[test]
    fn end_to_end_energy_total() {
        let definitions = single(
            "standard",
            PricingDimensions {
                energy: dimension(dec!(0.25), None),
                ..PricingDimensions::default()
            },
        );

        let mut pricer = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));
        let priced = pricer.price_update(&update(0, 300, dec!(3000), dec!(3000))).unwrap();

        let energy = priced.energy.unwrap();
        assert_eq!(energy.quantity, Number::from(dec!(3)));
        assert_eq!(energy.amount, Money::from(dec!(0.75)));
        assert_eq!(pricer.totals().total_cost(), Money::from(dec!(0.75)));
    }

    #[test]
    fn partitioning_does_not_change_the_billed_energy() {
        let definitions = single(
            "standard",
            PricingDimensions {
                energy: dimension(dec!(0.25), None),
                ..PricingDimensions::default()
            },
        );

        let mut whole = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));
        whole.price_update(&update(0, 300, dec!(3000), dec!(3000))).unwrap();

        let mut split = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));
        for i in 0..5 {
            let cumulated = rust_decimal::Decimal::from((i + 1) * 600);
            split
                .price_update(&update(i * 60, 60, dec!(600), cumulated))
                .unwrap();
        }

        let whole_energy = whole.totals().energy.as_ref().unwrap();
        let split_energy = split.totals().energy.as_ref().unwrap();
        assert_eq!(whole_energy.quantity, split_energy.quantity);
        assert_eq!(whole_energy.amount, split_energy.amount);
    }

    #[test]
    fn mixed_tariff_totals_do_not_claim_a_single_price() {
        let early = PricingDefinition {
            name: "first-kwh".into(),
            restrictions: Some(PricingRestrictions {
                max_energy_kwh: Some(Kwh::from(dec!(1))),
                ..PricingRestrictions::default()
            }),
            dimensions: PricingDimensions {
                energy: dimension(dec!(0.30), None),
                ..PricingDimensions::default()
            },
        };
        let late = PricingDefinition {
            name: "onwards".into(),
            restrictions: None,
            dimensions: PricingDimensions {
                energy: dimension(dec!(0.20), None),
                ..PricingDimensions::default()
            },
        };

        let mut pricer = TransactionPricer::new(&[early, late], start(), Some(Tz::UTC));
        pricer.price_update(&update(0, 60, dec!(600), dec!(600))).unwrap();
        pricer.price_update(&update(60, 60, dec!(600), dec!(1200))).unwrap();

        let energy = pricer.totals().energy.as_ref().unwrap();
        // 0.6 kWh at 0.30 plus 0.6 kWh at 0.20.
        assert_eq!(energy.quantity, Number::from(dec!(1.2)));
        assert_eq!(energy.amount, Money::from(dec!(0.30)));
        assert!(energy.unit_price.is_none());
        assert!(energy.tariff.is_none());
    }

    #[test]
    fn uniform_totals_keep_their_tariff_metadata() {
        let definitions = single(
            "standard",
            PricingDimensions {
                energy: dimension(dec!(0.25), None),
                ..PricingDimensions::default()
            },
        );

        let mut pricer = TransactionPricer::new(&definitions, start(), Some(Tz::UTC));
        pricer.price_update(&update(0, 120, dec!(1200), dec!(1200))).unwrap();

        let energy = pricer.totals().energy.as_ref().unwrap();
        assert_eq!(energy.unit_price, Some(Money::from(dec!(0.25))));
        assert_eq!(energy.tariff.as_deref(), Some("standard"));
    }

    #[test]
    fn negative_consumption_is_rejected() {
        let definitions = single(
            "standard",
            PricingDimensions {
                energy: dimension(dec!(0.25), None),
                ..PricingDimensions::default()
            },
        );

        let tariffs = Tariffs::new(&definitions);
        let mut context = PricerContext::new(start(), Some(Tz::UTC));

        let chunk = crate::chunk::ConsumptionChunk {
            started_at: start(),
            ended_at: start() + Duration::try_seconds(60).unwrap(),
            consumption_wh: Wh::from(dec!(-5)),
            cumulated_consumption_wh: Wh::from(dec!(100)),
            total_duration: Duration::try_seconds(60).unwrap(),
            total_inactivity: Duration::zero(),
        };

        assert!(matches!(
            price_chunk(&tariffs, &mut context, &chunk),
            Err(crate::Error::InconsistentConsumption)
        ));
    }
}
