use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::chunk::ConsumptionChunk;
use crate::restriction::{collect_restrictions, Restriction};
use crate::types::{
    energy::Kwh,
    money::Money,
    time::{ClockTime, DayOfWeek, SecondsRound},
};

/// A named pricing rule set, gated by optional restrictions.
///
/// This is the wire form as produced by the out-of-scope tariff hierarchy
/// resolver; compile a list of definitions into [`Tariffs`] for pricing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingDefinition {
    /// Name identifying this definition in priced results.
    pub name: String,

    /// When absent this definition applies unconditionally.
    pub restrictions: Option<PricingRestrictions>,

    /// The prices per billing dimension.
    pub dimensions: PricingDimensions,
}

/// The four billable dimensions of a pricing definition.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricingDimensions {
    /// A per-session fee, billed once on the first chunk.
    pub flat_fee: Option<DimensionDefinition>,

    /// Price per kWh of delivered energy.
    pub energy: Option<DimensionDefinition>,

    /// Price per hour of time spent delivering energy.
    pub charging_time: Option<DimensionDefinition>,

    /// Price per hour of post-charge idle time.
    pub parking_time: Option<DimensionDefinition>,
}

/// The price of a single dimension.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DimensionDefinition {
    /// An inactive dimension stays on the chosen definition but prices
    /// nothing.
    pub active: bool,

    /// Price per unit: session, kWh or hour depending on the dimension.
    pub unit_price: Money,

    /// Minimum billable quantum: Wh for energy, seconds for the time
    /// dimensions. Partial quanta are never billed.
    pub step_size: Option<u64>,
}

/// Restricts when a pricing definition applies.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricingRestrictions {
    /// Days of the week, in the session time zone, this definition applies.
    #[serde(default)]
    pub days_of_week: Vec<DayOfWeek>,

    /// Valid from this local time of day.
    pub time_from: Option<ClockTime>,

    /// Valid until this local time of day. An end before the start makes the
    /// window span midnight.
    pub time_to: Option<ClockTime>,

    /// Valid from this cumulative session energy, inclusive.
    pub min_energy_kwh: Option<Kwh>,

    /// Valid below this cumulative session energy, exclusive.
    pub max_energy_kwh: Option<Kwh>,

    /// Valid from this total session duration, inclusive, in seconds.
    pub min_duration: Option<SecondsRound>,

    /// Valid below this total session duration, exclusive, in seconds.
    pub max_duration: Option<SecondsRound>,
}

/// The ordered tariff list of one resolved pricing hierarchy.
pub struct Tariffs(Vec<Tariff>);

impl Tariffs {
    /// Compile the ordered definitions for pricing. The order determines
    /// precedence: the first applicable definition wins.
    pub fn new(definitions: &[PricingDefinition]) -> Self {
        Self(definitions.iter().map(Tariff::new).collect())
    }

    /// The first definition, in list order, whose restrictions all hold for
    /// `chunk`. The chosen tariff applies to the whole chunk, for all
    /// dimensions collectively; tariffs are never combined within one chunk.
    pub fn resolve(&self, chunk: &ConsumptionChunk, time_zone: Option<Tz>) -> Option<&Tariff> {
        let tariff = self.0.iter().find(|t| t.applies_to(chunk, time_zone));

        trace!(
            tariff = tariff.map(|t| t.name.as_str()),
            chunk_start = %chunk.started_at,
            "resolved tariff for chunk"
        );

        tariff
    }
}

/// A compiled pricing definition.
pub struct Tariff {
    /// Name of the source definition.
    pub name: String,
    restrictions: Vec<Restriction>,
    pub(crate) flat_fee: Option<DimensionPrice>,
    pub(crate) energy: Option<DimensionPrice>,
    pub(crate) charging_time: Option<DimensionPrice>,
    pub(crate) parking_time: Option<DimensionPrice>,
}

impl Tariff {
    fn new(definition: &PricingDefinition) -> Self {
        let restrictions = definition
            .restrictions
            .as_ref()
            .map(collect_restrictions)
            .unwrap_or_default();

        let dimensions = &definition.dimensions;

        Self {
            name: definition.name.clone(),
            restrictions,
            flat_fee: DimensionPrice::active(dimensions.flat_fee),
            energy: DimensionPrice::active(dimensions.energy),
            charging_time: DimensionPrice::active(dimensions.charging_time),
            parking_time: DimensionPrice::active(dimensions.parking_time),
        }
    }

    /// A restriction-free tariff always applies. Restrictions are evaluated
    /// in declared order, stopping at the first failure.
    fn applies_to(&self, chunk: &ConsumptionChunk, time_zone: Option<Tz>) -> bool {
        self.restrictions
            .iter()
            .all(|restriction| restriction.validity(chunk, time_zone))
    }
}

/// The compiled price of one active dimension.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DimensionPrice {
    pub unit_price: Money,
    pub step_size: Option<u64>,
}

impl DimensionPrice {
    /// Inactive dimensions and zero step sizes compile away.
    fn active(definition: Option<DimensionDefinition>) -> Option<Self> {
        let definition = definition.filter(|d| d.active)?;

        Some(Self {
            unit_price: definition.unit_price,
            step_size: definition.step_size.filter(|&step| step > 0),
        })
    }
}
