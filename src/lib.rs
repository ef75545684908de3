//! # OCPP billing engine
//!
//! Converts the stream of periodic meter values reported by a charging
//! station during a transaction into running, correctly-dimensioned monetary
//! totals. Use a [`pricer::TransactionPricer`] to price an in-progress
//! transaction incrementally, one consumption update at a time, or a
//! [`pricer::ConsumptionPricer`] to price a fully recorded session in one
//! pass.
//!
//! The engine is a pure computation module: tariff definitions, the session
//! time zone and the consumption-to-date records are supplied synchronously
//! by the caller and no I/O happens inside. Amounts are tax-rate agnostic,
//! whether they include tax depends entirely on the externally configured
//! tariff prices.

use std::fmt;

use crate::types::time::DateTime;

/// Deriving consumption samples from raw meter readings.
pub mod meter;

/// Splitting consumption intervals into bounded chunks.
pub mod chunk;

/// Tariff definitions and first-match tariff resolution.
pub mod tariff;

/// Module containing the functionality to price consumption chunks and
/// accumulate the results into running totals.
pub mod pricer;

mod restriction;

/// Numeric types used for calculations, serializing and deserializing.
pub mod types;

type Result<T> = std::result::Result<T, Error>;

/// Possible errors when pricing a charge transaction.
#[derive(Debug)]
pub enum Error {
    /// A consumption interval ended on or before its own start.
    ///
    /// This is a caller defect, the metering layer must never produce such an
    /// interval. It is rejected before any chunk is generated.
    InvalidInterval {
        /// Start of the rejected interval.
        start: DateTime,
        /// End of the rejected interval.
        end: DateTime,
    },
    /// A negative consumption value reached energy pricing.
    ///
    /// Signals a defect in the upstream metering subsystem, a meter rollover
    /// must already have been normalized into a reset by the sample
    /// aggregation.
    InconsistentConsumption,
    /// A numeric overflow occurred during price calculation.
    NumericOverflow,
}

impl From<rust_decimal::Error> for Error {
    fn from(_: rust_decimal::Error) -> Self {
        Self::NumericOverflow
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval { start, end } => {
                write!(f, "consumption interval ends at {end} on or before its start {start}")
            }
            Self::InconsistentConsumption => {
                f.write_str("a negative consumption value reached energy pricing")
            }
            Self::NumericOverflow => {
                f.write_str("a numeric overflow occurred during price calculation")
            }
        }
    }
}
