/// Energy quantities in watt hours and kilowatt hours.
pub mod energy;

/// Monetary amounts with truncating display precision.
pub mod money;

/// The decimal number type backing all calculations.
pub mod number;

/// Instants, durations and time-of-day windows.
pub mod time;
