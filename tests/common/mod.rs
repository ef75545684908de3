use std::{
    fs::{read_dir, File},
    path::PathBuf,
};

use chrono_tz::Tz;
use serde::Deserialize;

use ocpp_billing::{
    chunk::ConsumptionUpdate,
    pricer::{ConsumptionPricer, PricedConsumptionData, TransactionPricer},
    tariff::PricingDefinition,
    types::{money::Money, time::DateTime},
};

/// A recorded session with the totals the engine is expected to produce.
#[derive(Deserialize)]
pub struct SessionCase {
    pub time_zone: Option<String>,
    pub session_started_at: DateTime,
    pub updates: Vec<ConsumptionUpdate>,
    pub expected: Expected,
}

#[derive(Deserialize)]
pub struct Expected {
    pub total_cost: Money,
    pub total_cost_rounded: Money,
    pub totals: PricedConsumptionData,
}

pub struct JsonTest {
    pub path: PathBuf,
    pub tariffs: Vec<PricingDefinition>,
    pub session: SessionCase,
}

pub fn collect_json_tests() -> Result<Vec<JsonTest>, Box<dyn std::error::Error>> {
    let mut tests = Vec::new();

    for test_dir in read_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/resources"))? {
        let test_dir_path = test_dir?.path();

        if !test_dir_path.is_dir() {
            continue;
        }

        let tariffs = serde_json::from_reader(File::open(test_dir_path.join("tariffs.json"))?)?;
        let session = serde_json::from_reader(File::open(test_dir_path.join("session.json"))?)?;

        tests.push(JsonTest {
            tariffs,
            session,
            path: test_dir_path,
        });
    }

    Ok(tests)
}

pub fn validate_session(test: &JsonTest) {
    let time_zone = test
        .session
        .time_zone
        .as_deref()
        .map(|name| name.parse::<Tz>().unwrap());

    // The incremental path, one pass per consumption update.
    let mut pricer =
        TransactionPricer::new(&test.tariffs, test.session.session_started_at, time_zone);

    for update in &test.session.updates {
        pricer.price_update(update).unwrap();
    }

    assert_eq!(*pricer.totals(), test.session.expected.totals, "totals");
    assert_eq!(
        pricer.totals().total_cost(),
        test.session.expected.total_cost,
        "total_cost"
    );
    assert_eq!(
        pricer.totals().total_cost_rounded(),
        test.session.expected.total_cost_rounded,
        "total_cost_rounded"
    );

    // The one-shot path must agree with the incremental path.
    let report = ConsumptionPricer::new(&test.tariffs, time_zone)
        .price_updates(test.session.session_started_at, &test.session.updates)
        .unwrap();

    assert_eq!(report.total, test.session.expected.totals, "report totals");
    assert_eq!(
        report.total_cost, test.session.expected.total_cost,
        "report total_cost"
    );

    let chunk_sum = report
        .chunks
        .iter()
        .fold(Money::default(), |sum, chunk| sum.saturating_add(chunk.cost()));
    assert_eq!(chunk_sum, report.total_cost, "per-chunk cost sum");
}
