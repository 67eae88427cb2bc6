//! CSV readers for movement requests and account seeds

use crate::types::{AccountNumber, EngineError, MovementRequest, ReceiptNumber, RequestId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// One row of the movement request input file
///
/// Headers: `account_number,amount,movement_type,receipt_number` with an
/// optional trailing `original_movement_id` column for reversals.
#[derive(Debug, Deserialize)]
struct RequestRow {
    account_number: AccountNumber,
    // Parsed from the raw text: the csv crate's inferred path for Decimal
    // goes through f64 and loses the fixed-point scale.
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    movement_type: String,
    receipt_number: ReceiptNumber,
    #[serde(default)]
    original_movement_id: Option<RequestId>,
}

/// One row of the account seed file
///
/// Headers: `account_number,balance`.
#[derive(Debug, Deserialize)]
pub struct AccountSeed {
    pub account_number: AccountNumber,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// Read movement requests from a headed CSV file
///
/// Whitespace around fields is tolerated. A malformed row fails the whole
/// read with the offending line number.
pub fn read_requests(path: &Path) -> Result<Vec<MovementRequest>, EngineError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut requests = Vec::new();
    for row in reader.deserialize() {
        let row: RequestRow = row?;
        requests.push(MovementRequest {
            account_number: row.account_number,
            amount: row.amount,
            movement: row.movement_type,
            receipt_number: row.receipt_number,
            original_movement_id: row.original_movement_id,
        });
    }

    info!(path = %path.display(), count = requests.len(), "movement requests loaded");
    Ok(requests)
}

/// Read account seeds from a headed CSV file
pub fn read_account_seeds(path: &Path) -> Result<Vec<AccountSeed>, EngineError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut seeds = Vec::new();
    for row in reader.deserialize() {
        seeds.push(row?);
    }

    info!(path = %path.display(), count = seeds.len(), "account seeds loaded");
    Ok(seeds)
}
