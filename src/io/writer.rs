//! CSV writer for submit outcomes

use crate::types::{EngineError, SubmitOutcome};
use std::io::Write;

/// Write submit outcomes as headed CSV
///
/// Columns: `id,balance,status_code,queue_name`, one row per submitted
/// movement, in submission order.
pub fn write_outcomes<W: Write>(writer: W, outcomes: &[SubmitOutcome]) -> Result<(), EngineError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for outcome in outcomes {
        csv_writer.serialize(outcome)?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;
    use rust_decimal::Decimal;

    #[test]
    fn test_write_outcomes() {
        let outcomes = vec![
            SubmitOutcome::authorized(1, Decimal::new(800_00, 2), "queue_2".to_string()),
            SubmitOutcome::rejected(
                StatusCode::Duplicate,
                Decimal::new(800_00, 2),
                "queue_2".to_string(),
            ),
        ];

        let mut buffer = Vec::new();
        write_outcomes(&mut buffer, &outcomes).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("id,balance,status_code,queue_name"));
        assert_eq!(lines.next(), Some("1,800.00,0,queue_2"));
        assert_eq!(lines.next(), Some("0,800.00,2,queue_2"));
    }

    #[test]
    fn test_write_no_outcomes_writes_nothing() {
        let mut buffer = Vec::new();
        write_outcomes(&mut buffer, &[]).unwrap();

        assert!(buffer.is_empty());
    }
}
