//! Write-path validation for telemetry batches.
//!
//! A service may only write telemetry attributed to itself; ownership is
//! compared on sanitized values since that is what gets persisted.

use thiserror::Error;

use crate::sanitize::sanitize_field;
use crate::types::TelemetryRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Empty requests array is not allowed")]
    EmptyBatch,

    #[error("Service mismatch: expected {expected}, got {got}")]
    ServiceMismatch { expected: String, got: String },
}

/// Validates a telemetry batch against the authenticated caller and returns
/// the sanitized records ready for persistence.
///
/// The whole batch is rejected on the first mismatched record; partial batch
/// success is not a supported semantic (the store persists the result as one
/// transaction).
pub fn validate_batch(
    records: Vec<TelemetryRecord>,
    caller_service: &str,
) -> Result<Vec<TelemetryRecord>, IngestError> {
    if records.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    let expected = sanitize_field(caller_service);
    let sanitized: Vec<TelemetryRecord> = records
        .into_iter()
        .map(TelemetryRecord::sanitized)
        .collect();

    for record in &sanitized {
        if record.service != expected {
            return Err(IngestError::ServiceMismatch {
                expected: expected.clone(),
                got: record.service.clone(),
            });
        }
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::{validate_batch, IngestError};
    use crate::types::TelemetryRecord;

    fn record(service: &str) -> TelemetryRecord {
        TelemetryRecord {
            service: service.to_string(),
            node: None,
            method: "GET".to_string(),
            endpoint: "/orders".to_string(),
            status: 200,
            response_time: 12,
            consumer: "partner".to_string(),
            context: None,
            created_at: None,
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert_eq!(
            validate_batch(Vec::new(), "payments"),
            Err(IngestError::EmptyBatch)
        );
    }

    #[test]
    fn mismatched_service_rejects_the_whole_batch() {
        let batch = vec![record("payments"), record("orders")];
        let err = validate_batch(batch, "payments").expect_err("must reject");
        assert_eq!(
            err,
            IngestError::ServiceMismatch {
                expected: "payments".to_string(),
                got: "orders".to_string(),
            }
        );
    }

    #[test]
    fn comparison_happens_on_sanitized_values() {
        // Markup in the submitted service name strips down to the caller's
        // identity, so the record is accepted and stored clean.
        let batch = vec![record("<b>payments</b>")];
        let accepted = validate_batch(batch, "payments").expect("sanitized match");
        assert_eq!(accepted[0].service, "payments");
    }

    #[test]
    fn accepted_records_come_back_sanitized() {
        let mut dirty = record("payments");
        dirty.endpoint = "/orders<script>alert(1)</script>".to_string();
        dirty.node = Some("node\r\n1".to_string());

        let accepted = validate_batch(vec![dirty], "payments").expect("valid batch");
        assert_eq!(accepted[0].endpoint, "/ordersalert(1)");
        assert_eq!(accepted[0].node.as_deref(), Some("node 1"));
    }
}
