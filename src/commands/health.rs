//! Connectivity check (`health`)
//!
//! Reads worksheet metadata once, without retries, and reports the outcome
//! as a [`HealthReport`]. Failures become part of the report instead of
//! propagating.

use std::time::Instant;

use crate::error::{Result, SheetsError, EXIT_AUTH, EXIT_DATA, EXIT_OK};
use crate::logging::mask_sensitive;
use crate::model::{timestamp_now, HealthReport, HealthStatus};
use crate::sheets::SheetSource;

/// Probe the worksheet and build a report
pub async fn check_health(source: &dyn SheetSource) -> HealthReport {
    let started = Instant::now();
    let outcome = source.worksheet_metadata().await;
    let latency_ms = elapsed_ms(started);

    match outcome {
        Ok(metadata) => {
            tracing::info!(
                latency_ms,
                rows = metadata.row_count,
                cols = metadata.column_count,
                "Health check passed"
            );
            HealthReport {
                ok: true,
                status: HealthStatus::Healthy,
                latency_ms,
                timestamp: timestamp_now(),
                worksheet: Some(metadata.title),
                row_count: Some(metadata.row_count),
                col_count: Some(metadata.column_count),
                error: None,
            }
        }
        Err(e) => failed_report(&e, latency_ms),
    }
}

/// Report for a check that failed before or during the remote call
pub fn failed_report(error: &SheetsError, latency_ms: u64) -> HealthReport {
    let status = match error {
        SheetsError::Authentication(_) => HealthStatus::AuthError,
        _ => HealthStatus::Error,
    };
    let message = mask_sensitive(&error.to_string());
    tracing::warn!(latency_ms, status = ?status, error = %message, "Health check failed");

    HealthReport {
        ok: false,
        status,
        latency_ms,
        timestamp: timestamp_now(),
        worksheet: None,
        row_count: None,
        col_count: None,
        error: Some(message),
    }
}

/// Process exit code for a report
pub fn exit_code(report: &HealthReport) -> u8 {
    match report.status {
        HealthStatus::Healthy => EXIT_OK,
        HealthStatus::AuthError => EXIT_AUTH,
        HealthStatus::Error => EXIT_DATA,
    }
}

/// Build the source with `connect`, probe it, and write the report
///
/// Errors from `connect` (an unreadable key file, for example) are reported
/// like failures of the remote call.
pub async fn run_health<F>(connect: F, out: Option<&std::path::Path>) -> Result<u8>
where
    F: FnOnce() -> Result<Box<dyn SheetSource>>,
{
    let started = Instant::now();
    let report = match connect() {
        Ok(source) => check_health(source.as_ref()).await,
        Err(e) => failed_report(&e, elapsed_ms(started)),
    };

    crate::extract::write_json(&report, out, true)?;
    Ok(exit_code(&report))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
