//! One-shot extraction (`run`)

use std::path::Path;

use crate::error::Result;
use crate::extract::{extract, write_json, ExtractionRequest};
use crate::model::ExtractionResult;
use crate::sheets::SheetSource;

/// Extract once and write the result as pretty-printed JSON
///
/// Transient failures are not retried here; they surface as errors and
/// map to the data exit code.
///
/// # Arguments
///
/// * `source` - Worksheet to read
/// * `request` - Filter, projection and limit
/// * `out` - Output file; stdout when `None`
pub async fn run_extraction(
    source: &dyn SheetSource,
    request: &ExtractionRequest,
    out: Option<&Path>,
) -> Result<ExtractionResult> {
    tracing::info!(filter = %request.filter.summary(), "Starting extraction");

    let result = extract(source, request).await?;
    write_json(&result, out, true)?;

    if let Some(path) = out {
        tracing::info!(count = result.count, path = %path.display(), "Results written");
    }
    Ok(result)
}
