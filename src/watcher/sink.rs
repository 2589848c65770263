//! Destinations for watch-mode results

use std::path::PathBuf;

use crate::error::Result;
use crate::extract::write_json;
use crate::model::ExtractionResult;

/// Receives each emitted extraction result
pub trait Sink: Send {
    fn emit(&mut self, result: &ExtractionResult) -> Result<()>;
}

/// Writes results as JSON
///
/// Without a path each result is one compact line on stdout; with a path
/// the file is overwritten with the pretty-printed latest result.
#[derive(Debug, Clone, Default)]
pub struct JsonSink {
    out: Option<PathBuf>,
}

impl JsonSink {
    pub fn new(out: Option<PathBuf>) -> Self {
        Self { out }
    }
}

impl Sink for JsonSink {
    fn emit(&mut self, result: &ExtractionResult) -> Result<()> {
        let pretty = self.out.is_some();
        write_json(result, self.out.as_deref(), pretty)
    }
}

/// Keeps results in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub results: Vec<ExtractionResult>,
}

impl Sink for MemorySink {
    fn emit(&mut self, result: &ExtractionResult) -> Result<()> {
        self.results.push(result.clone());
        Ok(())
    }
}
