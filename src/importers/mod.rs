// Importers: heterogeneous CSV exports -> persisted entities.
//
// All three importers share one contract: resolve columns fuzzily, validate
// and group rows, suppress duplicates, insert what survives, and report
// everything that didn't make it (errors / skipped / duplicates). Row-level
// problems never abort an import; a missing required column aborts before
// any write.

pub mod bank;
pub mod contract;
pub mod invoice;

pub use bank::BankImporter;
pub use contract::ContractImporter;
pub use invoice::{InvoiceFormat, InvoiceImporter};

use chrono::Utc;
use serde::Serialize;

/// Result of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    /// True when at least one record landed (or there was nothing to do but
    /// nothing went structurally wrong).
    pub success: bool,
    pub message: String,
    pub imported: usize,
}

impl ImportOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        ImportOutcome {
            success: false,
            message: message.into(),
            imported: 0,
        }
    }
}

/// Detailed per-run report: what was rejected and why.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub batch_id: String,
    pub errors: Vec<String>,
    pub skipped: Vec<String>,
    pub duplicates: Vec<String>,
}

impl ImportSummary {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }
}

/// Batch tag stamped on every record inserted by one import run, so
/// "transactions imported together" stay groupable later.
pub fn new_batch_id() -> String {
    Utc::now().format("batch_%Y%m%d_%H%M%S").to_string()
}

/// Trim a description for duplicate reports.
pub(crate) fn truncate_desc(desc: &str, max_chars: usize) -> String {
    if desc.chars().count() <= max_chars {
        desc.to_string()
    } else {
        let cut: String = desc.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_batch_id_format() {
        let batch = new_batch_id();
        assert!(batch.starts_with("batch_"));
        assert_eq!(batch.len(), "batch_20250801_120000".len());
    }

    #[test]
    fn test_truncate_desc() {
        assert_eq!(truncate_desc("short", 30), "short");
        let long = "a".repeat(40);
        let truncated = truncate_desc(&long, 30);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 33);
    }
}
