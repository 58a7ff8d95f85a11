//! JSON output renderer.
//!
//! Outputs the whole [`CycleReport`] plus a `summary` block.

use crate::orchestrator::CycleReport;
use crate::output::OutputRenderer;

/// JSON output renderer.
pub struct JsonRenderer;

impl OutputRenderer for JsonRenderer {
    fn render(&self, report: &CycleReport) -> String {
        let output = serde_json::json!({
            "report": report,
            "summary": {
                "files": report.files.len(),
                "fetched": report.fetched_count(),
                "issues": report.review.issues.len(),
                "critical": report.review.critical_count(),
                "approved": report.decision.approve,
                "action": report.action,
            },
        });

        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }
}
