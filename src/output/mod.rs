//! Output renderers: terminal and JSON.

pub mod json;
pub mod terminal;

use crate::orchestrator::CycleReport;

/// Trait for rendering a review cycle report to an output format.
pub trait OutputRenderer {
    /// Render the report to a string.
    fn render(&self, report: &CycleReport) -> String;
}
