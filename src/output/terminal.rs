//! Terminal renderer: styled flowing text.

use colored::Colorize;

use crate::models::Severity;
use crate::orchestrator::CycleReport;
use crate::output::OutputRenderer;
use crate::platform::ReviewEvent;

/// Terminal output renderer with colored, flowing text.
pub struct TerminalRenderer;

impl OutputRenderer for TerminalRenderer {
    fn render(&self, report: &CycleReport) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            " {} {}\n",
            report.pull_request.to_string().bold(),
            report.title
        ));
        output.push_str(&format!(
            " {} files, {} fetched\n\n",
            report.files.len(),
            report.fetched_count()
        ));

        if report.review.issues.is_empty() {
            output.push_str(&format!("{}", "  ✔ No issues found.\n".green()));
        }
        for issue in &report.review.issues {
            let (icon, severity) = match issue.severity {
                Severity::Critical => ("✖".red().bold(), "critical".red().bold()),
                Severity::Warning => ("⚠".yellow().bold(), "warning".yellow().bold()),
                Severity::Info => ("ℹ".blue().bold(), "info".blue().bold()),
            };
            let location = match (&issue.file, issue.line) {
                (Some(file), Some(line)) => format!(" in {}", format!("{file}:{line}").bold()),
                (Some(file), None) => format!(" in {}", file.bold()),
                _ => String::new(),
            };
            let fixable = if issue.fixable {
                format!(" {}", "(fixable)".cyan())
            } else {
                String::new()
            };
            output.push_str(&format!(" {icon} {severity}{location}{fixable}\n"));
            output.push_str(&format!("   {}\n", issue.description));
        }

        output.push('\n');
        if let Some(ref reason) = report.decision.reason {
            output.push_str(&format!(" {} {reason}\n", "✖".red()));
        }
        for criterion in &report.decision.criteria {
            let marker = if criterion.passed {
                "✔".green()
            } else {
                "✖".red()
            };
            output.push_str(&format!(" {marker} {}\n", criterion.description));
        }

        output.push_str(&format!("{}\n", "───────────────────────────────────".dimmed()));
        let action = match report.action {
            ReviewEvent::Approve => "approve".green().bold(),
            ReviewEvent::RequestChanges => "request changes".red().bold(),
            ReviewEvent::Comment => "comment".yellow().bold(),
        };
        let posted = if report.posted { "posted" } else { "not posted" };
        output.push_str(&format!(" verdict: {action} ({})\n", posted.dimmed()));

        if let Some(ref outcome) = report.remediation {
            let status = if outcome.succeeded {
                "pushed".green().bold()
            } else {
                "not applied".yellow().bold()
            };
            output.push_str(&format!(
                " auto-fix: {status}, {} fix(es) at stage {}\n",
                outcome.fixed_count, outcome.stage
            ));
            if let Some(ref error) = outcome.error {
                output.push_str(&format!("   {} {error}\n", "→".cyan()));
            }
        }

        output
    }
}
