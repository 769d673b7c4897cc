use stackup_rollback::{ActionRecord, ActionStatus, PendingAction, UnwindReport};

use super::ReportFormatter;

pub(crate) struct PlainTextFormatter;

impl PlainTextFormatter {
    fn format_record(output: &mut String, record: &ActionRecord) {
        let mark = match record.status {
            ActionStatus::Succeeded => "✓",
            ActionStatus::Failed => "✗",
        };
        output.push_str(&format!(
            "  {mark} [{}] {}",
            record.priority, record.description
        ));
        if let Some(error) = &record.error {
            output.push_str(&format!(": {error}"));
        }
        output.push('\n');
    }

    fn format_critical_banner(output: &mut String, report: &UnwindReport) {
        let failures = report.critical_failures();
        if failures.is_empty() {
            return;
        }

        output.push('\n');
        output.push_str("!!! CRITICAL: access-restoring undo actions failed !!!\n");
        output.push_str(
            "SSH or firewall state could not be restored. Keep this session open,\n\
             verify console access and restore the following by hand:\n",
        );
        for record in failures {
            output.push_str(&format!("  - {}\n", record.description));
        }
    }
}

impl ReportFormatter for PlainTextFormatter {
    fn format_report(&self, report: &UnwindReport) -> String {
        if report.is_empty() {
            return format!("Nothing to roll back ({}).\n", report.reason());
        }

        let mut output = format!("Rolling back ({}):\n", report.reason());
        for record in report.records() {
            Self::format_record(&mut output, record);
        }
        output.push_str(&format!(
            "{} of {} undo action(s) failed\n",
            report.failure_count(),
            report.attempted()
        ));
        Self::format_critical_banner(&mut output, report);
        output
    }

    fn format_pending(&self, heading: &str, pending: &[PendingAction]) -> String {
        let mut output = format!("{heading}: {}\n", pending.len());
        for action in pending {
            output.push_str(&format!("  #{} {action}\n", action.sequence));
        }
        output
    }
}
