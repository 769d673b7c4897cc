use stackup_rollback::{PendingAction, UnwindReport};

pub(crate) trait ReportFormatter {
    fn format_report(&self, report: &UnwindReport) -> String;
    fn format_pending(&self, heading: &str, pending: &[PendingAction]) -> String;
}
