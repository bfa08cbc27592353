use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{degraded, pending, succeeded};
use crate::reconcile::{Phase, ReconcileReport};

/// Spinner shown while a one-shot reconciliation pass talks to GitLab
pub struct PassProgress {
    pb: ProgressBar,
}

impl PassProgress {
    pub fn start(phase: Phase) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg} {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(pending(format!("Running webhook {phase}")).to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self { pb }
    }

    pub fn finish(self, report: &ReconcileReport) {
        let message = if report.is_clean() {
            succeeded(format!("Webhook {} finished ✓", report.phase)).to_string()
        } else {
            degraded(format!("Webhook {} finished with errors ✗", report.phase)).to_string()
        };
        self.pb.finish_with_message(message);
    }
}
