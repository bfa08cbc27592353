mod progress;
mod styling;
mod tables;

pub use progress::PassProgress;
use styling::{subdued, title};
pub use tables::{render_job_list, render_report};

/// Prints the bridge banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        title("🔗 GitLab CI Bridge"),
        subdued(env!("CARGO_PKG_VERSION")),
        subdued("Webhook reconciliation and pipeline discovery")
    );
}
