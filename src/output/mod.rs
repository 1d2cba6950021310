mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::export_json;
pub use progress::LoadProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{render_dashboard, render_pending_approvals, render_projects, render_releases};

/// Prints the `DeployLens` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🚦 DeployLens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Release & Deployment Dashboard")
    );
}
