use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use deploylens::fetch::QueryClass;

use super::styling::{bright_green, bright_yellow};

/// Spinner shown while dashboard queries are in flight.
pub struct LoadProgress {
    pb: ProgressBar,
}

impl LoadProgress {
    pub fn start(message: &str) -> Self {
        let pb = create_spinner(bright_yellow(message).to_string());
        Self { pb }
    }

    /// Lists the query classes still loading.
    pub fn update<I>(&self, loading: I)
    where
        I: IntoIterator<Item = QueryClass>,
    {
        let names: Vec<String> = loading.into_iter().map(|class| class.to_string()).collect();
        self.pb
            .set_message(bright_yellow(format!("Loading {}", names.join(", "))).to_string());
    }

    pub fn finish(self, message: &str) {
        self.pb
            .finish_with_message(bright_green(format!("{message} ✓")).to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
