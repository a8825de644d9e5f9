//! Console progress for work done in a fixed number of steps

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar counting completed steps
pub struct ProgressTracker {
    bar: ProgressBar,
    description: String,
}

impl ProgressTracker {
    pub fn new(steps: u64, description: &str) -> Self {
        let bar = ProgressBar::new(steps);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:20.cyan/blue}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(description.to_string());

        ProgressTracker {
            bar,
            description: description.to_string(),
        }
    }

    /// A tracker that draws nothing
    pub fn hidden() -> Self {
        ProgressTracker {
            bar: ProgressBar::hidden(),
            description: String::new(),
        }
    }

    /// Show which step is running
    pub fn begin_step(&self, label: &str) {
        self.bar.set_message(format!("{} {}", self.description, label));
    }

    pub fn complete_step(&self) {
        self.bar.inc(1);
    }

    /// Steps completed so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message(format!("{} done", self.description));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_completed_steps() {
        let progress = ProgressTracker::hidden();
        for label in ["C00", "C10"] {
            progress.begin_step(label);
            progress.complete_step();
        }
        assert_eq!(progress.position(), 2);
        progress.finish();
    }
}
