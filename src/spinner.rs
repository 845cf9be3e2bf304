use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::time::Duration;

use crate::workflow::{ProgressReporter, Step};

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    let spinner_style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb
}

fn step_message(step: Step, detail: &str) -> String {
    if detail.is_empty() {
        step.description().to_string()
    } else {
        format!("{} {}", step.description(), style(detail).dim())
    }
}

/// Renders each workflow step as a spinner that resolves to ✔ or ✘.
/// Command output is printed above the active spinner.
#[derive(Default)]
pub struct SpinnerProgress {
    current: RefCell<Option<(ProgressBar, String)>>,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for SpinnerProgress {
    fn step_started(&self, step: Step, detail: &str) {
        let msg = step_message(step, detail);
        let pb = create_spinner(&msg);
        if let Some((previous, _)) = self.current.replace(Some((pb, msg))) {
            previous.finish();
        }
    }

    fn step_finished(&self, _step: Step, success: bool) {
        if let Some((pb, msg)) = self.current.take() {
            if success {
                pb.finish_with_message(format!("{} {}", style("✔").green(), msg));
            } else {
                pb.finish_with_message(format!("{} {}", style("✘").red(), msg));
            }
        }
    }

    fn command_output(&self, output: &str) {
        let current = self.current.borrow();
        print_above(current.as_ref().map(|(pb, _)| pb), || {
            for line in output.lines().filter(|l| !l.trim().is_empty()) {
                println!("  {}", style(line).dim());
            }
        });
    }

    fn warning(&self, message: &str) {
        let line = format!("{} {}", style("!").yellow().bold(), message);
        let current = self.current.borrow();
        print_above(current.as_ref().map(|(pb, _)| pb), || eprintln!("{}", line));
    }
}

/// Print with the active spinner cleared. `ProgressBar::println` is a no-op
/// on a hidden bar (stderr not a terminal), `suspend` still runs the closure.
fn print_above(pb: Option<&ProgressBar>, print: impl FnOnce()) {
    match pb {
        Some(pb) => pb.suspend(print),
        None => print(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_message_without_detail_is_description() {
        assert_eq!(step_message(Step::PullLargeFiles, ""), "Pulling LFS content");
    }

    #[test]
    fn step_message_includes_detail() {
        let msg = step_message(Step::Clone, "https://host/tmpl.git");
        assert!(msg.starts_with("Cloning template "));
        assert!(msg.contains("https://host/tmpl.git"));
    }

    #[test]
    fn finishing_clears_current_spinner() {
        let progress = SpinnerProgress::new();
        progress.step_started(Step::Clone, "x");
        progress.command_output("Cloning into 'tmpl'...");
        progress.step_finished(Step::Clone, true);
        assert!(progress.current.borrow().is_none());
    }

    #[test]
    fn output_is_printed_when_spinner_is_hidden() {
        let hidden = ProgressBar::hidden();
        let mut printed = false;
        print_above(Some(&hidden), || printed = true);
        assert!(printed);

        let mut printed = false;
        print_above(None, || printed = true);
        assert!(printed);
    }
}
