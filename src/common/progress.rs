use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠁⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠙⠚";

/// Resolution of the install bar; event progress in [0, 1] is scaled to it.
pub const INSTALL_BAR_LENGTH: u64 = 1000;

pub fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS);
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bar driven by installer progress events: phase as prefix, step as message.
pub fn create_install_bar() -> ProgressBar {
    let pb = ProgressBar::new(INSTALL_BAR_LENGTH);
    let style = ProgressStyle::default_bar()
        .template("{spinner} [{bar:30.cyan/blue}] {percent:>3}% {prefix:.bold} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars(TICK_CHARS)
        .progress_chars("=> ");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Map a progress fraction onto the install bar.
pub fn bar_position(progress: f64) -> u64 {
    (progress.clamp(0.0, 1.0) * INSTALL_BAR_LENGTH as f64).round() as u64
}

/// Finish a spinner and print a success message with a checkmark
/// This clears the spinner line entirely and prints a clean message
pub fn finish_spinner_with_success(pb: ProgressBar, message: impl Into<String>) {
    pb.finish_and_clear();
    println!("✓ {}", message.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_position_is_clamped() {
        assert_eq!(bar_position(-0.5), 0);
        assert_eq!(bar_position(0.5), 500);
        assert_eq!(bar_position(2.0), INSTALL_BAR_LENGTH);
    }
}
