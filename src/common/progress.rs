use indicatif::{ProgressBar, ProgressStyle};

const TICK_CHARS: &str = "⠁⠉⠙⠚⠒⠂⠲⠴⠤⠄⠠⠦⠖⠐⠓⠋";

pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        pb.set_style(style.tick_chars(TICK_CHARS));
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Bar over a batch of `total` packages; the message shows the current one.
pub fn create_batch_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner} [{bar:30}] {pos}/{len} {elapsed} {msg}")
    {
        pb.set_style(style.progress_chars("=> ").tick_chars(TICK_CHARS));
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
