//! Progress UI (spinner) for long-running commands.

use std::borrow::Cow;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner on stderr that clears itself when dropped.
///
/// When disabled it is a hidden bar, so callers never branch on whether the
/// UI is shown.
pub(crate) struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub(crate) fn start(enabled: bool, message: impl Into<Cow<'static, str>>) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(message);
        Self { bar }
    }

    pub(crate) fn set_message(&self, message: impl Into<Cow<'static, str>>) {
        self.bar.set_message(message);
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Spinner;

    #[test]
    fn disabled_spinner_is_hidden() {
        let spinner = Spinner::start(false, "working");
        assert!(spinner.bar.is_hidden());
        spinner.set_message("still working");
        drop(spinner);
    }
}
