use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Instant;

/// Tuple counter on stderr. Shows a bar when the total hit count is known,
/// a spinner otherwise.
pub struct ReadProgress {
    bar: ProgressBar,
    start: Instant,
}

impl ReadProgress {
    pub fn new(total: Option<u64>, hidden: bool) -> Self {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        if hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_draw_target(ProgressDrawTarget::stderr());
        }

        Self {
            bar,
            start: Instant::now(),
        }
    }

    pub fn inc(&self, count: u64) {
        self.bar.inc(count);
    }

    pub fn finish(&self) {
        let elapsed = self.start.elapsed();
        self.bar.finish_with_message(format!(
            "Read {} tuples in {:.1}s",
            self.bar.position(),
            elapsed.as_secs_f64()
        ));
    }
}
