use cumulus_browser::{BrowserSnapshot, TaskId, UploadStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One progress bar per upload task that is currently being sent
pub struct UploadBars {
    multi: MultiProgress,
    bars: HashMap<TaskId, ProgressBar>,
    style: ProgressStyle,
    speed_window: Duration,
}

impl UploadBars {
    pub fn new(speed_window: Duration) -> Self {
        let style = ProgressStyle::with_template(
            "{prefix:>20.cyan} [{bar:30.green/white}] {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
            speed_window,
        }
    }

    /// Bring the bars in line with the upload queue of `snapshot`
    pub fn sync(&mut self, snapshot: &BrowserSnapshot) {
        let now = Instant::now();

        for task in &snapshot.uploads {
            match task.status {
                UploadStatus::Loading => {
                    let bar = self.bars.entry(task.id).or_insert_with(|| {
                        let bar = self.multi.add(ProgressBar::new(100));
                        bar.set_style(self.style.clone());
                        bar.set_prefix(task.filename.clone());
                        bar
                    });
                    bar.set_position(u64::from(task.progress));

                    let speed = task.speed(now, self.speed_window);
                    let eta = task.eta(now, self.speed_window);
                    bar.set_message(match (speed, eta) {
                        (Some(speed), Some(eta)) => format!(
                            "{}/s, {} left",
                            format_bytes(speed),
                            humantime::format_duration(Duration::from_secs(eta.as_secs()))
                        ),
                        (Some(speed), None) => format!("{}/s", format_bytes(speed)),
                        _ => String::new(),
                    });
                }
                UploadStatus::Done => {
                    if let Some(bar) = self.bars.remove(&task.id) {
                        bar.set_position(100);
                        bar.finish_with_message("done");
                    }
                }
                UploadStatus::Ready => {
                    if let Some(bar) = self.bars.remove(&task.id) {
                        let reason = task
                            .error
                            .as_ref()
                            .map(|error| error.display_message().to_string())
                            .unwrap_or_default();
                        bar.abandon_with_message(format!("failed: {}", reason));
                    }
                }
            }
        }

        // Tasks that were removed from the queue
        let live: Vec<TaskId> = snapshot.uploads.iter().map(|task| task.id).collect();
        self.bars.retain(|id, bar| {
            let keep = live.contains(id);
            if !keep {
                bar.finish_and_clear();
            }
            keep
        });
    }

    pub fn is_idle(&self) -> bool {
        self.bars.is_empty()
    }
}

pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
