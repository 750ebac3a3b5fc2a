//! Staged uploads and their progress

use cumulus_fs::{path, ApiError, FileHandle, UploadOptions};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{BrowserError, Result};
use crate::ids::{IdGenerator, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Ready,
    Loading,
    Done,
}

/// Changes the user may make to a task before it is sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub filename: Option<String>,
    pub crypted: Option<bool>,
    pub compressed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub id: TaskId,
    pub file: FileHandle,
    pub filename: String,
    /// Path of the destination directory
    pub location: String,
    pub crypted: bool,
    pub compressed: bool,
    pub status: UploadStatus,
    pub progress: u8,
    pub error: Option<ApiError>,
    history: Vec<(Instant, u8)>,
}

impl UploadTask {
    pub fn options(&self) -> UploadOptions {
        UploadOptions::new(&self.filename, self.crypted, self.compressed)
    }

    /// Estimated bytes per second over the last `window`
    pub fn speed(&self, now: Instant, window: Duration) -> Option<f64> {
        let since = now.checked_sub(window);
        let mut samples = self
            .history
            .iter()
            .filter(|(at, _)| since.map_or(true, |since| *at >= since));

        let (first_at, first_progress) = samples.next()?;
        let (last_at, last_progress) = samples.last()?;
        let elapsed = last_at.duration_since(*first_at).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        let delta = f64::from(last_progress.saturating_sub(*first_progress)) / 100.0;
        Some(delta * self.file.size as f64 / elapsed)
    }

    /// Estimated time left, from the current speed
    pub fn eta(&self, now: Instant, window: Duration) -> Option<Duration> {
        let speed = self.speed(now, window).filter(|speed| *speed > 0.0)?;
        let remaining = f64::from(100 - self.progress.min(100)) / 100.0 * self.file.size as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadQueue {
    tasks: Vec<UploadTask>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&UploadTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut UploadTask> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// No task is uploading
    pub fn is_drained(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status != UploadStatus::Loading)
    }

    pub fn stage(
        &mut self,
        ids: &mut IdGenerator,
        files: Vec<FileHandle>,
        location: &str,
        crypted: bool,
        compressed: bool,
    ) -> Vec<TaskId> {
        files
            .into_iter()
            .map(|file| {
                let id = ids.task();
                self.tasks.push(UploadTask {
                    id,
                    filename: file.name.clone(),
                    file,
                    location: location.to_string(),
                    crypted,
                    compressed,
                    status: UploadStatus::Ready,
                    progress: 0,
                    error: None,
                    history: Vec::new(),
                });
                id
            })
            .collect()
    }

    pub fn update(&mut self, id: TaskId, patch: TaskPatch) -> Result<()> {
        if let Some(filename) = &patch.filename {
            path::validate_name(filename)
                .map_err(|_| BrowserError::InvalidFilename(filename.clone()))?;
        }

        let task = self.get_mut(id).ok_or(BrowserError::TaskNotFound(id))?;
        if task.status != UploadStatus::Ready {
            return Err(BrowserError::TaskNotEditable(id));
        }

        if let Some(filename) = patch.filename {
            task.filename = filename;
        }
        if let Some(crypted) = patch.crypted {
            task.crypted = crypted;
        }
        if let Some(compressed) = patch.compressed {
            task.compressed = compressed;
        }
        Ok(())
    }

    pub fn remove(&mut self, id: TaskId) -> Result<UploadTask> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(BrowserError::TaskNotFound(id))?;
        if self.tasks[index].status == UploadStatus::Loading {
            return Err(BrowserError::TaskBusy(id));
        }
        Ok(self.tasks.remove(index))
    }

    /// Move every `Ready` task to `Loading` and return them for dispatch
    pub fn start_all(&mut self) -> Vec<UploadTask> {
        self.tasks
            .iter_mut()
            .filter(|task| task.status == UploadStatus::Ready)
            .map(|task| {
                task.status = UploadStatus::Loading;
                task.progress = 0;
                task.error = None;
                task.history.clear();
                task.clone()
            })
            .collect()
    }

    pub fn record_progress(&mut self, id: TaskId, progress: u8, at: Instant) -> bool {
        match self.get_mut(id) {
            Some(task) if task.status == UploadStatus::Loading => {
                task.progress = progress.min(100);
                task.history.push((at, task.progress));
                true
            }
            _ => {
                debug!("Ignoring progress for {} which is not uploading", id);
                false
            }
        }
    }

    pub fn complete(&mut self, id: TaskId) -> Option<&UploadTask> {
        let task = self.get_mut(id)?;
        if task.status != UploadStatus::Loading {
            return None;
        }
        task.status = UploadStatus::Done;
        task.progress = 100;
        task.error = None;
        Some(&*task)
    }

    /// Put a failed task back to `Ready` so it can be retried
    pub fn fail(&mut self, id: TaskId, error: ApiError) -> Option<&UploadTask> {
        let task = self.get_mut(id)?;
        if task.status != UploadStatus::Loading {
            return None;
        }
        task.status = UploadStatus::Ready;
        task.progress = 0;
        task.error = Some(error);
        task.history.clear();
        Some(&*task)
    }

    /// Close the upload panel: finished tasks go away, and once nothing is
    /// uploading the whole queue is cleared.
    pub fn dismiss(&mut self) -> usize {
        let before = self.tasks.len();
        if self.is_drained() {
            self.tasks.clear();
        } else {
            self.tasks.retain(|task| task.status != UploadStatus::Done);
        }
        before - self.tasks.len()
    }
}
