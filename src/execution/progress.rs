//! Progress tracking for a stitching run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// The grid was validated and planes are about to be produced.
    Started {
        tiles: usize,
        pages: usize,
    },
    /// The border remap table is ready.
    RemapResolved {
        tasks: usize,
        entries: usize,
    },
    /// A plane has started assembling.
    PlaneStarted {
        page: usize,
        total: usize,
    },
    /// A plane was assembled and written.
    PlaneCompleted {
        page: usize,
        total: usize,
        duration_ms: u64,
    },
    /// Overall progress percentage.
    Progress {
        percent: f32,
        elapsed_ms: u64,
        estimated_remaining_ms: Option<u64>,
    },
    /// All planes were written.
    Completed {
        total_duration_ms: u64,
        pages: usize,
    },
    /// The run failed.
    Error {
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Tracks plane progress and forwards updates to a callback.
pub struct ProgressTracker {
    /// Total number of planes to produce.
    total_pages: usize,
    /// Number of planes written.
    completed_pages: AtomicU64,
    /// Start time.
    start_time: Option<Instant>,
    /// Progress callback.
    callback: Option<ProgressCallback>,
    /// Plane durations for estimation.
    page_times: parking_lot::Mutex<Vec<u64>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total_pages: usize) -> Self {
        Self {
            total_pages,
            completed_pages: AtomicU64::new(0),
            start_time: None,
            callback: None,
            page_times: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start tracking a run over `tiles` tiles and `pages` planes.
    pub fn start(&mut self, tiles: usize, pages: usize) {
        self.total_pages = pages;
        self.start_time = Some(Instant::now());
        self.send_update(ProgressUpdate::Started {
            tiles,
            pages: self.total_pages,
        });
    }

    /// Report the resolved remap table.
    pub fn remap_resolved(&self, tasks: usize, entries: usize) {
        self.send_update(ProgressUpdate::RemapResolved { tasks, entries });
    }

    /// Report that a plane has started.
    pub fn plane_started(&self, page: usize) {
        self.send_update(ProgressUpdate::PlaneStarted {
            page,
            total: self.total_pages,
        });
    }

    /// Report that a plane has been written.
    pub fn plane_completed(&self, page: usize, duration_ms: u64) {
        self.completed_pages.fetch_add(1, Ordering::Relaxed);
        self.page_times.lock().push(duration_ms);

        self.send_update(ProgressUpdate::PlaneCompleted {
            page,
            total: self.total_pages,
            duration_ms,
        });
        self.send_progress_update();
    }

    /// Report that the run failed.
    pub fn report_error(&self, message: impl Into<String>) {
        self.send_update(ProgressUpdate::Error {
            message: message.into(),
        });
    }

    /// Complete tracking.
    pub fn complete(&self) {
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
            pages: self.completed_pages.load(Ordering::Relaxed) as usize,
        });
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total_pages == 0 {
            return 100.0;
        }
        let completed = self.completed_pages.load(Ordering::Relaxed);
        (completed as f32 / self.total_pages as f32) * 100.0
    }

    /// Estimate remaining time in milliseconds.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let times = self.page_times.lock();
        if times.is_empty() {
            return None;
        }

        let avg_time: u64 = times.iter().sum::<u64>() / times.len() as u64;
        let completed = self.completed_pages.load(Ordering::Relaxed) as usize;
        let remaining = self.total_pages.saturating_sub(completed);

        Some(avg_time * remaining as u64)
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }

    fn send_progress_update(&self) {
        self.send_update(ProgressUpdate::Progress {
            percent: self.progress_percent(),
            elapsed_ms: self.elapsed_ms(),
            estimated_remaining_ms: self.estimated_remaining_ms(),
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0)
    }
}
