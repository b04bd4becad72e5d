use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use super::result::InstallResult;

#[derive(Debug)]
struct ProgressState {
    completed: usize,
    successful: usize,
    failed: usize,
    skipped: usize,
    current_package: String,
    results: HashMap<String, InstallResult>,
}

/// Counters and results of the batch in flight.
///
/// `total` is fixed at construction. Every mutation goes through the one
/// mutex, so after each [`update`](Self::update)
/// `completed == successful + failed + skipped`.
#[derive(Debug)]
pub struct InstallationProgress {
    total: usize,
    start_time: DateTime<Utc>,
    started: Instant,
    state: Mutex<ProgressState>,
}

/// Point-in-time copy handed to progress callbacks.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub current_package: String,
    pub results: HashMap<String, InstallResult>,
    pub start_time: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn progress_percentage(&self) -> f64 {
        percentage(self.completed, self.total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallationSummary {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub progress_percentage: f64,
    pub elapsed_secs: f64,
    pub start_time: DateTime<Utc>,
    pub results: HashMap<String, InstallResult>,
}

fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

impl InstallationProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            start_time: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(ProgressState {
                completed: 0,
                successful: 0,
                failed: 0,
                skipped: 0,
                current_package: String::new(),
                results: HashMap::new(),
            }),
        }
    }

    // A panicking callback must not make the counters unreadable.
    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn set_current_package(&self, package_id: &str) {
        self.lock().current_package = package_id.to_string();
    }

    /// Record a result, replacing any earlier one for the same id. Skipped
    /// wins over failed. Updates past `total` are dropped.
    pub fn update(&self, package_id: &str, result: InstallResult) {
        let mut state = self.lock();
        if state.completed >= self.total {
            warn!(
                "Ignoring result for {package_id}: all {} packages already recorded",
                self.total
            );
            return;
        }
        state.completed += 1;
        if result.success() {
            state.successful += 1;
        } else if result.skipped() {
            state.skipped += 1;
        } else {
            state.failed += 1;
        }
        state.results.insert(package_id.to_string(), result);
    }

    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    pub fn progress_percentage(&self) -> f64 {
        percentage(self.lock().completed, self.total)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot {
            total: self.total,
            completed: state.completed,
            successful: state.successful,
            failed: state.failed,
            skipped: state.skipped,
            current_package: state.current_package.clone(),
            results: state.results.clone(),
            start_time: self.start_time,
        }
    }

    pub fn get_summary(&self) -> InstallationSummary {
        let state = self.lock();
        InstallationSummary {
            total: self.total,
            completed: state.completed,
            successful: state.successful,
            failed: state.failed,
            skipped: state.skipped,
            progress_percentage: percentage(state.completed, self.total),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            start_time: self.start_time,
            results: state.results.clone(),
        }
    }
}
