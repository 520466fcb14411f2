use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Active,
    Completed,
    Cancelled,
}

/// One definition that could not be uploaded.
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub item: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub fraction: f64,
    pub current_item: Option<String>,
    pub status: BatchStatus,
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            fraction: 0.0,
            current_item: None,
            status: BatchStatus::Active,
            succeeded: 0,
            failed: Vec::new(),
        }
    }
}

/// Progress state type, shared between the batch task and whoever
/// requests cancellation (the Ctrl-C handler in the CLI).
pub type ProgressState = Arc<Mutex<BatchProgress>>;

pub fn new_progress(total: usize) -> ProgressState {
    Arc::new(Mutex::new(BatchProgress::new(total)))
}

fn with_progress<F>(state: &ProgressState, operation: &str, f: F) -> bool
where
    F: FnOnce(&mut BatchProgress),
{
    match state.lock() {
        Ok(mut progress) => {
            f(&mut progress);
            true
        }
        Err(e) => {
            log::error!(
                "Failed to acquire progress lock for {} (non-critical): {}",
                operation,
                e
            );
            false
        }
    }
}

fn read_progress<F, R>(state: &ProgressState, operation: &str, f: F) -> Option<R>
where
    F: FnOnce(&BatchProgress) -> R,
{
    match state.lock() {
        Ok(progress) => Some(f(&progress)),
        Err(e) => {
            log::error!(
                "Failed to acquire progress lock for {} (non-critical): {}",
                operation,
                e
            );
            None
        }
    }
}

/// Check if the batch has been cancelled
pub fn is_cancelled(state: &ProgressState) -> bool {
    read_progress(state, "cancellation check", |progress| {
        progress.status == BatchStatus::Cancelled
    })
    .unwrap_or(true) // Treat unreadable state as cancelled for safety
}

/// Mark the batch as cancelled; the loop observes this at the next
/// iteration boundary
pub fn request_cancel(state: &ProgressState) {
    with_progress(state, "cancel request", |progress| {
        progress.status = BatchStatus::Cancelled;
        log::info!(
            "Cancellation requested with {} of {} items processed",
            progress.completed,
            progress.total
        );
    });
}

/// Publish the item about to be uploaded
pub fn set_current_item(state: &ProgressState, text: String) {
    with_progress(state, "current item update", |progress| {
        log::info!("{}", text);
        progress.current_item = Some(text);
    });
}

/// Advance the fractional indicator by 1/total, after an attempt
/// succeeded or failed
pub fn advance_progress(state: &ProgressState) {
    with_progress(state, "progress advance", |progress| {
        progress.completed += 1;
        if progress.total > 0 {
            progress.fraction = progress.completed as f64 / progress.total as f64;
        }
        log::debug!(
            "Progress: {}/{} ({:.0}%)",
            progress.completed,
            progress.total,
            progress.fraction * 100.0
        );
    });
}

pub fn record_item_success(state: &ProgressState) {
    with_progress(state, "success update", |progress| {
        progress.succeeded += 1;
    });
}

pub fn record_item_failure(state: &ProgressState, item: String, error: String) {
    with_progress(state, "failure update", |progress| {
        log::warn!("Progress: Failed to upload {} - {}", item, error);
        progress.failed.push(FailedItem { item, error });
    });
}

/// Mark the batch as completed; a cancelled batch keeps its status
pub fn mark_completed(state: &ProgressState) {
    with_progress(state, "mark completed", |progress| {
        if progress.status == BatchStatus::Active {
            progress.status = BatchStatus::Completed;
        }
        log::info!(
            "Batch finished: {}/{} successful, {} failed",
            progress.succeeded,
            progress.total,
            progress.failed.len()
        );
    });
}

pub fn snapshot(state: &ProgressState) -> Option<BatchProgress> {
    read_progress(state, "snapshot", |progress| progress.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_updates_fraction() {
        let state = new_progress(4);
        advance_progress(&state);
        advance_progress(&state);

        let progress = snapshot(&state).expect("snapshot");
        assert_eq!(progress.completed, 2);
        assert!((progress.fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cancel_round_trip() {
        let state = new_progress(3);
        assert!(!is_cancelled(&state));

        request_cancel(&state);
        assert!(is_cancelled(&state));

        // Completion must not overwrite a cancellation
        mark_completed(&state);
        let progress = snapshot(&state).expect("snapshot");
        assert_eq!(progress.status, BatchStatus::Cancelled);
    }

    #[test]
    fn test_failure_recording() {
        let state = new_progress(2);
        record_item_failure(&state, "GET /pets".to_string(), "boom".to_string());
        record_item_success(&state);

        let progress = snapshot(&state).expect("snapshot");
        assert_eq!(progress.failed.len(), 1);
        assert_eq!(progress.failed[0].item, "GET /pets");
        assert_eq!(progress.succeeded, 1);
    }
}
