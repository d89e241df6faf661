//! Progress reporting for long runs

/// Progress callback for tracking execution
pub trait ProgressCallback: Send + Sync {
    fn on_item_start(&self, id: u64);
    fn on_item_complete(&self, id: u64, generated: usize);
    fn on_progress(&self, completed: usize, total: usize);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_item_start(&self, _id: u64) {}
    fn on_item_complete(&self, _id: u64, _generated: usize) {}
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_item_start(&self, _id: u64) {}

    fn on_item_complete(&self, id: u64, generated: usize) {
        if generated > 0 {
            println!("  Item {}: {} task(s) generated", id, generated);
        }
    }

    fn on_progress(&self, completed: usize, total: usize) {
        if completed % 10 == 0 || completed == total {
            println!("Progress: {}/{} items complete", completed, total);
        }
    }
}
