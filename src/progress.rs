//! Defines structures and types for progress reporting.

/// Represents a snapshot of the progress during a long-running operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// A description of the current stage (e.g., "Pass 2/4: definitions").
    pub stage_description: String,
    /// Number of items processed in the current stage.
    pub current_item: u64,
    /// Total number of items expected in the current stage (if calculable).
    pub total_items: Option<u64>,
    /// An optional message providing more context.
    pub message: Option<String>,
}

/// Type alias for the progress callback function.
///
/// The callback receives a `ProgressUpdate` and returns `true` to continue.
/// Returning `false` asks the running operation to stop; persistence then
/// rolls back its unit of work.
pub type ProgressCallback = Box<dyn FnMut(ProgressUpdate) -> bool + Send + Sync>;

impl ProgressUpdate {
    /// Creates a new progress update for the start of a stage.
    pub fn new_stage(description: String, total_items: Option<u64>) -> Self {
        ProgressUpdate {
            stage_description: description,
            current_item: 0,
            total_items,
            message: None,
        }
    }
}

/// Sends an update if a callback is present. Returns `false` when the callback
/// asked to stop.
pub(crate) fn report(callback: &mut Option<&mut ProgressCallback>, update: ProgressUpdate) -> bool {
    match callback.as_deref_mut() {
        Some(cb) => cb(update),
        None => true,
    }
}
