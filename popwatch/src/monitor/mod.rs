//! Update pipeline.
//!
//! One update run pulls new arrivals, limited items, watched items and
//! keyword searches from the catalog, compares every snapshot with the stored
//! state, records history and emits change events. At most one run is active
//! at a time.

mod detector;
mod events;
mod progress;
mod service;

pub use detector::{Detection, PRICE_TOLERANCE, detect_changes};
pub use events::{ChangeEvent, ChangeEventBroadcaster, ChangeKind};
pub use progress::{ProgressTracker, UpdateProgress, UpdateStatus};
pub use service::{MonitorConfig, ProductMonitor, RunOutcome, RunSummary, TriggerOutcome};
