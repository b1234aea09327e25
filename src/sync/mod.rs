//! Segment synchronization.
//!
//! Resolves segment names to upstream filters, walks the paginated listing
//! and folds the pages into a deduplicated [`SyncResult`](crate::types::SyncResult).

pub mod orchestrator;
pub mod segments;
pub mod walker;

pub use orchestrator::{SyncObserver, SyncOrchestrator};
pub use segments::{default_segments, Resolution, SegmentDefinition, SegmentResolver, SegmentSummary};
pub use walker::{CursorWalker, PageWalk, SyncAccumulator, WalkConfig};
