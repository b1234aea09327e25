//! Crate-level tests.

use crate::mocks::MockDirectory;
use crate::store::MemoryStore;
use crate::{fixtures, DirectoryClient};
use std::sync::Arc;

#[cfg(test)]
mod bulk_tests;
#[cfg(test)]
mod orchestrator_tests;

/// Filter of a built-in segment, empty when the segment has none
pub(super) fn filter_for(name: &str) -> String {
    crate::sync::default_segments()
        .into_iter()
        .find(|segment| segment.name == name)
        .and_then(|segment| segment.filter)
        .unwrap_or_default()
}

/// Client over a mock directory with fixture config and an empty store
pub(super) fn client_with(directory: Arc<MockDirectory>) -> DirectoryClient {
    DirectoryClient::with_directory(fixtures::config(), directory, Arc::new(MemoryStore::new()))
        .unwrap()
}
